// Library surface for the binary, headless/integration tests and reuse.
pub mod app;
pub mod app_dirs;
pub mod config;
pub mod history;
pub mod lesson;
pub mod rate;
pub mod runtime;
pub mod session;
pub mod steno;
pub mod time_series;
pub mod transport;
pub mod typing_policy;
pub mod ui;
pub mod util;
