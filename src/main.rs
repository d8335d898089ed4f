use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use log::LevelFilter;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, File},
    io::{self, stdin},
    path::PathBuf,
    time::{Duration, Instant},
};
use wingman::{
    app::{App, KeyOutcome},
    app_dirs::AppDirs,
    config::{ConfigStore, FileConfigStore, Settings},
    history::{FileHistory, SessionRecorder},
    lesson::{Course, Lesson, LessonOrder},
    runtime::{AppEvent, CrosstermEventSource, FixedTicker, Runner},
    steno::StenoDictionary,
    transport::{ConnectionState, PloverTransport},
    ui,
};

const TICK_RATE_MS: u64 = 50;

/// steno and keyboard typing practice with live wpm and plover integration
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Typing practice for stenographers and keyboard typists. Lessons come from built-in or JSON courses, input from the keyboard or the Plover websocket server, and every finished lesson is kept in a local history."
)]
pub struct Cli {
    /// course file (JSON) to pick lessons from instead of the built-in courses
    #[clap(short = 'c', long)]
    course: Option<PathBuf>,

    /// lesson to practice, by name or 1-based position in the course
    #[clap(short = 'l', long)]
    lesson: Option<String>,

    /// custom prompt to use instead of a course lesson
    #[clap(short = 'p', long)]
    prompt: Option<String>,

    /// number of times to repeat the lesson prompts
    #[clap(short = 'r', long)]
    repeat: Option<usize>,

    /// shuffle the lesson words
    #[clap(long)]
    random: bool,

    /// keyboard only, do not connect to plover
    #[clap(short = 'k', long)]
    keyboard: bool,

    /// print lesson history and exit
    #[clap(long)]
    history: bool,

    /// list built-in courses and lessons and exit
    #[clap(long)]
    list: bool,

    /// log verbosity (RUST_LOG takes precedence)
    #[clap(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

impl Cli {
    fn select_lesson(&self) -> Result<Lesson, Box<dyn Error>> {
        let mut lesson = match &self.prompt {
            Some(prompt) => Lesson::from_prompt(prompt),
            None => {
                let course = self.course()?;
                match &self.lesson {
                    Some(selector) => course.lesson(selector)?.clone(),
                    None => course
                        .lessons
                        .first()
                        .cloned()
                        .ok_or_else(|| format!("course {:?} has no lessons", course.name))?,
                }
            }
        };

        if let Some(repeat) = self.repeat {
            lesson.repeat = repeat;
        }
        if self.random {
            lesson.order = LessonOrder::Random;
        }
        Ok(lesson)
    }

    fn course(&self) -> Result<Course, Box<dyn Error>> {
        if let Some(path) = &self.course {
            match Course::load(path) {
                Ok(course) => return Ok(course),
                Err(e) => log::error!("{e}; falling back to built-in course"),
            }
        }
        Course::builtin()
            .into_iter()
            .next()
            .ok_or_else(|| "no built-in courses".into())
    }
}

fn init_logging(level: LevelFilter) -> Result<PathBuf, Box<dyn Error>> {
    let path = AppDirs::log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;

    // The terminal belongs to the TUI, so logs go to a file.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(path)
}

fn load_dictionary(settings: &Settings) -> StenoDictionary {
    let Some(path) = &settings.dictionary_path else {
        return StenoDictionary::new();
    };
    StenoDictionary::load(path).unwrap_or_else(|e| {
        log::error!("Failed to load dictionary {path:?}: {e}");
        StenoDictionary::new()
    })
}

fn print_history(recorder: &dyn SessionRecorder) {
    let now = chrono::Local::now();
    for r in recorder.load() {
        println!(
            "{}  {:<24} {:>3} wpm {:>3} mistakes  ({})",
            r.time.format("%Y-%m-%d %H:%M"),
            r.lesson_name,
            r.wpm,
            r.mistakes,
            r.ago(now)
        );
    }
}

fn print_courses() {
    for course in Course::builtin() {
        println!("{}: {}", course.name, course.description);
        for (i, lesson) in course.lessons.iter().enumerate() {
            println!("  {:>2}. {} ({}, {})", i + 1, lesson.name, lesson.kind, lesson.order);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_path = init_logging(cli.log_level)?;
    log::info!("wingman {} starting, logging to {log_path:?}", env!("CARGO_PKG_VERSION"));

    let recorder = FileHistory::new();
    if cli.history {
        print_history(&recorder);
        return Ok(());
    }
    if cli.list {
        print_courses();
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let settings = FileConfigStore::new().load();
    let lesson = cli.select_lesson()?;
    let dictionary = load_dictionary(&settings);

    let transport = (settings.use_plover && !cli.keyboard)
        .then(|| PloverTransport::new(settings.plover_config_path()));
    if let Some(t) = &transport {
        t.connect_in_background();
    }

    let mut app = App::new(lesson, settings, Box::new(recorder), dictionary)?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, transport.as_ref());

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(t) = transport {
        t.close();
    }
    log::info!("wingman exiting");
    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    transport: Option<&PloverTransport>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut last_frame = Instant::now();

    loop {
        // Steno input lands before the frame reads session state.
        if let Some(t) = transport {
            t.dispatch_pending(|event| app.handle_transport(event));
            app.plover = t.state();
        }

        terminal.draw(|f| ui::draw(app, f))?;

        match runner.step() {
            AppEvent::Tick | AppEvent::Resize => {}
            AppEvent::Key(key) => match app.on_key(key) {
                KeyOutcome::Quit => break,
                KeyOutcome::Reconnect => {
                    if let Some(t) = transport {
                        if t.state() == ConnectionState::Disconnected {
                            log::info!("Reconnecting to plover");
                            t.connect_in_background();
                        }
                    }
                }
                KeyOutcome::Continue => {}
            },
        }

        let now = Instant::now();
        app.tick(now.duration_since(last_frame).as_secs_f64());
        last_frame = now;
    }

    Ok(())
}
