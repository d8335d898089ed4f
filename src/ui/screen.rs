use ratatui::Frame;

use crate::app::{App, AppState};
use crate::ui::{follow_current_word, render_history};

/// A UI Screen boundary: responsible for rendering
pub trait Screen {
    fn render(&self, app: &mut App, f: &mut Frame);
}

/// Typing screen; keeps the active word in view before drawing.
pub struct TypingScreen;

impl Screen for TypingScreen {
    fn render(&self, app: &mut App, f: &mut Frame) {
        follow_current_word(app, f.area());
        f.render_widget(&*app, f.area());
    }
}

pub struct ResultsScreen;

impl Screen for ResultsScreen {
    fn render(&self, app: &mut App, f: &mut Frame) {
        f.render_widget(&*app, f.area());
    }
}

pub struct HistoryScreen;

impl Screen for HistoryScreen {
    fn render(&self, app: &mut App, f: &mut Frame) {
        render_history(app, f.area(), f.buffer_mut());
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: &AppState) -> Box<dyn Screen> {
    match state {
        AppState::Typing => Box::new(TypingScreen),
        AppState::Results => Box::new(ResultsScreen),
        AppState::History => Box::new(HistoryScreen),
    }
}
