use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::config::Settings;
use crate::history::{self, LessonResult, SessionRecorder};
use crate::lesson::{Lesson, LessonError};
use crate::runtime::{keyboard_input, InputEvent, InputSource};
use crate::session::{SessionOptions, TypingSession};
use crate::steno::{KeyCombo, Outline, StenoDictionary};
use crate::transport::{ConnectionState, TransportEvent};
use crate::util::{exp_decay, sanitize};

/// Strokes kept on the paper tape.
pub const PAPER_TAPE_LEN: usize = 12;
/// Stroke sequence that restarts the current lesson.
pub const RESTART_PHRASE: [&str; 2] = ["R-R", "R-R"];
const SCROLL_DECAY: f64 = 12.0;

/// One stroke on the paper tape, with its dictionary translation if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeLine {
    pub paper: String,
    pub translation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Typing,
    Results,
    History,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Reconnect,
    Quit,
}

pub struct App {
    pub lesson: Lesson,
    pub session: TypingSession,
    pub state: AppState,
    pub settings: Settings,
    pub history: Vec<LessonResult>,
    pub dictionary: StenoDictionary,
    pub paper_tape: VecDeque<TapeLine>,
    pub plover: ConnectionState,
    pub last_source: InputSource,
    pub wpm: u32,
    pub scroll: f64,
    pub scroll_target: f64,
    pub history_offset: usize,
    recorder: Box<dyn SessionRecorder>,
    restart_combo: KeyCombo,
}

impl App {
    pub fn new(
        lesson: Lesson,
        settings: Settings,
        recorder: Box<dyn SessionRecorder>,
        dictionary: StenoDictionary,
    ) -> Result<Self, LessonError> {
        let session = build_session(&lesson, &settings)?;
        let history = recorder.load();
        Ok(Self {
            lesson,
            session,
            state: AppState::Typing,
            settings,
            history,
            dictionary,
            paper_tape: VecDeque::with_capacity(PAPER_TAPE_LEN),
            plover: ConnectionState::Disconnected,
            last_source: InputSource::Keyboard,
            wpm: 0,
            scroll: 0.0,
            scroll_target: 0.0,
            history_offset: 0,
            recorder,
            restart_combo: KeyCombo::new(RESTART_PHRASE),
        })
    }

    /// Fresh run of the same lesson; random lessons are reshuffled.
    pub fn restart(&mut self) {
        match build_session(&self.lesson, &self.settings) {
            Ok(session) => self.session = session,
            Err(e) => log::error!("{e}"),
        }
        self.state = AppState::Typing;
        self.wpm = 0;
        self.scroll = 0.0;
        self.scroll_target = 0.0;
        self.restart_combo.reset();
    }

    pub fn handle_input(&mut self, source: InputSource, event: &InputEvent) {
        if self.state != AppState::Typing {
            return;
        }
        if let InputEvent::Stroke(stroke) = event {
            self.push_paper(&stroke.paper, &stroke.rtfcre);
            if self.restart_combo.on_stroke(&stroke.rtfcre) {
                log::info!("Restart phrase stroked");
                self.restart();
                return;
            }
        }

        self.last_source = source;
        self.session.apply(source, event);
        if self.session.is_done() {
            self.finish();
        }
    }

    pub fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Input(input) => self.handle_input(InputSource::Steno, &input),
            TransportEvent::Connected => self.plover = ConnectionState::Connected,
            TransportEvent::Disconnected => {
                self.plover = ConnectionState::Disconnected;
                self.last_source = InputSource::Keyboard;
            }
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.kind == KeyEventKind::Release {
            return KeyOutcome::Continue;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return KeyOutcome::Quit,
            KeyCode::Char('c') if ctrl => return KeyOutcome::Quit,
            KeyCode::Char('p') if ctrl => return KeyOutcome::Reconnect,
            _ => {}
        }

        match self.state {
            AppState::Typing => {
                if key.code == KeyCode::Left {
                    self.restart();
                } else if let Some(input) = keyboard_input(&key) {
                    self.handle_input(InputSource::Keyboard, &input);
                }
            }
            AppState::Results => match key.code {
                KeyCode::Char('r') => self.restart(),
                KeyCode::Char('h') => {
                    self.history_offset = 0;
                    self.state = AppState::History;
                }
                _ => {}
            },
            AppState::History => match key.code {
                KeyCode::Char('r') => self.restart(),
                KeyCode::Char('b') | KeyCode::Backspace => self.state = AppState::Results,
                KeyCode::Up => self.history_offset = self.history_offset.saturating_sub(1),
                KeyCode::Down => {
                    if self.history_offset + 1 < self.history.len() {
                        self.history_offset += 1;
                    }
                }
                KeyCode::Home => self.history_offset = 0,
                _ => {}
            },
        }
        KeyOutcome::Continue
    }

    pub fn tick(&mut self, dt: f64) {
        self.session.tick(dt);
        self.wpm = self.session.wpm();
        self.scroll = if self.settings.smooth_scroll {
            exp_decay(self.scroll, self.scroll_target, SCROLL_DECAY, dt)
        } else {
            self.scroll_target
        };
    }

    /// Line the active word sits on; the view eases towards it.
    pub fn scroll_to(&mut self, line: usize) {
        self.scroll_target = line as f64;
        if !self.settings.smooth_scroll {
            self.scroll = self.scroll_target;
        }
    }

    pub fn hint(&self) -> Option<&Outline> {
        let word = self.session.current_word()?;
        self.dictionary.best_outline(&word.target)
    }

    pub fn personal_best(&self) -> Option<u32> {
        history::personal_best(&self.history, self.lesson.fingerprint())
    }

    pub fn lesson_history(&self) -> Vec<&LessonResult> {
        history::for_lesson(&self.history, self.lesson.fingerprint())
    }

    fn push_paper(&mut self, paper: &str, rtfcre: &str) {
        if self.paper_tape.len() == PAPER_TAPE_LEN {
            self.paper_tape.pop_front();
        }
        self.paper_tape.push_back(TapeLine {
            paper: sanitize(paper),
            translation: self.dictionary.translate(rtfcre).map(sanitize),
        });
    }

    fn finish(&mut self) {
        self.wpm = self.session.wpm();
        if let Some(result) = self.session.result().cloned() {
            match self.recorder.record(&result) {
                Ok(()) => {}
                Err(e) => log::error!("Failed to record result: {e}"),
            }
            self.history.push(result);
        }
        self.state = AppState::Results;
    }
}

pub fn build_session(lesson: &Lesson, settings: &Settings) -> Result<TypingSession, LessonError> {
    let words = lesson.materialize_words(&mut rand::thread_rng());
    if words.is_empty() {
        return Err(LessonError::Empty(lesson.name.clone()));
    }
    let options = SessionOptions {
        inactivity_secs: settings.inactivity_threshold_secs,
        rate_strategy: settings.rate_strategy,
        ..SessionOptions::for_lesson(lesson)
    };
    Ok(TypingSession::with_options(words, options))
}
