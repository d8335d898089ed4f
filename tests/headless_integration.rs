use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use wingman::app::{App, AppState, KeyOutcome};
use wingman::config::Settings;
use wingman::history::MemoryHistory;
use wingman::lesson::{Course, Lesson, LessonType};
use wingman::runtime::{AppEvent, FixedTicker, InputEvent, InputSource, Runner, TestEventSource};
use wingman::steno::{StenoDictionary, Stroke};

fn key(c: char) -> AppEvent {
    AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
}

fn new_app(lesson: Lesson) -> App {
    App::new(
        lesson,
        Settings::default(),
        Box::new(MemoryHistory::default()),
        StenoDictionary::new(),
    )
    .unwrap()
}

// Drive a tiny event loop until the app leaves the typing screen (or bounded steps)
fn run(app: &mut App, runner: &Runner<TestEventSource, FixedTicker>) {
    for _ in 0..200u32 {
        match runner.step() {
            AppEvent::Tick => app.tick(runner.tick_secs()),
            AppEvent::Resize => {}
            AppEvent::Key(k) => {
                if app.on_key(k) == KeyOutcome::Quit {
                    break;
                }
            }
        }
        if app.state != AppState::Typing {
            break;
        }
    }
}

// Headless flow using the runtime runner without a TTY
#[test]
fn headless_typing_flow_completes() {
    let mut app = new_app(Lesson::from_prompt("hi there"));

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    for c in "hi there".chars() {
        tx.send(key(c)).unwrap();
    }

    run(&mut app, &runner);

    assert_eq!(app.state, AppState::Results);
    assert!(app.session.is_done());
    assert_eq!(app.session.mistake_count(), 0);
    assert_eq!(app.history.len(), 1);
    assert_eq!(app.history[0].lesson_name, "custom");
}

#[test]
fn headless_typo_is_counted_once_corrected() {
    let mut app = new_app(Lesson::from_prompt("ab cd"));

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    for c in "ax".chars() {
        tx.send(key(c)).unwrap();
    }
    tx.send(AppEvent::Key(KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE)))
        .unwrap();
    for c in "b cd".chars() {
        tx.send(key(c)).unwrap();
    }

    run(&mut app, &runner);

    assert_eq!(app.state, AppState::Results);
    assert!(app.session.words()[0].backspaced);
    assert_eq!(app.history[0].mistakes, 1);
}

#[test]
fn headless_idle_pauses_the_clock() {
    let mut app = new_app(Lesson::from_prompt("one two"));
    app.on_key(KeyEvent::new(KeyCode::Char('o'), KeyModifiers::NONE));
    assert!(app.session.timer_running());

    for _ in 0..120 {
        app.tick(0.05);
    }
    assert!(!app.session.timer_running());
    let paused_at = app.session.elapsed_secs();
    app.tick(1.0);
    assert_eq!(app.session.elapsed_secs(), paused_at);
}

#[test]
fn headless_steno_words_split_from_one_stroke() {
    let mut app = new_app(Lesson::from_prompt("the quick fox"));

    app.handle_input(
        InputSource::Steno,
        &InputEvent::TextInserted("the quick ".into()),
    );
    assert_eq!(app.session.current_index(), 2);
    app.handle_input(InputSource::Steno, &InputEvent::TextInserted("fox".into()));

    assert_eq!(app.state, AppState::Results);
    assert_eq!(app.history[0].mistakes, 0);
}

#[test]
fn headless_raw_lesson_with_undo() {
    let mut lesson = Lesson::from_prompt("KAT TKOG");
    lesson.kind = LessonType::Raw;
    let mut app = new_app(lesson);
    let stroke = |rtfcre: &str| {
        InputEvent::Stroke(Stroke {
            keys: vec![],
            rtfcre: rtfcre.into(),
            paper: rtfcre.into(),
        })
    };

    app.handle_input(InputSource::Steno, &stroke("KAT"));
    // Translations from the engine do not count in raw lessons.
    app.handle_input(InputSource::Steno, &InputEvent::TextInserted("dog".into()));
    app.handle_input(InputSource::Steno, &stroke("TKO"));
    app.handle_input(InputSource::Steno, &stroke("*"));
    app.handle_input(InputSource::Steno, &stroke("TKOG"));

    assert_eq!(app.state, AppState::Results);
    assert_eq!(app.history[0].mistakes, 1);
    assert_eq!(app.paper_tape.len(), 4);
}

#[test]
fn builtin_courses_are_playable() {
    let courses = Course::builtin();
    assert!(!courses.is_empty());
    for course in &courses {
        for lesson in &course.lessons {
            let app = new_app(lesson.clone());
            assert!(!app.session.words().is_empty(), "{}", lesson.name);
        }
    }
}
