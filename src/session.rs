use crate::history::LessonResult;
use crate::lesson::{Lesson, LessonType};
use crate::rate::{RateEstimator, RateStrategyKind};
use crate::runtime::{InputEvent, InputSource};
use crate::steno::Stroke;
use crate::time_series::TimeSeriesPoint;
use crate::typing_policy::MatchPolicy;

/// Seconds without input after which the lesson clock pauses.
pub const DEFAULT_INACTIVITY_SECS: f64 = 5.0;
/// Stroke that undoes the whole active word in raw lessons.
pub const UNDO_STROKE: &str = "*";

/// One target slot of a lesson and everything typed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub target: String,
    pub input: String,
    /// Moved past without ever matching the target.
    pub soft_error: bool,
    /// Lost characters to a backspace while active.
    pub backspaced: bool,
}

impl Word {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            input: String::new(),
            soft_error: false,
            backspaced: false,
        }
    }

    pub fn is_mistake(&self) -> bool {
        self.soft_error || self.backspaced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Done,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub policy: MatchPolicy,
    pub kind: LessonType,
    pub inactivity_secs: f64,
    pub rate_strategy: RateStrategyKind,
    pub lesson_name: String,
    pub lesson_hash: i32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::exact(),
            kind: LessonType::Words,
            inactivity_secs: DEFAULT_INACTIVITY_SECS,
            rate_strategy: RateStrategyKind::Gross,
            lesson_name: "custom".to_string(),
            lesson_hash: 0,
        }
    }
}

impl SessionOptions {
    pub fn for_lesson(lesson: &Lesson) -> Self {
        Self {
            policy: MatchPolicy::from(&lesson.settings),
            kind: lesson.kind,
            lesson_name: lesson.name.clone(),
            lesson_hash: lesson.fingerprint(),
            ..Self::default()
        }
    }
}

/// A single run through a lesson. Consumes text and backspace events from
/// any input source and maps them onto target words, even when one event
/// spans several words.
#[derive(Debug)]
pub struct TypingSession {
    words: Vec<Word>,
    current: usize,
    max_index: usize,
    status: SessionStatus,
    options: SessionOptions,
    rate: RateEstimator,
    timer_running: bool,
    since_input: f64,
    final_wpm: Option<u32>,
    result: Option<LessonResult>,
}

impl TypingSession {
    /// Exact-match session over ad-hoc words.
    pub fn new<S: Into<String>>(words: impl IntoIterator<Item = S>) -> Self {
        Self::with_options(words, SessionOptions::default())
    }

    /// A session without any words starts out done and never produces a
    /// result.
    pub fn with_options<S: Into<String>>(
        words: impl IntoIterator<Item = S>,
        options: SessionOptions,
    ) -> Self {
        let words: Vec<Word> = words.into_iter().map(Word::new).collect();
        let status = if words.is_empty() {
            SessionStatus::Done
        } else {
            SessionStatus::Active
        };
        log::info!(
            "Starting session {:?} with {} words",
            options.lesson_name,
            words.len()
        );
        Self {
            words,
            current: 0,
            max_index: 0,
            status,
            rate: RateEstimator::new(options.rate_strategy.build()),
            options,
            timer_running: false,
            since_input: 0.0,
            final_wpm: None,
            result: None,
        }
    }

    /// Route an event from `source`. Raw lessons match strokes, so text and
    /// backspaces produced by the steno engine are ignored there.
    pub fn apply(&mut self, source: InputSource, event: &InputEvent) {
        let steno_text_ignored =
            self.options.kind == LessonType::Raw && source == InputSource::Steno;
        match event {
            InputEvent::TextInserted(text) if !steno_text_ignored => self.on_text_inserted(text),
            InputEvent::Backspace(count) if !steno_text_ignored => self.on_backspace(*count),
            InputEvent::Stroke(stroke) => self.on_stroke(stroke),
            _ => {}
        }
    }

    pub fn on_text_inserted(&mut self, text: &str) {
        if self.is_done() {
            return;
        }
        self.mark_activity();
        self.words[self.current].input.push_str(text);
        self.reconcile();
    }

    /// Delete `count` characters backwards, retreating into earlier words
    /// when the active one runs out. Whatever is left at the first word is
    /// discarded.
    pub fn on_backspace(&mut self, count: usize) {
        if self.is_done() || count == 0 {
            return;
        }
        self.mark_activity();

        let mut remaining = count;
        loop {
            let word = &mut self.words[self.current];
            let mut removed = false;
            while remaining > 0 && word.input.pop().is_some() {
                remaining -= 1;
                removed = true;
            }
            if removed {
                word.backspaced = true;
            }
            if remaining == 0 || self.current == 0 {
                break;
            }
            self.current -= 1;
        }

        self.check_invariants();
        self.reconcile();
    }

    /// Strokes only drive raw lessons; elsewhere they are display-only.
    pub fn on_stroke(&mut self, stroke: &Stroke) {
        if self.is_done() || self.options.kind != LessonType::Raw {
            return;
        }
        if stroke.rtfcre == UNDO_STROKE {
            self.undo_word();
            return;
        }
        let text = if self.words[self.current].input.is_empty() {
            stroke.rtfcre.clone()
        } else {
            format!(" {}", stroke.rtfcre)
        };
        self.on_text_inserted(&text);
    }

    fn undo_word(&mut self) {
        let count = match self.words[self.current].input.chars().count() {
            0 if self.current > 0 => self.words[self.current - 1].input.chars().count(),
            n => n,
        };
        self.on_backspace(count);
    }

    fn reconcile(&mut self) {
        let policy = self.options.policy;

        while !self.is_done() {
            let idx = self.current;
            let word = &self.words[idx];

            if policy.matches(word.input.trim(), &word.target) {
                self.advance(true);
                continue;
            }

            if idx + 1 == self.words.len() {
                break;
            }

            let Some(offset) = policy.split_point(&word.input, &self.words[idx + 1].target) else {
                break;
            };

            let tail = self.words[idx].input.split_off(offset);
            debug_assert!(!self.words[idx].input.is_empty());
            debug_assert!(self.words[idx + 1].input.is_empty());
            self.words[idx + 1].input.push_str(&tail);

            let head = &self.words[idx];
            let correct = policy.matches(head.input.trim(), &head.target);
            self.advance(correct);
        }
    }

    fn advance(&mut self, correct: bool) {
        let idx = self.current;
        if correct && idx == self.max_index {
            self.rate.record_word_completed(&self.words[idx].target);
        }

        if idx + 1 == self.words.len() {
            self.complete();
            return;
        }

        self.current += 1;
        self.max_index = self.max_index.max(self.current);
        self.mark_soft_errors(self.current - 1);
        self.check_invariants();
    }

    /// Flag every word before `upto` whose input never matched.
    fn mark_soft_errors(&mut self, upto: usize) {
        let policy = self.options.policy;
        for word in &mut self.words[..upto] {
            if !policy.matches(word.input.trim(), &word.target) {
                word.soft_error = true;
            }
        }
    }

    fn complete(&mut self) {
        self.mark_soft_errors(self.words.len());
        self.status = SessionStatus::Done;
        self.timer_running = false;

        let wpm = self.rate.wpm(true);
        let mistakes = self.mistake_count();
        self.final_wpm = Some(wpm);
        self.result = Some(LessonResult::new(
            &self.options.lesson_name,
            wpm,
            mistakes,
            self.options.lesson_hash,
        ));
        log::info!(
            "Completed {:?}: {wpm} wpm, {mistakes} mistakes",
            self.options.lesson_name
        );
    }

    fn mark_activity(&mut self) {
        self.timer_running = true;
        self.since_input = 0.0;
    }

    /// Advance the lesson clock by `dt` seconds. The clock pauses once no
    /// input has arrived for the inactivity threshold.
    pub fn tick(&mut self, dt: f64) {
        if self.is_done() {
            return;
        }
        self.since_input += dt;
        if self.since_input > self.options.inactivity_secs {
            self.timer_running = false;
        }
        self.rate.tick(dt, self.timer_running);
    }

    fn check_invariants(&self) {
        debug_assert!(self.current <= self.max_index);
        debug_assert!(self.max_index < self.words.len());
    }

    pub fn wpm(&mut self) -> u32 {
        match self.final_wpm {
            Some(wpm) => wpm,
            None => self.rate.wpm(false),
        }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn max_index(&self) -> usize {
        self.max_index
    }

    pub fn current_word(&self) -> Option<&Word> {
        self.words.get(self.current)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status == SessionStatus::Done
    }

    pub fn timer_running(&self) -> bool {
        self.timer_running
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.rate.elapsed_secs()
    }

    pub fn progress(&self) -> f64 {
        if self.is_done() {
            return 1.0;
        }
        self.current as f64 / self.words.len() as f64
    }

    pub fn mistake_count(&self) -> usize {
        self.words.iter().filter(|w| w.is_mistake()).count()
    }

    pub fn kind(&self) -> LessonType {
        self.options.kind
    }

    pub fn lesson_name(&self) -> &str {
        &self.options.lesson_name
    }

    pub fn rate(&self) -> &RateEstimator {
        &self.rate
    }

    pub fn wpm_samples(&self) -> &[TimeSeriesPoint] {
        self.rate.samples()
    }

    pub fn result(&self) -> Option<&LessonResult> {
        self.result.as_ref()
    }

    /// Hand the finished score over for recording; returns it only once.
    pub fn take_result(&mut self) -> Option<LessonResult> {
        self.result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(rtfcre: &str) -> Stroke {
        Stroke {
            keys: vec![],
            rtfcre: rtfcre.to_string(),
            paper: String::new(),
        }
    }

    fn raw_session(words: &[&str]) -> TypingSession {
        TypingSession::with_options(
            words.iter().copied(),
            SessionOptions {
                kind: LessonType::Raw,
                ..SessionOptions::default()
            },
        )
    }

    #[test]
    fn exact_match_advances() {
        let mut s = TypingSession::new(["cat", "dog"]);
        s.on_text_inserted("cat ");
        assert_eq!(s.current_index(), 1);
        assert!(!s.words()[0].is_mistake());
    }

    #[test]
    fn match_advances_before_the_space() {
        let mut s = TypingSession::new(["cat", "dog"]);
        for c in ["c", "a", "t"] {
            s.on_text_inserted(c);
        }
        assert_eq!(s.current_index(), 1);
        s.on_text_inserted(" ");
        assert_eq!(s.words()[1].input, " ");
    }

    #[test]
    fn one_stroke_can_complete_several_words() {
        let mut s = TypingSession::new(["the", "quick", "fox"]);
        s.on_text_inserted("the quick ");
        assert_eq!(s.current_index(), 2);
        assert_eq!(s.words()[0].input, "the");
        assert_eq!(s.words()[1].input, " quick ");
        assert!(!s.words()[0].is_mistake());
        assert!(!s.words()[1].is_mistake());
        assert_eq!(s.rate().words_completed(), 2);
    }

    #[test]
    fn one_stroke_can_finish_the_lesson() {
        let mut s = TypingSession::new(["the", "quick", "fox"]);
        s.on_text_inserted("the quick fox");
        assert!(s.is_done());
        assert_eq!(s.mistake_count(), 0);
    }

    #[test]
    fn backspace_crosses_word_boundary() {
        let mut s = TypingSession::new(["cat", "dog"]);
        s.on_text_inserted("cat");
        assert_eq!(s.current_index(), 1);
        assert!(s.words()[1].input.is_empty());

        s.on_backspace(2);
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.words()[0].input, "c");
        assert!(s.words()[0].backspaced);
        assert!(!s.words()[1].backspaced);
    }

    #[test]
    fn backspace_floor_discards_remainder() {
        let mut s = TypingSession::new(["cat", "dog"]);
        s.on_text_inserted("ca");
        s.on_backspace(10);
        assert_eq!(s.current_index(), 0);
        assert!(s.words()[0].input.is_empty());
        assert!(s.words()[0].backspaced);
    }

    #[test]
    fn backspace_on_empty_first_word_sets_no_flag() {
        let mut s = TypingSession::new(["cat"]);
        s.on_backspace(3);
        assert!(!s.words()[0].backspaced);
    }

    #[test]
    fn backspace_counts_characters_not_bytes() {
        let mut s = TypingSession::new(["café", "x"]);
        s.on_text_inserted("cafx");
        s.on_backspace(1);
        s.on_text_inserted("é");
        assert_eq!(s.current_index(), 1);
    }

    #[test]
    fn zero_backspace_is_ignored() {
        let mut s = TypingSession::new(["cat"]);
        s.on_text_inserted("ca");
        s.on_backspace(0);
        assert_eq!(s.words()[0].input, "ca");
        assert!(!s.words()[0].backspaced);
    }

    #[test]
    fn mismatch_is_retained_without_advancing() {
        let mut s = TypingSession::new(["cat"]);
        s.on_text_inserted("cog");
        assert!(!s.is_done());
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.words()[0].input, "cog");
    }

    #[test]
    fn completion_on_last_word() {
        let mut s = TypingSession::new(["cat"]);
        s.on_text_inserted("cat");
        assert!(s.is_done());
        assert_eq!(s.status(), SessionStatus::Done);
        assert_eq!(s.mistake_count(), 0);
        assert_eq!(s.progress(), 1.0);

        let result = s.take_result().unwrap();
        assert_eq!(result.mistakes, 0);
        assert_eq!(result.lesson_name, "custom");
        assert!(s.take_result().is_none());
    }

    #[test]
    fn wrong_word_followed_by_next_word_is_split_and_flagged() {
        let mut s = TypingSession::new(["cat", "dog", "fox"]);
        s.on_text_inserted("cax dog");
        assert_eq!(s.current_index(), 2);
        assert_eq!(s.words()[0].input, "cax");
        assert_eq!(s.words()[1].input, " dog");

        s.on_text_inserted(" fox");
        assert!(s.is_done());
        assert!(s.words()[0].soft_error);
        assert!(!s.words()[1].is_mistake());
        assert_eq!(s.mistake_count(), 1);
        // only the two correct words count towards the rate
        assert_eq!(s.rate().words_completed(), 2);
    }

    #[test]
    fn skipped_word_is_flagged_once_passed() {
        let mut s = TypingSession::new(["a", "b", "c", "d"]);
        s.on_text_inserted("x b");
        assert_eq!(s.current_index(), 2);
        assert!(s.words()[0].soft_error);
        assert!(!s.words()[1].soft_error);
        assert!(!s.is_done());
    }

    #[test]
    fn leading_space_never_splits_at_zero() {
        let mut s = TypingSession::new(["quick", "quick", "fox"]);
        s.on_text_inserted(" qu");
        assert_eq!(s.current_index(), 0);
        s.on_text_inserted("ick quick ");
        assert_eq!(s.current_index(), 2);
        for w in &s.words()[..2] {
            assert!(!w.input.trim().is_empty());
        }
    }

    #[test]
    fn revisited_words_are_not_counted_twice() {
        let mut s = TypingSession::new(["cat", "dog"]);
        s.on_text_inserted("cat");
        assert_eq!(s.rate().words_completed(), 1);
        s.on_backspace(1);
        assert_eq!(s.current_index(), 0);
        s.on_text_inserted("t");
        assert_eq!(s.current_index(), 1);
        assert_eq!(s.max_index(), 1);
        assert_eq!(s.rate().words_completed(), 1);
        assert!(s.words()[0].backspaced);
    }

    #[test]
    fn done_session_ignores_input() {
        let mut s = TypingSession::new(["cat"]);
        s.on_text_inserted("cat");
        s.on_text_inserted("more");
        s.on_backspace(3);
        assert_eq!(s.words()[0].input, "cat");
        assert!(!s.words()[0].backspaced);
    }

    #[test]
    fn empty_session_starts_done() {
        let mut s = TypingSession::new(Vec::<String>::new());
        assert!(s.is_done());
        s.on_text_inserted("x");
        s.on_backspace(1);
        assert!(s.result().is_none());
    }

    #[test]
    fn lenient_policy_accepts_case_and_symbols() {
        let options = SessionOptions {
            policy: MatchPolicy {
                strict_case: false,
                strict_symbols: false,
                ..MatchPolicy::exact()
            },
            ..SessionOptions::default()
        };
        let mut s = TypingSession::with_options(["Hello,", "world."], options);
        s.on_text_inserted("hello world");
        assert!(s.is_done());
        assert_eq!(s.mistake_count(), 0);
    }

    fn symbol_lenient() -> SessionOptions {
        SessionOptions {
            policy: MatchPolicy {
                strict_symbols: false,
                ..MatchPolicy::exact()
            },
            ..SessionOptions::default()
        }
    }

    #[test]
    fn punctuated_prompt_typed_per_key_completes() {
        let mut s = TypingSession::with_options(["Hello,", "world."], symbol_lenient());
        for c in "Hello, world.".chars() {
            s.on_text_inserted(&c.to_string());
        }
        assert!(s.is_done());
        assert_eq!(s.mistake_count(), 0);
    }

    #[test]
    fn punctuation_spilling_into_middle_word_is_not_a_mistake() {
        let mut s = TypingSession::with_options(["Hello,", "big", "world."], symbol_lenient());
        for c in "Hello, big world.".chars() {
            s.on_text_inserted(&c.to_string());
        }
        assert!(s.is_done());
        assert!(s.words().iter().all(|w| !w.soft_error));
        assert_eq!(s.mistake_count(), 0);
    }

    #[test]
    fn keyboard_style_advance_when_next_word_need_not_match() {
        let options = SessionOptions {
            policy: MatchPolicy {
                next_word_must_match: false,
                ..MatchPolicy::exact()
            },
            ..SessionOptions::default()
        };
        let mut s = TypingSession::with_options(["cat", "dog"], options);
        s.on_text_inserted("cot d");
        assert_eq!(s.current_index(), 1);
        assert_eq!(s.words()[1].input, " d");
        s.on_text_inserted("og");
        assert!(s.is_done());
        assert!(s.words()[0].soft_error);
    }

    #[test]
    fn raw_lesson_matches_strokes() {
        let mut s = raw_session(&["KAT", "TKOG"]);
        s.on_stroke(&stroke("KAT"));
        assert_eq!(s.current_index(), 1);
        s.on_stroke(&stroke("TKOG"));
        assert!(s.is_done());
    }

    #[test]
    fn raw_lesson_wrong_stroke_then_correct_one() {
        let mut s = raw_session(&["KAT", "TKOG", "RED"]);
        s.on_stroke(&stroke("KAP"));
        s.on_stroke(&stroke("TKOG"));
        assert_eq!(s.current_index(), 2);
        assert_eq!(s.words()[0].input, "KAP");
    }

    #[test]
    fn asterisk_undoes_whole_word() {
        let mut s = raw_session(&["KAT", "TKOG"]);
        s.on_stroke(&stroke("KAP"));
        s.on_stroke(&stroke(UNDO_STROKE));
        assert!(s.words()[0].input.is_empty());
        assert!(s.words()[0].backspaced);

        s.on_stroke(&stroke("KAT"));
        assert_eq!(s.current_index(), 1);
        s.on_stroke(&stroke(UNDO_STROKE));
        assert_eq!(s.current_index(), 0);
        assert!(s.words()[0].input.is_empty());
    }

    #[test]
    fn raw_lesson_ignores_steno_text_but_not_keyboard() {
        let mut s = raw_session(&["KAT"]);
        s.apply(InputSource::Steno, &InputEvent::TextInserted("cat".into()));
        assert!(s.words()[0].input.is_empty());
        s.apply(InputSource::Keyboard, &InputEvent::TextInserted("KAT".into()));
        assert!(s.is_done());
    }

    #[test]
    fn strokes_are_display_only_in_word_lessons() {
        let mut s = TypingSession::new(["KAT"]);
        s.apply(InputSource::Steno, &InputEvent::Stroke(stroke("KAT")));
        assert!(s.words()[0].input.is_empty());
    }

    #[test]
    fn timer_runs_on_input_and_pauses_when_idle() {
        let mut s = TypingSession::new(["cat", "dog"]);
        s.tick(1.0);
        assert!(!s.timer_running());
        assert_eq!(s.elapsed_secs(), 0.0);

        s.on_text_inserted("c");
        assert!(s.timer_running());
        s.tick(1.0);
        assert_eq!(s.elapsed_secs(), 1.0);

        s.tick(DEFAULT_INACTIVITY_SECS);
        assert!(!s.timer_running());
        let paused_at = s.elapsed_secs();
        s.tick(3.0);
        assert_eq!(s.elapsed_secs(), paused_at);
    }

    #[test]
    fn completed_lesson_reports_finite_wpm() {
        let mut s = TypingSession::new(["cat", "dog"]);
        s.on_text_inserted("cat");
        s.tick(0.5);
        s.on_text_inserted(" dog");
        assert!(s.is_done());
        assert!(!s.timer_running());
        // 8 chars over half a second
        assert_eq!(s.wpm(), 192);
        assert_eq!(s.result().unwrap().wpm, 192);
    }

    #[test]
    fn options_from_lesson() {
        let mut lesson = Lesson::from_prompt("a b");
        lesson.name = "drill".into();
        lesson.kind = LessonType::Raw;
        let options = SessionOptions::for_lesson(&lesson);
        assert_eq!(options.kind, LessonType::Raw);
        assert_eq!(options.lesson_name, "drill");
        assert_eq!(options.lesson_hash, lesson.fingerprint());
    }
}
