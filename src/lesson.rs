use std::fs;
use std::path::{Path, PathBuf};

use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::util::consistent_hash;

static COURSE_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/courses");

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    #[error("failed to read course {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse course {name}: {source}")]
    Parse {
        name: String,
        source: serde_json::Error,
    },
    #[error("no lesson named or numbered {0:?} in course")]
    NotFound(String),
    #[error("lesson {0:?} contains no words")]
    Empty(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    /// Targets are steno outlines; strokes are matched, not their translations.
    Raw,
    #[default]
    Words,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
pub enum LessonOrder {
    #[default]
    Ordered,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LessonSettings {
    pub strict_spaces: bool,
    pub strict_symbols: bool,
    pub strict_case: bool,
    pub only_advance_when_next_word_correct: bool,
}

impl Default for LessonSettings {
    fn default() -> Self {
        Self {
            strict_spaces: true,
            strict_symbols: true,
            strict_case: true,
            only_advance_when_next_word_correct: true,
        }
    }
}

/// Post-shuffle transformation: when every word of `sequence` is present,
/// with probability `chance` the rest of the sequence is moved to directly
/// follow its first word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSwap {
    pub sequence: Vec<String>,
    pub chance: f64,
}

impl WordSwap {
    pub fn apply<R: Rng + ?Sized>(&self, words: &mut [String], rng: &mut R) {
        let Some(head) = self.sequence.first() else {
            return;
        };
        if !self.sequence.iter().all(|s| words.contains(s)) {
            return;
        }
        if !rng.gen_bool(self.chance.clamp(0.0, 1.0)) {
            return;
        }
        let Some(start) = words.iter().position(|w| w == head) else {
            return;
        };

        for (k, wanted) in self.sequence.iter().enumerate().skip(1) {
            let slot = start + k;
            if slot >= words.len() {
                break;
            }
            let placed = start..slot;
            if let Some(from) = words
                .iter()
                .enumerate()
                .position(|(i, w)| w == wanted && !placed.contains(&i))
            {
                words.swap(slot, from);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: LessonType,
    #[serde(default)]
    pub order: LessonOrder,
    #[serde(default = "default_repeat")]
    pub repeat: usize,
    pub prompts: String,
    #[serde(default)]
    pub settings: LessonSettings,
    #[serde(default)]
    pub swaps: Vec<WordSwap>,
}

fn default_repeat() -> usize {
    1
}

impl Lesson {
    /// Ad-hoc lesson typed verbatim, e.g. from `--prompt`.
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            name: "custom".to_string(),
            kind: LessonType::Words,
            order: LessonOrder::Ordered,
            repeat: 1,
            prompts: prompt.to_string(),
            settings: LessonSettings::default(),
            swaps: Vec::new(),
        }
    }

    /// Expand repeats and apply ordering to produce the session's target words.
    pub fn materialize_words<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let mut words = Vec::new();
        for _ in 0..self.repeat.max(1) {
            let mut tokens: Vec<String> = self
                .prompts
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if self.order == LessonOrder::Random {
                tokens.shuffle(rng);
                for swap in &self.swaps {
                    swap.apply(&mut tokens, rng);
                }
            }
            words.extend(tokens);
        }
        words
    }

    /// Content fingerprint recorded with results, so a changed lesson is
    /// distinguishable from the one a score was set on.
    pub fn fingerprint(&self) -> i32 {
        consistent_hash(&self.name) ^ consistent_hash(&self.prompts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Course {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LessonError> {
        let path = path.as_ref();
        log::info!("Loading course from {path:?}");
        let text = fs::read_to_string(path).map_err(|source| LessonError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&path.display().to_string(), &text)
    }

    pub fn parse(name: &str, text: &str) -> Result<Self, LessonError> {
        let course: Course = serde_json::from_str(text).map_err(|source| LessonError::Parse {
            name: name.to_string(),
            source,
        })?;
        log::info!(
            "Loaded course {:?} with {} lessons",
            course.name,
            course.lessons.len()
        );
        Ok(course)
    }

    /// Courses shipped inside the binary. Files that fail to parse are logged
    /// and skipped.
    pub fn builtin() -> Vec<Course> {
        let mut courses: Vec<Course> = COURSE_DIR
            .files()
            .filter_map(|file| {
                let name = file.path().display().to_string();
                let text = file.contents_utf8()?;
                match Self::parse(&name, text) {
                    Ok(course) => Some(course),
                    Err(e) => {
                        log::error!("{e}");
                        None
                    }
                }
            })
            .collect();
        courses.sort_by(|a, b| a.name.cmp(&b.name));
        courses
    }

    /// Look a lesson up by exact name, or by 1-based position.
    pub fn lesson(&self, selector: &str) -> Result<&Lesson, LessonError> {
        if let Some(lesson) = self.lessons.iter().find(|l| l.name == selector) {
            return Ok(lesson);
        }
        selector
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.lessons.get(i))
            .ok_or_else(|| LessonError::NotFound(selector.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn lesson(prompts: &str, order: LessonOrder, repeat: usize) -> Lesson {
        Lesson {
            name: "test".into(),
            kind: LessonType::Words,
            order,
            repeat,
            prompts: prompts.into(),
            settings: LessonSettings::default(),
            swaps: Vec::new(),
        }
    }

    #[test]
    fn test_ordered_words_with_repeat() {
        let mut rng = StdRng::seed_from_u64(1);
        let l = lesson("the  quick\nfox", LessonOrder::Ordered, 2);
        assert_eq!(
            l.materialize_words(&mut rng),
            vec!["the", "quick", "fox", "the", "quick", "fox"]
        );
    }

    #[test]
    fn test_zero_repeat_treated_as_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let l = lesson("a b", LessonOrder::Ordered, 0);
        assert_eq!(l.materialize_words(&mut rng).len(), 2);
    }

    #[test]
    fn test_random_order_is_a_permutation_per_repeat() {
        let mut rng = StdRng::seed_from_u64(7);
        let l = lesson("a b c d e f", LessonOrder::Random, 3);
        let words = l.materialize_words(&mut rng);
        assert_eq!(words.len(), 18);
        for chunk in words.chunks(6) {
            let mut sorted = chunk.to_vec();
            sorted.sort();
            assert_eq!(sorted, vec!["a", "b", "c", "d", "e", "f"]);
        }
    }

    #[test]
    fn test_word_swap_always() {
        let mut rng = StdRng::seed_from_u64(3);
        let swap = WordSwap {
            sequence: vec!["big".into(), "red".into(), "dog".into()],
            chance: 1.0,
        };
        let mut words: Vec<String> = ["dog", "a", "big", "x", "red"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        swap.apply(&mut words, &mut rng);
        let start = words.iter().position(|w| w == "big").unwrap();
        assert_eq!(&words[start..start + 3], &["big", "red", "dog"]);
        assert_eq!(words.len(), 5);
    }

    #[test]
    fn test_word_swap_never() {
        let mut rng = StdRng::seed_from_u64(3);
        let swap = WordSwap {
            sequence: vec!["a".into(), "b".into()],
            chance: 0.0,
        };
        let mut words: Vec<String> = vec!["a".into(), "c".into(), "b".into()];
        swap.apply(&mut words, &mut rng);
        assert_eq!(words, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_word_swap_missing_word_is_noop() {
        let mut rng = StdRng::seed_from_u64(3);
        let swap = WordSwap {
            sequence: vec!["a".into(), "z".into()],
            chance: 1.0,
        };
        let mut words: Vec<String> = vec!["a".into(), "c".into(), "b".into()];
        swap.apply(&mut words, &mut rng);
        assert_eq!(words, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_fingerprint_depends_on_content() {
        let a = lesson("one two", LessonOrder::Ordered, 1);
        let b = lesson("one two three", LessonOrder::Ordered, 1);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_parse_course_with_defaults() {
        let json = r#"{
            "name": "Basics",
            "lessons": [
                { "name": "home row", "prompts": "as sad lad" },
                { "name": "strokes", "type": "raw", "order": "random", "repeat": 2,
                  "prompts": "KAT TKOG",
                  "settings": { "strict_case": false } }
            ]
        }"#;
        let course = Course::parse("inline", json).unwrap();
        assert_eq!(course.lessons.len(), 2);
        let first = &course.lessons[0];
        assert_eq!(first.kind, LessonType::Words);
        assert_eq!(first.repeat, 1);
        assert_eq!(first.settings, LessonSettings::default());
        let second = course.lesson("strokes").unwrap();
        assert_eq!(second.kind, LessonType::Raw);
        assert_eq!(second.order, LessonOrder::Random);
        assert!(!second.settings.strict_case);
        assert!(second.settings.strict_symbols);
    }

    #[test]
    fn test_lesson_by_index() {
        let course = Course::parse(
            "inline",
            r#"{"name":"c","lessons":[{"name":"x","prompts":"a"},{"name":"y","prompts":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(course.lesson("2").unwrap().name, "y");
        assert!(matches!(course.lesson("3"), Err(LessonError::NotFound(_))));
        assert!(matches!(course.lesson("0"), Err(LessonError::NotFound(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Course::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, LessonError::Io { .. }));
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Course::load(file.path()).unwrap_err();
        assert!(matches!(err, LessonError::Parse { .. }));
    }

    #[test]
    fn test_builtin_courses_parse() {
        let courses = Course::builtin();
        assert!(!courses.is_empty());
        assert!(courses.iter().all(|c| !c.lessons.is_empty()));
    }
}
