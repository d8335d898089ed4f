use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One chord from the steno engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stroke {
    /// Key labels pressed together, e.g. `["S-", "T-", "-T"]`.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Canonical stroke text, e.g. `STAT`.
    #[serde(default)]
    pub rtfcre: String,
    /// Fixed-column rendering for the paper tape.
    #[serde(default)]
    pub paper: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StenoError {
    #[error("failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dictionary: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A multi-stroke outline such as `KAT/HROG`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outline(String);

impl Outline {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn strokes(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes().count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Outline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-way steno dictionary: outline to translation and translation to every
/// outline that produces it.
#[derive(Debug, Default)]
pub struct StenoDictionary {
    lookup: HashMap<Outline, String>,
    translations: HashMap<String, Vec<Outline>>,
}

impl StenoDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StenoError> {
        let mut dict = Self::new();
        dict.merge_file(path)?;
        Ok(dict)
    }

    pub fn merge_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, StenoError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let added = self.merge_json(&text)?;
        log::info!("Loaded {added} dictionary entries from {path:?}");
        Ok(added)
    }

    /// Merge a Plover-style JSON dictionary. Existing outlines win; conflicts
    /// are logged.
    pub fn merge_json(&mut self, text: &str) -> Result<usize, StenoError> {
        let entries: HashMap<String, String> = serde_json::from_str(text)?;
        let added = entries
            .into_iter()
            .sorted()
            .filter(|(outline, translation)| self.insert(outline, translation))
            .count();
        Ok(added)
    }

    pub fn insert(&mut self, outline: &str, translation: &str) -> bool {
        let outline = Outline::new(outline);
        if self.lookup.contains_key(&outline) {
            log::error!("Dictionary conflict. Multiple definitions for {outline}");
            return false;
        }
        self.lookup.insert(outline.clone(), translation.to_string());
        self.translations
            .entry(translation.to_string())
            .or_default()
            .push(outline);
        true
    }

    pub fn translate(&self, outline: &str) -> Option<&str> {
        self.lookup
            .get(&Outline::new(outline))
            .map(String::as_str)
    }

    pub fn outlines_for(&self, word: &str) -> &[Outline] {
        self.translations
            .get(word)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Fewest strokes first, then shortest text; used for hints.
    pub fn best_outline(&self, word: &str) -> Option<&Outline> {
        self.outlines_for(word)
            .iter()
            .min_by_key(|o| (o.stroke_count(), o.as_str().len()))
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

/// Watches the stroke stream for a fixed sequence of strokes.
#[derive(Debug, Clone)]
pub struct KeyCombo {
    phrase: Vec<String>,
    recent: VecDeque<String>,
}

impl KeyCombo {
    pub fn new<S: Into<String>>(phrase: impl IntoIterator<Item = S>) -> Self {
        let phrase: Vec<String> = phrase.into_iter().map(Into::into).collect();
        if phrase.is_empty() {
            log::error!("Invalid empty watch phrase registered");
        } else {
            log::info!("Registered watch phrase: {}", phrase.join(","));
        }
        Self {
            recent: VecDeque::with_capacity(phrase.len()),
            phrase,
        }
    }

    /// Feed one stroke; true when the last strokes spell the phrase.
    pub fn on_stroke(&mut self, rtfcre: &str) -> bool {
        if self.phrase.is_empty() {
            return false;
        }
        if self.recent.len() == self.phrase.len() {
            self.recent.pop_front();
        }
        self.recent.push_back(rtfcre.to_string());

        self.recent.len() == self.phrase.len() && self.recent.iter().eq(self.phrase.iter())
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}
