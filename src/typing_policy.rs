use crate::lesson::LessonSettings;
use crate::util::nth_whitespace_offset;

/// How typed input is compared against target words, derived from a
/// lesson's strictness settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub strict_case: bool,
    pub strict_symbols: bool,
    pub strict_spaces: bool,
    pub next_word_must_match: bool,
}

impl MatchPolicy {
    /// Every flag strict: input must equal the target character for character.
    pub fn exact() -> Self {
        Self {
            strict_case: true,
            strict_symbols: true,
            strict_spaces: true,
            next_word_must_match: true,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.strict_case && self.strict_symbols && self.strict_spaces
    }

    /// Compare an already trimmed input against a target. Lenient policies
    /// trim again after normalizing, since dropped symbols can expose
    /// whitespace at either end.
    pub fn matches(&self, input: &str, target: &str) -> bool {
        if self.is_exact() {
            return input == target;
        }
        self.normalize(input).trim() == self.normalize(target).trim()
    }

    fn normalize(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut last_was_space = false;
        for c in s.chars() {
            if !self.strict_symbols && c.is_ascii_punctuation() {
                continue;
            }
            if !self.strict_spaces && c.is_whitespace() {
                if last_was_space {
                    continue;
                }
                last_was_space = true;
                out.push(' ');
                continue;
            }
            last_was_space = false;
            if self.strict_case {
                out.push(c);
            } else {
                out.extend(c.to_lowercase());
            }
        }
        out
    }

    /// Find where a buffer spanning several words should be cut so the tail
    /// can move onto the next word. Returns the byte offset of the delimiter
    /// that starts the tail; the offset is never 0.
    pub fn split_point(&self, buffer: &str, next_target: &str) -> Option<usize> {
        let tokens: Vec<&str> = buffer.split(char::is_whitespace).collect();
        // A leading delimiter produces an empty first token that must not be
        // mistaken for a word boundary.
        let first = if tokens.first().is_some_and(|t| t.is_empty()) {
            2
        } else {
            1
        };

        for (i, token) in tokens.iter().enumerate().skip(first) {
            let candidate = if self.next_word_must_match {
                self.matches(token, next_target)
            } else {
                !token.is_empty()
            };
            if !candidate {
                continue;
            }
            match nth_whitespace_offset(buffer, i) {
                Some(offset) if offset > 0 => return Some(offset),
                _ => continue,
            }
        }
        None
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::exact()
    }
}

impl From<&LessonSettings> for MatchPolicy {
    fn from(settings: &LessonSettings) -> Self {
        Self {
            strict_case: settings.strict_case,
            strict_symbols: settings.strict_symbols,
            strict_spaces: settings.strict_spaces,
            next_word_must_match: settings.only_advance_when_next_word_correct,
        }
    }
}
