use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use time_humanize::{Accuracy, HumanTime, Tense};

use crate::app_dirs::AppDirs;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FIELD_COUNT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("lesson name contains a comma: {0:?}")]
    InvalidName(String),
    #[error("failed to write history: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of one completed lesson, one line in the history file.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonResult {
    pub time: DateTime<Local>,
    pub lesson_name: String,
    pub wpm: u32,
    pub mistakes: usize,
    pub lesson_hash: i32,
}

impl LessonResult {
    pub fn new(lesson_name: &str, wpm: u32, mistakes: usize, lesson_hash: i32) -> Self {
        Self {
            time: Local::now(),
            lesson_name: lesson_name.to_string(),
            wpm,
            mistakes,
            lesson_hash,
        }
    }

    pub fn serialize(&self) -> Result<String, HistoryError> {
        if self.lesson_name.contains(',') {
            return Err(HistoryError::InvalidName(self.lesson_name.clone()));
        }
        Ok(format!(
            "{},Lesson: {},WPM: {},Mistakes: {},Hash: {}\n",
            self.time.format(TIME_FORMAT),
            self.lesson_name,
            self.wpm,
            self.mistakes,
            self.lesson_hash
        ))
    }

    /// Fraction of words typed without a mistake.
    pub fn accuracy(&self, word_count: usize) -> f64 {
        if word_count == 0 {
            return 1.0;
        }
        (1.0 - self.mistakes as f64 / word_count as f64).clamp(0.0, 1.0)
    }

    pub fn ago(&self, now: DateTime<Local>) -> String {
        humanize_ago(now.signed_duration_since(self.time))
    }
}

/// Rough English age of a result. Timestamps from the future read as now.
fn humanize_ago(elapsed: chrono::Duration) -> String {
    let elapsed = elapsed.to_std().unwrap_or_default();
    HumanTime::from(elapsed).to_text_en(Accuracy::Rough, Tense::Past)
}

/// Parse history text, skipping and logging any malformed line.
pub fn parse_history(text: &str) -> Vec<LessonResult> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    let mut results = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                log::error!("Unreadable history line: {e}");
                continue;
            }
        };
        let line = record.iter().collect::<Vec<_>>().join(",");
        if record.len() != FIELD_COUNT {
            log::error!("Invalid history line, expected {FIELD_COUNT} fields: {line:?}");
            continue;
        }
        match parse_record(&record) {
            Some(r) => results.push(r),
            None => log::error!("Invalid history line: {line:?}"),
        }
    }
    results
}

fn parse_record(record: &csv::StringRecord) -> Option<LessonResult> {
    let naive = NaiveDateTime::parse_from_str(record.get(0)?.trim(), TIME_FORMAT).ok()?;
    let time = Local.from_local_datetime(&naive).earliest()?;
    Some(LessonResult {
        time,
        lesson_name: field_value(record.get(1)?)?.to_string(),
        wpm: field_value(record.get(2)?)?.parse().ok()?,
        mistakes: field_value(record.get(3)?)?.parse().ok()?,
        lesson_hash: field_value(record.get(4)?)?.parse().ok()?,
    })
}

fn field_value(field: &str) -> Option<&str> {
    field.split_once(':').map(|(_, value)| value.trim())
}

/// Results for one lesson, oldest first.
pub fn for_lesson(results: &[LessonResult], lesson_hash: i32) -> Vec<&LessonResult> {
    let mut matching: Vec<_> = results
        .iter()
        .filter(|r| r.lesson_hash == lesson_hash)
        .collect();
    matching.sort_by_key(|r| r.time);
    matching
}

pub fn personal_best(results: &[LessonResult], lesson_hash: i32) -> Option<u32> {
    results
        .iter()
        .filter(|r| r.lesson_hash == lesson_hash)
        .map(|r| r.wpm)
        .max()
}

/// Persists completed lessons.
pub trait SessionRecorder {
    fn record(&mut self, result: &LessonResult) -> Result<(), HistoryError>;
    fn load(&self) -> Vec<LessonResult>;
}

/// Append-only history file.
#[derive(Debug, Clone)]
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new() -> Self {
        Self {
            path: AppDirs::history_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRecorder for FileHistory {
    fn record(&mut self, result: &LessonResult) -> Result<(), HistoryError> {
        let line = result.serialize().inspect_err(|e| log::error!("{e}"))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        log::info!("Recorded result for {:?} to {:?}", result.lesson_name, self.path);
        Ok(())
    }

    fn load(&self) -> Vec<LessonResult> {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_history(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::error!("Failed to read history {:?}: {e}", self.path);
                Vec::new()
            }
        }
    }
}

/// History kept in memory only, for sessions that should leave no trace.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    results: Vec<LessonResult>,
}

impl SessionRecorder for MemoryHistory {
    fn record(&mut self, result: &LessonResult) -> Result<(), HistoryError> {
        result.serialize()?;
        self.results.push(result.clone());
        Ok(())
    }

    fn load(&self) -> Vec<LessonResult> {
        self.results.clone()
    }
}
