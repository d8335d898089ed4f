use serde::{Deserialize, Serialize};

use crate::time_series::TimeSeriesPoint;

/// Minimum time between two WPM recomputations.
pub const CALCULATION_INTERVAL: f64 = 0.5;
/// Trailing window used by the blended strategy.
pub const OBSERVATION_WINDOW: f64 = 10.0;
/// Number of most recent words used for the instantaneous rate.
pub const WORDS_CONSIDERED: usize = 5;
/// Stale entries are dropped once at least this many have accumulated.
const DEFRAG_COUNT: usize = 32;
const CHARS_PER_WORD: f64 = 5.0;

/// Read-only view of the estimator handed to a [`RateStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct RateSnapshot<'a> {
    /// Seconds since each confirmed word, oldest first.
    pub word_ages: &'a [f64],
    pub elapsed_secs: f64,
    pub chars_typed: usize,
}

pub trait RateStrategy: std::fmt::Debug + Send {
    fn calculate(&self, snapshot: &RateSnapshot) -> f64;
}

/// Confirmed characters / 5 per elapsed minute.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrossRate;

impl RateStrategy for GrossRate {
    fn calculate(&self, snapshot: &RateSnapshot) -> f64 {
        gross_wpm(snapshot.chars_typed, snapshot.elapsed_secs)
    }
}

/// Mean of the trailing-window word count, the rate over the last few words
/// and the gross rate. Reacts faster to changes in pace than [`GrossRate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BlendedRate;

impl RateStrategy for BlendedRate {
    fn calculate(&self, snapshot: &RateSnapshot) -> f64 {
        let ages = snapshot.word_ages;

        let in_window = ages.iter().filter(|&&age| age < OBSERVATION_WINDOW).count();
        let window_wpm = in_window as f64 * 60.0 / OBSERVATION_WINDOW;

        let considered = ages.len().min(WORDS_CONSIDERED);
        let recent_wpm = match ages.get(ages.len() - considered) {
            Some(&oldest) if considered > 0 && oldest > 0.0 => considered as f64 / oldest * 60.0,
            _ => 0.0,
        };

        let gross = gross_wpm(snapshot.chars_typed, snapshot.elapsed_secs);

        (window_wpm + recent_wpm + gross) / 3.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RateStrategyKind {
    #[default]
    Gross,
    Blended,
}

impl RateStrategyKind {
    pub fn build(self) -> Box<dyn RateStrategy> {
        match self {
            RateStrategyKind::Gross => Box::new(GrossRate),
            RateStrategyKind::Blended => Box::new(BlendedRate),
        }
    }
}

pub fn gross_wpm(chars: usize, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    chars as f64 / CHARS_PER_WORD * 60.0 / seconds
}

/// Smoothed words-per-minute estimate driven by word completions and
/// elapsed frame time.
#[derive(Debug)]
pub struct RateEstimator {
    word_ages: Vec<f64>,
    words_completed: usize,
    elapsed_secs: f64,
    chars_typed: usize,
    since_last_calc: f64,
    last_wpm: u32,
    samples: Vec<TimeSeriesPoint>,
    strategy: Box<dyn RateStrategy>,
}

impl RateEstimator {
    pub fn new(strategy: Box<dyn RateStrategy>) -> Self {
        Self {
            word_ages: Vec::new(),
            words_completed: 0,
            elapsed_secs: 0.0,
            chars_typed: 0,
            since_last_calc: 0.0,
            last_wpm: 0,
            samples: Vec::new(),
            strategy,
        }
    }

    pub fn record_word_completed(&mut self, word: &str) {
        self.word_ages.push(0.0);
        self.words_completed += 1;
        // trailing space counts as a typed character
        self.chars_typed += word.chars().count() + 1;
    }

    /// Age every completed word by `dt`; lesson time only advances while the
    /// timer is running.
    pub fn tick(&mut self, dt: f64, timer_running: bool) {
        if dt <= 0.0 {
            return;
        }
        for age in &mut self.word_ages {
            *age += dt;
        }
        if timer_running {
            self.elapsed_secs += dt;
        }
        self.since_last_calc += dt;
    }

    pub fn wpm(&mut self, force_recalc: bool) -> u32 {
        if force_recalc || self.since_last_calc >= CALCULATION_INTERVAL {
            self.last_wpm = self.calculate();
            self.since_last_calc = 0.0;
            if self.elapsed_secs > 0.0 {
                self.samples
                    .push(TimeSeriesPoint::new(self.elapsed_secs, self.last_wpm as f64));
            }
        }
        self.last_wpm
    }

    fn calculate(&mut self) -> u32 {
        let snapshot = RateSnapshot {
            word_ages: &self.word_ages,
            elapsed_secs: self.elapsed_secs,
            chars_typed: self.chars_typed,
        };
        let raw = self.strategy.calculate(&snapshot);

        let first_fresh = self
            .word_ages
            .iter()
            .position(|&age| age < OBSERVATION_WINDOW)
            .unwrap_or(self.word_ages.len());
        if first_fresh >= DEFRAG_COUNT {
            // the newest WORDS_CONSIDERED entries are kept for the recent rate
            let keep_from = first_fresh.min(self.word_ages.len().saturating_sub(WORDS_CONSIDERED));
            self.word_ages.drain(..keep_from);
        }

        let wpm = if raw.is_finite() && raw > 0.0 {
            raw.round() as u32
        } else {
            0
        };
        log::trace!("calculated wpm={wpm} raw={raw:.2}");
        wpm
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn chars_typed(&self) -> usize {
        self.chars_typed
    }

    pub fn words_completed(&self) -> usize {
        self.words_completed
    }

    pub fn samples(&self) -> &[TimeSeriesPoint] {
        &self.samples
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(Box::new(GrossRate))
    }
}
