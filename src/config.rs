//! Configuration for the generator and the feature deriver.
//!
//! Every field has a serde default, so a config file only needs the values it
//! overrides. [`GeneratorConfig::validate`] is the single place configuration
//! errors are raised.

use crate::error::SynthError;
use crate::types::{TrendPattern, FEATURE_COUNT, WINDOW_SIZE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Allowed deviation of the pattern probabilities from 1
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Main configuration for a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of synthetic subjects
    pub subjects: usize,
    /// Base seed; subject `i` draws from `seed + i`
    pub seed: u64,
    /// Fewest sessions a subject may get
    pub min_sessions: usize,
    /// Most sessions a subject may get
    pub max_sessions: usize,
    /// Trailing sessions per feature window
    pub window_size: usize,
    /// Channels per feature vector, must match the deriver
    pub feature_count: usize,
    pub patterns: PatternTable,
    pub noise: NoiseConfig,
    pub schedule: ScheduleConfig,
    pub labels: LabelMap,
    pub slope_policy: SlopePolicy,
    /// Map subjects on the rayon pool
    pub parallel: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            subjects: 1000,
            seed: 42,
            min_sessions: WINDOW_SIZE,
            max_sessions: WINDOW_SIZE,
            window_size: WINDOW_SIZE,
            feature_count: FEATURE_COUNT,
            patterns: PatternTable::default(),
            noise: NoiseConfig::default(),
            schedule: ScheduleConfig::default(),
            labels: LabelMap::default(),
            slope_policy: SlopePolicy::default(),
            parallel: true,
        }
    }
}

impl GeneratorConfig {
    /// Load a configuration file (JSON).
    pub fn load(path: &Path) -> Result<Self, SynthError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SynthError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, SynthError> {
        let config: GeneratorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every setting before any subject is simulated.
    pub fn validate(&self) -> Result<(), SynthError> {
        self.patterns.validate()?;
        self.noise.validate()?;
        self.labels.validate()?;

        if self.window_size == 0 {
            return Err(SynthError::Configuration(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.feature_count != FEATURE_COUNT {
            return Err(SynthError::Configuration(format!(
                "feature_count {} does not match the {} derived channels",
                self.feature_count, FEATURE_COUNT
            )));
        }
        if self.min_sessions == 0 || self.min_sessions > self.max_sessions {
            return Err(SynthError::Configuration(format!(
                "invalid session range {}..={}",
                self.min_sessions, self.max_sessions
            )));
        }
        if self.schedule.interval_days == 0 {
            return Err(SynthError::Configuration(
                "schedule.interval_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Probability of each trend pattern in the simulated population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternTable {
    pub stable: f64,
    pub declining: f64,
    pub improving: f64,
    pub volatile: f64,
}

impl Default for PatternTable {
    fn default() -> Self {
        Self {
            stable: 0.6,
            declining: 0.2,
            improving: 0.1,
            volatile: 0.1,
        }
    }
}

impl PatternTable {
    /// Table that always yields `pattern`
    pub fn only(pattern: TrendPattern) -> Self {
        let mut table = Self {
            stable: 0.0,
            declining: 0.0,
            improving: 0.0,
            volatile: 0.0,
        };
        match pattern {
            TrendPattern::Stable => table.stable = 1.0,
            TrendPattern::Declining => table.declining = 1.0,
            TrendPattern::Improving => table.improving = 1.0,
            TrendPattern::Volatile => table.volatile = 1.0,
        }
        table
    }

    pub fn weight(&self, pattern: TrendPattern) -> f64 {
        match pattern {
            TrendPattern::Stable => self.stable,
            TrendPattern::Declining => self.declining,
            TrendPattern::Improving => self.improving,
            TrendPattern::Volatile => self.volatile,
        }
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        for pattern in TrendPattern::ALL {
            let weight = self.weight(pattern);
            if !weight.is_finite() || weight < 0.0 {
                return Err(SynthError::Configuration(format!(
                    "probability for {pattern} must be a non-negative number, got {weight}"
                )));
            }
        }

        let total: f64 = TrendPattern::ALL.iter().map(|p| self.weight(*p)).sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(SynthError::Configuration(format!(
                "pattern probabilities sum to {total}, expected 1"
            )));
        }
        Ok(())
    }

    /// Map a uniform draw in [0, 1) onto a pattern by cumulative weight.
    pub fn pick(&self, u: f64) -> TrendPattern {
        let mut cumulative = 0.0;
        for pattern in TrendPattern::ALL {
            cumulative += self.weight(pattern);
            if u < cumulative {
                return pattern;
            }
        }
        // Rounding can leave u just above the last boundary
        TrendPattern::ALL
            .iter()
            .rev()
            .copied()
            .find(|p| self.weight(*p) > 0.0)
            .unwrap_or(TrendPattern::Stable)
    }
}

/// Standard deviations of the per-session noise terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub memory_sd: f64,
    pub reaction_sd: f64,
    pub pattern_sd: f64,
    pub language_sd: f64,
    /// Spread of the fresh memory modifier of volatile subjects
    pub volatile_memory_sd: f64,
    /// Spread of the fresh reaction modifier of volatile subjects
    pub volatile_reaction_sd: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            memory_sd: 0.05,
            reaction_sd: 15.0,
            pattern_sd: 1.0,
            language_sd: 10.0,
            volatile_memory_sd: 0.15,
            volatile_reaction_sd: 40.0,
        }
    }
}

impl NoiseConfig {
    /// No noise at all: sessions follow baseline and trend exactly.
    pub fn silent() -> Self {
        Self {
            memory_sd: 0.0,
            reaction_sd: 0.0,
            pattern_sd: 0.0,
            language_sd: 0.0,
            volatile_memory_sd: 0.0,
            volatile_reaction_sd: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        let terms = [
            ("memory_sd", self.memory_sd),
            ("reaction_sd", self.reaction_sd),
            ("pattern_sd", self.pattern_sd),
            ("language_sd", self.language_sd),
            ("volatile_memory_sd", self.volatile_memory_sd),
            ("volatile_reaction_sd", self.volatile_reaction_sd),
        ];
        for (name, sd) in terms {
            if !sd.is_finite() || sd < 0.0 {
                return Err(SynthError::Configuration(format!(
                    "noise.{name} must be a non-negative number, got {sd}"
                )));
            }
        }
        Ok(())
    }
}

/// Session calendar: nominal spacing plus symmetric jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Date of the first nominal session
    pub start_date: NaiveDate,
    pub interval_days: u32,
    /// Each date moves by a uniform integer in [-jitter, jitter]
    pub jitter_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            interval_days: 14,
            jitter_days: 2,
        }
    }
}

/// Collapse of trend patterns onto classifier labels.
///
/// Volatile maps onto the stable class by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelMap {
    pub stable: u8,
    pub declining: u8,
    pub improving: u8,
    pub volatile: u8,
}

impl Default for LabelMap {
    fn default() -> Self {
        Self {
            stable: 0,
            declining: 1,
            improving: 2,
            volatile: 0,
        }
    }
}

impl LabelMap {
    /// One class per pattern, volatile included
    pub fn four_class() -> Self {
        Self {
            volatile: 3,
            ..Self::default()
        }
    }

    pub fn collapse(&self, pattern: TrendPattern) -> u8 {
        match pattern {
            TrendPattern::Stable => self.stable,
            TrendPattern::Declining => self.declining,
            TrendPattern::Improving => self.improving,
            TrendPattern::Volatile => self.volatile,
        }
    }

    /// Number of distinct classes the labels span
    pub fn num_classes(&self) -> usize {
        TrendPattern::ALL
            .iter()
            .map(|p| self.collapse(*p) as usize)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Labels must cover 0..num_classes without holes.
    pub fn validate(&self) -> Result<(), SynthError> {
        let mut used = [false; 4];
        for pattern in TrendPattern::ALL {
            let label = self.collapse(pattern) as usize;
            if label >= used.len() {
                return Err(SynthError::Configuration(format!(
                    "label {label} for {pattern} is out of range 0..4"
                )));
            }
            used[label] = true;
        }
        if let Some(hole) = (0..self.num_classes()).find(|l| !used[*l]) {
            return Err(SynthError::Configuration(format!(
                "label map leaves class {hole} unused"
            )));
        }
        Ok(())
    }
}

/// Which memory sequence the slope gradient is taken over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopePolicy {
    /// Gradient over every session, then truncated to the window
    #[default]
    FullSequence,
    /// Gradient over the retained window only
    RetainedWindow,
}
