//! Core types for the cogtrend pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: subject profiles, raw session records, derived feature vectors and
//! the fixed-length windows handed to the classifier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of trailing sessions in a feature window
pub const WINDOW_SIZE: usize = 6;

/// Number of derived channels per session
pub const FEATURE_COUNT: usize = 8;

/// Measurable range of memory accuracy
pub const MEMORY_RANGE: (f64, f64) = (0.1, 1.0);
/// Measurable range of reaction time (ms)
pub const REACTION_RANGE_MS: (f64, f64) = (150.0, 1000.0);
/// Measurable range of pattern level
pub const PATTERN_RANGE: (f64, f64) = (1.0, 10.0);
/// Measurable range of language fluency (wpm)
pub const LANGUAGE_RANGE_WPM: (f64, f64) = (50.0, 250.0);

/// Channel order of every feature vector
pub const CHANNEL_NAMES: [&str; FEATURE_COUNT] = [
    "memory",
    "reaction",
    "pattern",
    "language",
    "stability",
    "combined",
    "temporal",
    "slope",
];

/// Latent longitudinal behavior driving a subject's trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPattern {
    Stable,
    Declining,
    Improving,
    Volatile,
}

impl TrendPattern {
    /// All patterns, in probability-table order
    pub const ALL: [TrendPattern; 4] = [
        TrendPattern::Stable,
        TrendPattern::Declining,
        TrendPattern::Improving,
        TrendPattern::Volatile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendPattern::Stable => "stable",
            TrendPattern::Declining => "declining",
            TrendPattern::Improving => "improving",
            TrendPattern::Volatile => "volatile",
        }
    }

    /// Position in [`TrendPattern::ALL`]
    pub fn index(&self) -> usize {
        match self {
            TrendPattern::Stable => 0,
            TrendPattern::Declining => 1,
            TrendPattern::Improving => 2,
            TrendPattern::Volatile => 3,
        }
    }
}

impl fmt::Display for TrendPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Ok(TrendPattern::Stable),
            "declining" => Ok(TrendPattern::Declining),
            "improving" => Ok(TrendPattern::Improving),
            "volatile" => Ok(TrendPattern::Volatile),
            other => Err(format!("unknown trend pattern: {other}")),
        }
    }
}

/// Subject-level constants, sampled once and perturbed per session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineTraits {
    /// Memory accuracy (0-1)
    pub memory: f64,
    /// Reaction time (ms)
    pub reaction_ms: f64,
    /// Pattern recognition level (1-10)
    pub pattern: f64,
    /// Language fluency (words per minute)
    pub language_wpm: f64,
}

/// A simulated subject: identity, trend pattern and frozen baselines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub subject_id: String,
    pub pattern: TrendPattern,
    pub baseline: BaselineTraits,
}

/// Raw measurements of one assessment session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub subject_id: String,
    /// 1-based session index
    pub session_id: u32,
    pub date: NaiveDate,
    /// Memory accuracy, clipped to [0.1, 1.0]
    pub memory_accuracy: f64,
    /// Mean reaction time, clipped to [150, 1000] ms
    pub reaction_time_ms: f64,
    /// Pattern level, clipped to [1, 10]
    pub pattern_level: f64,
    /// Language fluency, clipped to [50, 250] wpm
    pub language_wpm: f64,
}

impl SessionRecord {
    /// First metric outside its measurable range, as `(field, value)`
    pub fn out_of_range(&self) -> Option<(&'static str, f64)> {
        [
            ("memory_accuracy", self.memory_accuracy, MEMORY_RANGE),
            ("reaction_time_ms", self.reaction_time_ms, REACTION_RANGE_MS),
            ("pattern_level", self.pattern_level, PATTERN_RANGE),
            ("language_wpm", self.language_wpm, LANGUAGE_RANGE_WPM),
        ]
        .into_iter()
        .find(|&(_, value, (low, high))| !(low..=high).contains(&value))
        .map(|(field, value, _)| (field, value))
    }
}

/// All sessions of one subject with its ground-truth pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSessions {
    pub subject_id: String,
    pub pattern: TrendPattern,
    pub sessions: Vec<SessionRecord>,
}

impl SubjectSessions {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Derived channels of one session, in [`CHANNEL_NAMES`] order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub memory: f64,
    pub reaction: f64,
    pub pattern: f64,
    pub language: f64,
    pub stability: f64,
    /// Fixed-weight blend of the four normalized metrics
    pub combined: f64,
    pub temporal: f64,
    /// Memory gradient offset by 0.5 (0.5 is flat)
    pub slope: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.memory,
            self.reaction,
            self.pattern,
            self.language,
            self.stability,
            self.combined,
            self.temporal,
            self.slope,
        ]
    }
}

/// The trailing sessions of one subject as a labeled feature matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWindow {
    pub subject_id: String,
    /// Session ids of the retained sessions, increasing
    pub session_ids: Vec<u32>,
    pub vectors: Vec<FeatureVector>,
    /// Collapsed class label
    pub label: u8,
}

impl FeatureWindow {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Row-major `[len, FEATURE_COUNT]` matrix
    pub fn to_matrix(&self) -> Vec<[f64; FEATURE_COUNT]> {
        self.vectors.iter().map(FeatureVector::to_array).collect()
    }
}
