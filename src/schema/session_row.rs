//! Session row definition

use crate::error::SynthError;
use crate::types::{SessionRecord, TrendPattern};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column order of the tabular form
pub const ROW_COLUMNS: [&str; 8] = [
    "subject_id",
    "session_id",
    "date",
    "memory_accuracy",
    "reaction_time_ms",
    "pattern_level",
    "language_wpm",
    "pattern_type",
];

/// One session of one subject, with the subject's ground-truth pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub subject_id: String,
    pub session_id: u32,
    /// ISO 8601 calendar date (YYYY-MM-DD)
    pub date: NaiveDate,
    pub memory_accuracy: f64,
    pub reaction_time_ms: f64,
    pub pattern_level: f64,
    pub language_wpm: f64,
    pub pattern_type: TrendPattern,
}

impl SessionRow {
    pub fn from_record(record: &SessionRecord, pattern: TrendPattern) -> Self {
        Self {
            subject_id: record.subject_id.clone(),
            session_id: record.session_id,
            date: record.date,
            memory_accuracy: record.memory_accuracy,
            reaction_time_ms: record.reaction_time_ms,
            pattern_level: record.pattern_level,
            language_wpm: record.language_wpm,
            pattern_type: pattern,
        }
    }

    /// Export precision: memory to 3 decimals, the other metrics to 1
    pub fn rounded(mut self) -> Self {
        self.memory_accuracy = round_to(self.memory_accuracy, 3);
        self.reaction_time_ms = round_to(self.reaction_time_ms, 1);
        self.pattern_level = round_to(self.pattern_level, 1);
        self.language_wpm = round_to(self.language_wpm, 1);
        self
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            subject_id: self.subject_id.clone(),
            session_id: self.session_id,
            date: self.date,
            memory_accuracy: self.memory_accuracy,
            reaction_time_ms: self.reaction_time_ms,
            pattern_level: self.pattern_level,
            language_wpm: self.language_wpm,
        }
    }

    /// Reject rows that cannot belong to a session sequence
    pub fn validate(&self) -> Result<(), SynthError> {
        if self.subject_id.trim().is_empty() {
            return Err(SynthError::ParseError("empty subject_id".to_string()));
        }
        if self.session_id == 0 {
            return Err(SynthError::ParseError(format!(
                "subject {}: session_id is 1-based",
                self.subject_id
            )));
        }
        if let Some((field, value)) = self.to_record().out_of_range() {
            return Err(SynthError::ParseError(format!(
                "subject {} session {}: {field} {value} is outside its measurable range",
                self.subject_id, self.session_id
            )));
        }
        Ok(())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
