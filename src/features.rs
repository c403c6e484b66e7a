//! Feature derivation
//!
//! This module maps a subject's raw session sequence onto the fixed-length,
//! 8-channel matrix consumed by the trend classifier:
//! - Normalized memory, reaction, pattern and language scores
//! - Reaction stability between consecutive sessions
//! - Fixed-weight combined score
//! - Days since the first retained session
//! - Memory slope

use crate::config::{GeneratorConfig, SlopePolicy};
use crate::error::{ensure_finite, SynthError};
use crate::types::{FeatureVector, FeatureWindow, SessionRecord, WINDOW_SIZE};
use tracing::warn;

/// Reaction time mapped to a score of 1.0
pub const REACTION_FAST_MS: f64 = 200.0;
/// Reaction span over which the score falls from 1.0 to 0.0
pub const REACTION_SPAN_MS: f64 = 800.0;
/// Pattern level mapped to 1.0
pub const PATTERN_SCALE: f64 = 10.0;
/// Words per minute mapped to 1.0
pub const LANGUAGE_SCALE_WPM: f64 = 200.0;
/// Days after the window start at which the temporal channel saturates
pub const TEMPORAL_HORIZON_DAYS: f64 = 90.0;
/// Stability lost per unit of relative reaction change
pub const STABILITY_PENALTY: f64 = 2.0;
/// Offset making a flat memory trend read 0.5
pub const SLOPE_OFFSET: f64 = 0.5;

/// Weights of memory, reaction, pattern and language in the combined score
pub const COMBINED_WEIGHTS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

/// Feature deriver for session sequences
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDeriver {
    window_size: usize,
    slope_policy: SlopePolicy,
}

impl Default for FeatureDeriver {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            slope_policy: SlopePolicy::default(),
        }
    }
}

impl FeatureDeriver {
    pub fn new(window_size: usize, slope_policy: SlopePolicy) -> Result<Self, SynthError> {
        if window_size == 0 {
            return Err(SynthError::Configuration(
                "window size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            window_size,
            slope_policy,
        })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self, SynthError> {
        Self::new(config.window_size, config.slope_policy)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn slope_policy(&self) -> SlopePolicy {
        self.slope_policy
    }

    /// Derive feature vectors for the trailing window of `sessions`.
    ///
    /// `sessions` must be in increasing session-id order and hold at least
    /// `window_size` entries.
    pub fn derive(&self, sessions: &[SessionRecord]) -> Result<Vec<FeatureVector>, SynthError> {
        let subject_id = sessions
            .first()
            .map(|s| s.subject_id.as_str())
            .unwrap_or_default();

        if sessions.len() < self.window_size {
            return Err(SynthError::InsufficientSessions {
                subject_id: subject_id.to_string(),
                sessions: sessions.len(),
                required: self.window_size,
            });
        }
        check_order(subject_id, sessions)?;
        for session in sessions {
            check_finite(session)?;
            check_range(session)?;
        }
        let missing = missing_session_ids(sessions);
        if !missing.is_empty() {
            warn!(subject_id = %subject_id, missing = ?missing, "session ids have gaps");
        }

        let start = sessions.len() - self.window_size;
        let retained = &sessions[start..];

        let memory: Vec<f64> = sessions.iter().map(|s| s.memory_accuracy).collect();
        let gradients = match self.slope_policy {
            SlopePolicy::FullSequence => gradient(&memory).split_off(start),
            SlopePolicy::RetainedWindow => gradient(&memory[start..]),
        };

        let window_start = retained[0].date;
        let mut vectors = Vec::with_capacity(self.window_size);

        for (k, session) in retained.iter().enumerate() {
            let memory = session.memory_accuracy;
            let reaction = normalize_reaction(session.reaction_time_ms);
            let pattern = normalize_pattern(session.pattern_level);
            let language = normalize_language(session.language_wpm);

            let stability = match k {
                0 => 1.0,
                _ => compute_stability(
                    subject_id,
                    retained[k - 1].reaction_time_ms,
                    session.reaction_time_ms,
                )?,
            };

            let elapsed_days = (session.date - window_start).num_days() as f64;
            let temporal = (elapsed_days / TEMPORAL_HORIZON_DAYS).clamp(0.0, 1.0);

            vectors.push(FeatureVector {
                memory,
                reaction,
                pattern,
                language,
                stability,
                combined: combined_score(memory, reaction, pattern, language),
                temporal,
                slope: gradients[k] + SLOPE_OFFSET,
            });
        }

        Ok(vectors)
    }

    /// Derive the labeled window for one subject
    pub fn window(
        &self,
        subject_id: &str,
        sessions: &[SessionRecord],
        label: u8,
    ) -> Result<FeatureWindow, SynthError> {
        let vectors = self.derive(sessions)?;
        let session_ids = sessions[sessions.len() - self.window_size..]
            .iter()
            .map(|s| s.session_id)
            .collect();

        Ok(FeatureWindow {
            subject_id: subject_id.to_string(),
            session_ids,
            vectors,
            label,
        })
    }
}

/// Invert and scale reaction time: 200ms reads 1.0, 1000ms reads 0.0
pub fn normalize_reaction(reaction_time_ms: f64) -> f64 {
    (1.0 - (reaction_time_ms - REACTION_FAST_MS) / REACTION_SPAN_MS).clamp(0.0, 1.0)
}

pub fn normalize_pattern(pattern_level: f64) -> f64 {
    (pattern_level / PATTERN_SCALE).clamp(0.0, 1.0)
}

pub fn normalize_language(language_wpm: f64) -> f64 {
    (language_wpm / LANGUAGE_SCALE_WPM).clamp(0.0, 1.0)
}

/// Weighted blend of the four normalized channels
pub fn combined_score(memory: f64, reaction: f64, pattern: f64, language: f64) -> f64 {
    COMBINED_WEIGHTS[0] * memory
        + COMBINED_WEIGHTS[1] * reaction
        + COMBINED_WEIGHTS[2] * pattern
        + COMBINED_WEIGHTS[3] * language
}

/// Stability from the relative change between consecutive raw reaction times
///
/// Formula: `1 - 2 * |current - previous| / previous`, clipped to [0, 1]
fn compute_stability(subject_id: &str, previous_ms: f64, current_ms: f64) -> Result<f64, SynthError> {
    let change = ensure_finite(
        subject_id,
        "stability",
        (current_ms - previous_ms).abs() / previous_ms,
    )?;
    Ok((1.0 - STABILITY_PENALTY * change).clamp(0.0, 1.0))
}

/// Discrete gradient with unit spacing.
///
/// Central differences in the interior, one-sided differences at both ends,
/// zero for a single value.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }

    (0..n)
        .map(|i| match i {
            0 => values[1] - values[0],
            i if i == n - 1 => values[n - 1] - values[n - 2],
            i => (values[i + 1] - values[i - 1]) / 2.0,
        })
        .collect()
}

fn check_order(subject_id: &str, sessions: &[SessionRecord]) -> Result<(), SynthError> {
    if let Some(pair) = sessions.windows(2).find(|p| p[1].session_id <= p[0].session_id) {
        return Err(SynthError::InvalidSession(format!(
            "subject {subject_id}: session {} follows session {}",
            pair[1].session_id, pair[0].session_id
        )));
    }
    Ok(())
}

fn check_finite(session: &SessionRecord) -> Result<(), SynthError> {
    let id = session.subject_id.as_str();
    ensure_finite(id, "memory_accuracy", session.memory_accuracy)?;
    ensure_finite(id, "reaction_time_ms", session.reaction_time_ms)?;
    ensure_finite(id, "pattern_level", session.pattern_level)?;
    ensure_finite(id, "language_wpm", session.language_wpm)?;
    Ok(())
}

fn check_range(session: &SessionRecord) -> Result<(), SynthError> {
    match session.out_of_range() {
        Some((field, value)) => Err(SynthError::InvalidSession(format!(
            "subject {}: session {} has {field} {value} outside its measurable range",
            session.subject_id, session.session_id
        ))),
        None => Ok(()),
    }
}

/// Ids absent from `1..=last`; `sessions` must already be strictly increasing
pub(crate) fn missing_session_ids(sessions: &[SessionRecord]) -> Vec<u32> {
    let mut missing = Vec::new();
    let mut expected = 1;
    for session in sessions {
        missing.extend(expected..session.session_id);
        expected = session.session_id.saturating_add(1);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn session(id: u32, day: i64, memory: f64, reaction: f64) -> SessionRecord {
        SessionRecord {
            subject_id: "SUB_0001".to_string(),
            session_id: id,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day),
            memory_accuracy: memory,
            reaction_time_ms: reaction,
            pattern_level: 6.0,
            language_wpm: 140.0,
        }
    }

    fn regular(memory: &[f64], reaction: &[f64]) -> Vec<SessionRecord> {
        memory
            .iter()
            .zip(reaction)
            .enumerate()
            .map(|(i, (m, r))| session(i as u32 + 1, 14 * i as i64, *m, *r))
            .collect()
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_reaction(200.0), 1.0);
        assert_eq!(normalize_reaction(1000.0), 0.0);
        assert_eq!(normalize_reaction(150.0), 1.0);
        assert!((normalize_reaction(600.0) - 0.5).abs() < 1e-12);
        assert!((normalize_pattern(6.0) - 0.6).abs() < 1e-12);
        assert_eq!(normalize_language(250.0), 1.0);
        assert!((normalize_language(150.0) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_gradient() {
        assert_eq!(gradient(&[]), Vec::<f64>::new());
        assert_eq!(gradient(&[0.4]), vec![0.0]);
        assert_eq!(gradient(&[1.0, 2.0, 4.0, 7.0]), vec![1.0, 1.5, 2.5, 3.0]);
    }

    #[test]
    fn test_constant_reaction_is_fully_stable() {
        let sessions = regular(&[0.7; 6], &[350.0; 6]);
        let vectors = FeatureDeriver::default().derive(&sessions).unwrap();

        assert_eq!(vectors.len(), 6);
        assert!(vectors.iter().all(|v| v.stability == 1.0));
    }

    #[test]
    fn test_stability_uses_raw_reaction() {
        let sessions = regular(&[0.7; 6], &[400.0, 440.0, 440.0, 220.0, 1000.0, 1000.0]);
        let vectors = FeatureDeriver::default().derive(&sessions).unwrap();

        assert_eq!(vectors[0].stability, 1.0);
        // |440 - 400| / 400 = 0.1
        assert!((vectors[1].stability - 0.8).abs() < 1e-12);
        assert_eq!(vectors[2].stability, 1.0);
        // |220 - 440| / 440 = 0.5
        assert!(vectors[3].stability.abs() < 1e-12);
        assert_eq!(vectors[4].stability, 0.0);
    }

    #[test]
    fn test_first_window_vector_is_stable_after_truncation() {
        let sessions = regular(&[0.7; 8], &[300.0, 600.0, 300.0, 600.0, 300.0, 600.0, 300.0, 600.0]);
        let vectors = FeatureDeriver::default().derive(&sessions).unwrap();
        assert_eq!(vectors[0].stability, 1.0);
        assert_eq!(vectors[1].stability, 0.0);
    }

    #[test]
    fn test_combined_is_weighted_blend() {
        let sessions = regular(&[0.9, 0.8, 0.7, 0.6, 0.5, 0.4], &[250.0, 300.0, 350.0, 400.0, 450.0, 500.0]);
        let vectors = FeatureDeriver::default().derive(&sessions).unwrap();

        for v in &vectors {
            let expected = 0.4 * v.memory + 0.3 * v.reaction + 0.2 * v.pattern + 0.1 * v.language;
            assert_eq!(v.combined, expected);
        }
    }

    #[test]
    fn test_temporal_relative_to_window_start() {
        let mut sessions = regular(&[0.7; 8], &[350.0; 8]);
        // First retained session is index 2 (day 28)
        sessions[3].date = sessions[2].date - Duration::days(1);
        let vectors = FeatureDeriver::default().derive(&sessions).unwrap();

        assert_eq!(vectors[0].temporal, 0.0);
        // Out-of-order jitter is clipped, not reordered
        assert_eq!(vectors[1].temporal, 0.0);
        assert!((vectors[2].temporal - 28.0 / 90.0).abs() < 1e-12);
        // Day 98 - day 28 = 70
        assert!((vectors[5].temporal - 70.0 / 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_temporal_saturates() {
        let sessions: Vec<SessionRecord> = (0..6)
            .map(|i| session(i + 1, 30 * i as i64, 0.7, 350.0))
            .collect();
        let vectors = FeatureDeriver::default().derive(&sessions).unwrap();
        assert_eq!(vectors[3].temporal, 1.0);
        assert_eq!(vectors[5].temporal, 1.0);
    }

    #[test]
    fn test_slope_policies_differ_at_window_boundary() {
        let memory = [0.9, 0.5, 0.6, 0.6, 0.6, 0.6, 0.6];
        let sessions = regular(&memory, &[350.0; 7]);

        let full = FeatureDeriver::new(6, SlopePolicy::FullSequence)
            .unwrap()
            .derive(&sessions)
            .unwrap();
        let retained = FeatureDeriver::new(6, SlopePolicy::RetainedWindow)
            .unwrap()
            .derive(&sessions)
            .unwrap();

        // Central difference over the full sequence: (0.6 - 0.9) / 2
        assert!((full[0].slope - 0.35).abs() < 1e-12);
        // One-sided difference inside the window: 0.6 - 0.5
        assert!((retained[0].slope - 0.6).abs() < 1e-12);
        assert_eq!(full[5].slope, retained[5].slope);
    }

    #[test]
    fn test_flat_memory_slope_is_neutral() {
        let sessions = regular(&[0.7; 6], &[350.0; 6]);
        let vectors = FeatureDeriver::default().derive(&sessions).unwrap();
        assert!(vectors.iter().all(|v| (v.slope - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_insufficient_sessions() {
        let sessions = regular(&[0.7; 5], &[350.0; 5]);
        let err = FeatureDeriver::default().derive(&sessions).unwrap_err();
        assert!(matches!(
            err,
            SynthError::InsufficientSessions {
                sessions: 5,
                required: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_reaction_is_out_of_range() {
        let sessions = regular(&[0.7; 6], &[350.0, 0.0, 0.0, 350.0, 350.0, 350.0]);
        let err = FeatureDeriver::default().derive(&sessions).unwrap_err();
        assert!(matches!(err, SynthError::InvalidSession(_)));
    }

    #[test]
    fn test_stability_rejects_zero_previous() {
        assert!(matches!(
            compute_stability("SUB_0001", 0.0, 0.0),
            Err(SynthError::NumericRange { field: "stability", .. })
        ));
    }

    #[test]
    fn test_unclipped_memory_rejected() {
        let sessions = regular(&[0.7, 0.7, 1.8, 0.7, 0.7, 0.7], &[350.0; 6]);
        let err = FeatureDeriver::default().derive(&sessions).unwrap_err();
        assert!(err.to_string().contains("memory_accuracy"));
        assert!(err.is_subject_local());
    }

    #[test]
    fn test_missing_session_ids() {
        let sessions = regular(&[0.7; 6], &[350.0; 6]);
        assert_eq!(missing_session_ids(&sessions), Vec::<u32>::new());

        let gapped: Vec<SessionRecord> = [2, 4, 5, 6, 7, 8]
            .iter()
            .enumerate()
            .map(|(i, id)| session(*id, 14 * i as i64, 0.7, 350.0))
            .collect();
        assert_eq!(missing_session_ids(&gapped), vec![1, 3]);

        // Gaps are reported, not fatal
        assert_eq!(FeatureDeriver::default().derive(&gapped).unwrap().len(), 6);
    }

    #[test]
    fn test_nan_metric_rejected() {
        let mut sessions = regular(&[0.7; 6], &[350.0; 6]);
        sessions[2].pattern_level = f64::NAN;
        let err = FeatureDeriver::default().derive(&sessions).unwrap_err();
        assert!(matches!(err, SynthError::NumericRange { field: "pattern_level", .. }));
    }

    #[test]
    fn test_out_of_order_sessions_rejected() {
        let mut sessions = regular(&[0.7; 6], &[350.0; 6]);
        sessions.swap(1, 2);
        assert!(matches!(
            FeatureDeriver::default().derive(&sessions),
            Err(SynthError::InvalidSession(_))
        ));
    }

    #[test]
    fn test_window_keeps_trailing_session_ids() {
        let sessions = regular(&[0.7; 9], &[350.0; 9]);
        let window = FeatureDeriver::default()
            .window("SUB_0001", &sessions, 1)
            .unwrap();

        assert_eq!(window.session_ids, vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(window.len(), 6);
        assert_eq!(window.label, 1);
        assert_eq!(window.to_matrix().len(), 6);
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            FeatureDeriver::new(0, SlopePolicy::FullSequence),
            Err(SynthError::Configuration(_))
        ));
    }
}
