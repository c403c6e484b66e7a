//! Pipeline orchestration
//!
//! This module provides the batch API of cogtrend. It drives the full pipeline
//! for every subject and assembles the labeled dataset:
//!
//! 1. SubjectProfileSampler - Draw pattern and baseline traits
//! 2. TimestampSequencer - Draw jittered session dates
//! 3. SessionSimulator - Simulate raw session metrics
//! 4. FeatureDeriver - Derive the trailing feature window
//!
//! Subjects are independent. Each one draws from its own generator seeded with
//! `seed + subject_index` and results are kept in subject order, so a seed
//! reproduces the same dataset whether or not the rayon pool is used.

use crate::config::GeneratorConfig;
use crate::error::SynthError;
use crate::features::FeatureDeriver;
use crate::profile::{subject_id, SubjectProfileSampler};
use crate::schedule::TimestampSequencer;
use crate::simulator::SessionSimulator;
use crate::types::{FeatureWindow, SubjectSessions, TrendPattern, CHANNEL_NAMES, FEATURE_COUNT};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Counts reported for every assembled batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Subjects generated or supplied
    pub subjects_total: usize,
    /// Subjects that produced a window
    pub subjects_windowed: usize,
    /// Subjects with fewer sessions than the window
    pub subjects_excluded: usize,
    /// Subjects dropped for invalid or non-finite data
    pub subjects_failed: usize,
    /// Subjects per ground-truth pattern
    pub pattern_counts: BTreeMap<TrendPattern, usize>,
    /// Windows per collapsed label
    pub label_counts: BTreeMap<u8, usize>,
}

/// Labeled feature windows, one per windowed subject, in subject order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub window_size: usize,
    pub feature_count: usize,
    pub windows: Vec<FeatureWindow>,
    pub summary: BatchSummary,
}

/// JSON document handed to the training side
#[derive(Debug, Serialize)]
struct DatasetDocument<'a> {
    shape: [usize; 3],
    channels: &'a [&'static str],
    subject_ids: Vec<&'a str>,
    features: Vec<Vec<[f64; FEATURE_COUNT]>>,
    labels: Vec<u8>,
    summary: &'a BatchSummary,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// `[examples, window_size, feature_count]`
    pub fn shape(&self) -> [usize; 3] {
        [self.windows.len(), self.window_size, self.feature_count]
    }

    /// Row-major feature buffer matching [`Dataset::shape`]
    pub fn features_flat(&self) -> Vec<f32> {
        self.windows
            .iter()
            .flat_map(|w| w.vectors.iter())
            .flat_map(|v| v.to_array())
            .map(|x| x as f32)
            .collect()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.windows.iter().map(|w| w.label).collect()
    }

    pub fn subject_ids(&self) -> Vec<&str> {
        self.windows.iter().map(|w| w.subject_id.as_str()).collect()
    }

    /// Serialize features, labels and summary as one JSON document
    pub fn to_json(&self) -> Result<String, SynthError> {
        let document = DatasetDocument {
            shape: self.shape(),
            channels: &CHANNEL_NAMES,
            subject_ids: self.subject_ids(),
            features: self.windows.iter().map(FeatureWindow::to_matrix).collect(),
            labels: self.labels(),
            summary: &self.summary,
        };
        Ok(serde_json::to_string(&document)?)
    }
}

/// Synthetic sessions together with the dataset assembled from them
#[derive(Debug, Clone)]
pub struct GeneratedBatch {
    pub subjects: Vec<SubjectSessions>,
    pub dataset: Dataset,
}

/// A simulated subject, or its pattern and the error that dropped it
type Simulated = Result<SubjectSessions, (TrendPattern, SynthError)>;

/// What became of one subject
enum SubjectOutcome {
    Windowed(FeatureWindow),
    Excluded,
    Failed,
}

/// Batch driver for synthetic and externally supplied subjects
#[derive(Debug, Clone)]
pub struct DatasetAssembler {
    config: GeneratorConfig,
    sampler: SubjectProfileSampler,
    sequencer: TimestampSequencer,
    simulator: SessionSimulator,
    deriver: FeatureDeriver,
}

impl DatasetAssembler {
    /// Create an assembler, validating the configuration
    pub fn new(config: GeneratorConfig) -> Result<Self, SynthError> {
        let deriver = FeatureDeriver::from_config(&config)?;
        Self::with_deriver(config, deriver)
    }

    /// Create an assembler around an existing deriver.
    ///
    /// The deriver's window must match `config.window_size`.
    pub fn with_deriver(config: GeneratorConfig, deriver: FeatureDeriver) -> Result<Self, SynthError> {
        config.validate()?;
        if deriver.window_size() != config.window_size {
            return Err(SynthError::Configuration(format!(
                "generator window {} does not match deriver window {}",
                config.window_size,
                deriver.window_size()
            )));
        }

        Ok(Self {
            sampler: SubjectProfileSampler::new(config.patterns)?,
            sequencer: TimestampSequencer::from_config(&config.schedule),
            simulator: SessionSimulator::new(config.noise)?,
            deriver,
            config,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn deriver(&self) -> &FeatureDeriver {
        &self.deriver
    }

    /// Simulate the subject at 0-based `index` from its own seed
    pub fn simulate_subject(&self, index: usize) -> Result<SubjectSessions, SynthError> {
        self.simulate_tracked(index)?.map_err(|(_, e)| e)
    }

    /// Simulate every configured subject.
    ///
    /// Subjects that fail with a subject-local error are dropped and logged;
    /// the returned map counts them per pattern.
    pub fn simulate_subjects(
        &self,
    ) -> Result<(Vec<SubjectSessions>, BTreeMap<TrendPattern, usize>), SynthError> {
        let results = self.map_indices(self.config.subjects, |i| self.simulate_tracked(i));

        let mut subjects = Vec::with_capacity(results.len());
        let mut failed = BTreeMap::new();
        for result in results {
            match result? {
                Ok(subject) => subjects.push(subject),
                Err((pattern, e)) if e.is_subject_local() => {
                    warn!(pattern = %pattern, error = %e, "dropping subject");
                    *failed.entry(pattern).or_insert(0) += 1;
                }
                Err((_, e)) => return Err(e),
            }
        }
        Ok((subjects, failed))
    }

    /// Simulate every subject and assemble the dataset from the result
    pub fn generate(&self) -> Result<GeneratedBatch, SynthError> {
        let (subjects, failed) = self.simulate_subjects()?;
        let mut dataset = self.assemble_sorted(&subjects)?;

        let summary = &mut dataset.summary;
        for (pattern, count) in failed {
            summary.subjects_total += count;
            summary.subjects_failed += count;
            *summary.pattern_counts.entry(pattern).or_insert(0) += count;
        }
        log_summary(summary);

        Ok(GeneratedBatch { subjects, dataset })
    }

    /// Outer error: the profile could not be drawn. Inner error: simulation
    /// failed after the pattern was drawn.
    fn simulate_tracked(&self, index: usize) -> Result<Simulated, SynthError> {
        let mut rng = SmallRng::seed_from_u64(self.config.seed.wrapping_add(index as u64));
        let id = subject_id(index + 1);

        let profile = self.sampler.sample(&id, &mut rng)?;
        let session_count = if self.config.min_sessions == self.config.max_sessions {
            self.config.min_sessions
        } else {
            rng.random_range(self.config.min_sessions..=self.config.max_sessions)
        };

        let sessions = match self.simulator.simulate_subject(
            &profile,
            session_count,
            self.config.schedule.start_date,
            &self.sequencer,
            &mut rng,
        ) {
            Ok(sessions) => sessions,
            Err(e) => return Ok(Err((profile.pattern, e))),
        };
        debug!(subject_id = %id, pattern = %profile.pattern, sessions = sessions.len(), "simulated subject");

        Ok(Ok(SubjectSessions {
            subject_id: id,
            pattern: profile.pattern,
            sessions,
        }))
    }

    /// Assemble externally supplied subjects.
    ///
    /// Sessions are ordered by session id before deriving, whatever their dates.
    pub fn assemble(&self, mut subjects: Vec<SubjectSessions>) -> Result<Dataset, SynthError> {
        for subject in &mut subjects {
            subject.sessions.sort_by_key(|s| s.session_id);
        }
        let dataset = self.assemble_sorted(&subjects)?;
        log_summary(&dataset.summary);
        Ok(dataset)
    }

    fn assemble_sorted(&self, subjects: &[SubjectSessions]) -> Result<Dataset, SynthError> {
        let outcomes = self.map_indices(subjects.len(), |i| self.window_subject(&subjects[i]));

        let mut summary = BatchSummary {
            subjects_total: subjects.len(),
            ..BatchSummary::default()
        };
        for subject in subjects {
            *summary.pattern_counts.entry(subject.pattern).or_insert(0) += 1;
        }

        let mut windows = Vec::new();
        for outcome in outcomes {
            match outcome? {
                SubjectOutcome::Windowed(window) => {
                    *summary.label_counts.entry(window.label).or_insert(0) += 1;
                    windows.push(window);
                }
                SubjectOutcome::Excluded => summary.subjects_excluded += 1,
                SubjectOutcome::Failed => summary.subjects_failed += 1,
            }
        }
        summary.subjects_windowed = windows.len();

        Ok(Dataset {
            window_size: self.deriver.window_size(),
            feature_count: FEATURE_COUNT,
            windows,
            summary,
        })
    }

    fn window_subject(&self, subject: &SubjectSessions) -> Result<SubjectOutcome, SynthError> {
        let label = self.config.labels.collapse(subject.pattern);
        match self.deriver.window(&subject.subject_id, &subject.sessions, label) {
            Ok(window) => Ok(SubjectOutcome::Windowed(window)),
            Err(e @ SynthError::InsufficientSessions { .. }) => {
                debug!(error = %e, "excluding subject");
                Ok(SubjectOutcome::Excluded)
            }
            Err(e) if e.is_subject_local() => {
                warn!(subject_id = %subject.subject_id, error = %e, "dropping subject");
                Ok(SubjectOutcome::Failed)
            }
            Err(e) => Err(e),
        }
    }

    /// Map `0..count` in order, on the rayon pool when configured
    fn map_indices<T, F>(&self, count: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        if self.config.parallel {
            (0..count).into_par_iter().map(f).collect()
        } else {
            (0..count).map(f).collect()
        }
    }
}

fn log_summary(summary: &BatchSummary) {
    info!(
        total = summary.subjects_total,
        windowed = summary.subjects_windowed,
        excluded = summary.subjects_excluded,
        failed = summary.subjects_failed,
        "assembled dataset"
    );
}
