//! Subject profile sampling
//!
//! A profile is drawn once per subject: first the trend pattern from the
//! population table, then the four baseline traits from their priors.

use crate::config::PatternTable;
use crate::error::SynthError;
use crate::sampling::{gaussian, unit};
use crate::types::{BaselineTraits, SubjectProfile, TrendPattern};
use rand::Rng;

/// Population prior of one baseline trait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraitPrior {
    pub mean: f64,
    pub sd: f64,
}

/// Memory accuracy prior (0-1 scale)
pub const MEMORY_PRIOR: TraitPrior = TraitPrior { mean: 0.7, sd: 0.1 };
/// Reaction time prior (ms)
pub const REACTION_PRIOR: TraitPrior = TraitPrior { mean: 350.0, sd: 50.0 };
/// Pattern level prior
pub const PATTERN_PRIOR: TraitPrior = TraitPrior { mean: 6.0, sd: 1.5 };
/// Language fluency prior (wpm)
pub const LANGUAGE_PRIOR: TraitPrior = TraitPrior { mean: 140.0, sd: 20.0 };

/// Sampler for subject profiles
#[derive(Debug, Clone)]
pub struct SubjectProfileSampler {
    table: PatternTable,
}

impl Default for SubjectProfileSampler {
    fn default() -> Self {
        Self {
            table: PatternTable::default(),
        }
    }
}

impl SubjectProfileSampler {
    /// Create a sampler, rejecting tables that do not sum to 1
    pub fn new(table: PatternTable) -> Result<Self, SynthError> {
        table.validate()?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    /// Draw a pattern and baseline traits for `subject_id`
    pub fn sample<R: Rng + ?Sized>(
        &self,
        subject_id: &str,
        rng: &mut R,
    ) -> Result<SubjectProfile, SynthError> {
        let pattern = self.table.pick(unit(rng));
        self.sample_with_pattern(subject_id, pattern, rng)
    }

    /// Draw baseline traits for a subject whose pattern is already fixed
    pub fn sample_with_pattern<R: Rng + ?Sized>(
        &self,
        subject_id: &str,
        pattern: TrendPattern,
        rng: &mut R,
    ) -> Result<SubjectProfile, SynthError> {
        let baseline = BaselineTraits {
            memory: gaussian(rng, MEMORY_PRIOR.mean, MEMORY_PRIOR.sd)?,
            reaction_ms: gaussian(rng, REACTION_PRIOR.mean, REACTION_PRIOR.sd)?,
            pattern: gaussian(rng, PATTERN_PRIOR.mean, PATTERN_PRIOR.sd)?,
            language_wpm: gaussian(rng, LANGUAGE_PRIOR.mean, LANGUAGE_PRIOR.sd)?,
        };

        Ok(SubjectProfile {
            subject_id: subject_id.to_string(),
            pattern,
            baseline,
        })
    }
}

/// Zero-padded sequential id for the 1-based subject `ordinal`
pub fn subject_id(ordinal: usize) -> String {
    format!("SUB_{ordinal:04}")
}
