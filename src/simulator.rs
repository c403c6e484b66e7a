//! Session simulation
//!
//! Each session perturbs the subject's baselines by a trend modifier and
//! Gaussian noise, then clips every metric to its measurable range:
//!
//! - memory_accuracy = clip(memory + m + N(0, 0.05), 0.1, 1.0)
//! - reaction_time_ms = clip(reaction + r + N(0, 15), 150, 1000)
//! - pattern_level = clip(pattern + 5m + N(0, 1), 1, 10)
//! - language_wpm = clip(language + 50m + N(0, 10), 50, 250)
//!
//! `m` and `r` are the memory and reaction modifiers of the subject's pattern.
//! Pattern and language follow the memory modifier: one latent trend drives
//! every observed channel.

use crate::config::NoiseConfig;
use crate::error::{ensure_finite, SynthError};
use crate::sampling::gaussian;
use crate::schedule::TimestampSequencer;
use crate::types::{
    BaselineTraits, SessionRecord, SubjectProfile, TrendPattern, LANGUAGE_RANGE_WPM, MEMORY_RANGE,
    PATTERN_RANGE, REACTION_RANGE_MS,
};
use chrono::NaiveDate;
use rand::Rng;

/// Pattern level gained per unit of memory modifier
pub const PATTERN_COUPLING: f64 = 5.0;
/// Words per minute gained per unit of memory modifier
pub const LANGUAGE_COUPLING: f64 = 50.0;

/// How a trend pattern shifts memory and reaction over the course of a subject
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModifierRule {
    /// No shift
    Flat,
    /// Shift grows linearly with progress, reaching the given values at the last session
    Linear { memory: f64, reaction: f64 },
    /// Fresh Gaussian shift every session, spread from [`NoiseConfig`]
    Jitter,
}

/// Modifier rules indexed by [`TrendPattern::index`]
pub const MODIFIER_RULES: [ModifierRule; 4] = [
    ModifierRule::Flat,
    ModifierRule::Linear {
        memory: -0.2,
        reaction: 50.0,
    },
    ModifierRule::Linear {
        memory: 0.15,
        reaction: -30.0,
    },
    ModifierRule::Jitter,
];

impl ModifierRule {
    pub fn for_pattern(pattern: TrendPattern) -> Self {
        MODIFIER_RULES[pattern.index()]
    }
}

/// Shifts applied to one session's baselines
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendModifiers {
    pub memory: f64,
    pub reaction: f64,
}

/// Additive noise of one session, one term per metric
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionNoise {
    pub memory: f64,
    pub reaction: f64,
    pub pattern: f64,
    pub language: f64,
}

/// Unclipped metrics of one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMetrics {
    pub memory_accuracy: f64,
    pub reaction_time_ms: f64,
    pub pattern_level: f64,
    pub language_wpm: f64,
}

/// Combine baseline, modifiers and noise into unclipped metrics.
///
/// Pattern and language respond to the memory modifier, never to the reaction one.
pub fn couple(baseline: &BaselineTraits, modifiers: TrendModifiers, noise: SessionNoise) -> RawMetrics {
    RawMetrics {
        memory_accuracy: baseline.memory + modifiers.memory + noise.memory,
        reaction_time_ms: baseline.reaction_ms + modifiers.reaction + noise.reaction,
        pattern_level: baseline.pattern + PATTERN_COUPLING * modifiers.memory + noise.pattern,
        language_wpm: baseline.language_wpm + LANGUAGE_COUPLING * modifiers.memory + noise.language,
    }
}

/// Progress through a subject's sessions: 0 at the first, 1 at the last
pub fn progress(index: usize, total: usize) -> f64 {
    if total <= 1 {
        0.0
    } else {
        index as f64 / (total - 1) as f64
    }
}

/// Simulator for raw session measurements
#[derive(Debug, Clone, Default)]
pub struct SessionSimulator {
    noise: NoiseConfig,
}

impl SessionSimulator {
    pub fn new(noise: NoiseConfig) -> Result<Self, SynthError> {
        noise.validate()?;
        Ok(Self { noise })
    }

    pub fn noise(&self) -> &NoiseConfig {
        &self.noise
    }

    /// Resolve the pattern's modifiers at progress `t`
    pub fn modifiers<R: Rng + ?Sized>(
        &self,
        pattern: TrendPattern,
        t: f64,
        rng: &mut R,
    ) -> Result<TrendModifiers, SynthError> {
        let modifiers = match ModifierRule::for_pattern(pattern) {
            ModifierRule::Flat => TrendModifiers::default(),
            ModifierRule::Linear { memory, reaction } => TrendModifiers {
                memory: memory * t,
                reaction: reaction * t,
            },
            ModifierRule::Jitter => TrendModifiers {
                memory: gaussian(rng, 0.0, self.noise.volatile_memory_sd)?,
                reaction: gaussian(rng, 0.0, self.noise.volatile_reaction_sd)?,
            },
        };
        Ok(modifiers)
    }

    fn draw_noise<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SessionNoise, SynthError> {
        Ok(SessionNoise {
            memory: gaussian(rng, 0.0, self.noise.memory_sd)?,
            reaction: gaussian(rng, 0.0, self.noise.reaction_sd)?,
            pattern: gaussian(rng, 0.0, self.noise.pattern_sd)?,
            language: gaussian(rng, 0.0, self.noise.language_sd)?,
        })
    }

    /// Simulate session `index` (0-based) of `total` for `profile`
    pub fn simulate_session<R: Rng + ?Sized>(
        &self,
        profile: &SubjectProfile,
        index: usize,
        total: usize,
        date: NaiveDate,
        rng: &mut R,
    ) -> Result<SessionRecord, SynthError> {
        let t = progress(index, total);
        let modifiers = self.modifiers(profile.pattern, t, rng)?;
        let noise = self.draw_noise(rng)?;
        let raw = couple(&profile.baseline, modifiers, noise);

        let id = profile.subject_id.as_str();
        let memory = ensure_finite(id, "memory_accuracy", raw.memory_accuracy)?;
        let reaction = ensure_finite(id, "reaction_time_ms", raw.reaction_time_ms)?;
        let pattern = ensure_finite(id, "pattern_level", raw.pattern_level)?;
        let language = ensure_finite(id, "language_wpm", raw.language_wpm)?;

        Ok(SessionRecord {
            subject_id: profile.subject_id.clone(),
            session_id: index as u32 + 1,
            date,
            memory_accuracy: memory.clamp(MEMORY_RANGE.0, MEMORY_RANGE.1),
            reaction_time_ms: reaction.clamp(REACTION_RANGE_MS.0, REACTION_RANGE_MS.1),
            pattern_level: pattern.clamp(PATTERN_RANGE.0, PATTERN_RANGE.1),
            language_wpm: language.clamp(LANGUAGE_RANGE_WPM.0, LANGUAGE_RANGE_WPM.1),
        })
    }

    /// Simulate `sessions` consecutive sessions starting at `start`.
    ///
    /// The dates are drawn first, then each session in index order.
    pub fn simulate_subject<R: Rng + ?Sized>(
        &self,
        profile: &SubjectProfile,
        sessions: usize,
        start: NaiveDate,
        sequencer: &TimestampSequencer,
        rng: &mut R,
    ) -> Result<Vec<SessionRecord>, SynthError> {
        let dates = sequencer.sequence(start, sessions, rng);
        dates
            .into_iter()
            .enumerate()
            .map(|(i, date)| self.simulate_session(profile, i, sessions, date, rng))
            .collect()
    }
}
