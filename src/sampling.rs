//! Random draws shared by the profile sampler, the sequencer and the simulator.
//!
//! Every function takes the generator explicitly so a subject's draws depend on
//! its own seed only.

use crate::error::SynthError;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Draw from N(mean, sd). A zero `sd` still consumes one draw and returns `mean`.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> Result<f64, SynthError> {
    let normal = Normal::new(0.0, sd)
        .map_err(|e| SynthError::Configuration(format!("invalid standard deviation {sd}: {e}")))?;
    Ok(mean + normal.sample(rng))
}

/// Uniform integer in [-bound, bound]
pub fn symmetric_int<R: Rng + ?Sized>(rng: &mut R, bound: u32) -> i64 {
    let bound = i64::from(bound);
    rng.random_range(-bound..=bound)
}

/// Uniform draw in [0, 1)
pub fn unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random::<f64>()
}
