//! cogtrend - Synthetic longitudinal cognitive-assessment data and trend features
//!
//! cogtrend simulates subjects taking repeated cognitive assessments and turns
//! their sessions into classifier-ready windows through a deterministic
//! pipeline: profile sampling → session dating → session simulation → feature
//! derivation → dataset assembly.
//!
//! ## Modules
//!
//! - **Generator**: `profile`, `schedule` and `simulator` produce raw sessions
//! - **Features**: `features` derives the 8-channel window of a subject
//! - **Pipeline**: `pipeline` runs both over many subjects, `schema` moves
//!   sessions in and out as tabular rows

pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod profile;
pub mod sampling;
pub mod schedule;
pub mod schema;
pub mod simulator;
pub mod types;

pub use config::{GeneratorConfig, LabelMap, NoiseConfig, PatternTable, ScheduleConfig, SlopePolicy};
pub use error::SynthError;
pub use features::FeatureDeriver;
pub use pipeline::{BatchSummary, Dataset, DatasetAssembler, GeneratedBatch};
pub use profile::SubjectProfileSampler;
pub use schedule::TimestampSequencer;
pub use simulator::SessionSimulator;
pub use types::{
    FeatureVector, FeatureWindow, SessionRecord, SubjectProfile, SubjectSessions, TrendPattern,
    CHANNEL_NAMES, FEATURE_COUNT, WINDOW_SIZE,
};

// Schema exports
pub use schema::{SessionRow, SessionRowAdapter};

/// cogtrend version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
