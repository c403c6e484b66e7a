//! Tabular session schema
//!
//! One row per (subject, session), the intermediate form between the
//! generator and the feature pipeline. Rows travel as NDJSON or as a JSON
//! array and can be grouped back into per-subject session sequences.

mod adapter;
mod session_row;

pub use adapter::*;
pub use session_row::*;
