#![warn(clippy::unwrap_used)]

//! Deferred-attribution engine: fingerprint hashing, weighted scoring,
//! candidate matching within a per-link window, and in-app conversion
//! tracking.

mod engine;
mod normalize;
mod scoring;

pub use engine::{fingerprint_hash, AttributionEngine, InstallReport, InstallResult};
pub use scoring::{score, ScoreResult};
