//! plume-sim - simulator side of plume-verify
//!
//! Provides:
//! - A process runner for the external simulator, with timeout
//! - Parsing of observation points and observation files
//! - Per-subtest result acquisition backed by the artifact cache
//! - The end-to-end verification pipeline

pub mod acquire;
pub mod observations;
pub mod pipeline;
pub mod runner;

// Re-export key types
pub use acquire::{acquire_results, AcquisitionPlan, AcquisitionReport, SubtestResults};
pub use observations::{
    extract_series, latest_by_region, parse_observation_file, parse_observation_points,
    ObservationPoint, ObservationRecord,
};
pub use pipeline::{
    SliceOutcome, VerificationOutcome, VerificationPipeline, VerificationRequest,
};
pub use runner::{
    ProcessSimulator, RunnerError, SimulationOutcome, SimulationRequest, Simulator,
    INPUT_PLACEHOLDER,
};
