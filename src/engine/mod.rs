//! Step orchestration.
//!
//! This module contains:
//! - SampleAndAccept, which sequences sampling, acceptance and post-processing
//! - AcceptanceStats for monitoring draft quality across steps

pub mod stats;
pub mod step;

pub use stats::AcceptanceStats;
pub use step::{SampleAndAccept, StepInputs, StepOutputs, StepShape};
