//! nano-eagle: greedy sample-and-accept for EAGLE speculative decoding.
//!
//! One call per decoding iteration:
//! - Top-1 sampling of the base-model token at every draft tree node
//! - Greedy acceptance of the longest draft path the base model agrees with
//! - Bookkeeping indices that seed the next draft round

pub mod config;
pub mod error;

pub mod accept;
pub mod engine;
pub mod sampling;
pub mod tree;
pub mod workspace;

pub use config::{AcceptConfig, Precision};
pub use engine::{AcceptanceStats, SampleAndAccept, StepInputs, StepOutputs, StepShape};
pub use error::{Error, Result};
pub use sampling::{Top1Sampler, INVALID_TOKEN_ID};
pub use tree::{DraftTree, PathTable, INVALID_NODE};
pub use workspace::{Workspace, WorkspaceLayout};
