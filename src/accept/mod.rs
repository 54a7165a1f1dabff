//! Greedy acceptance of draft tokens.
//!
//! This module contains:
//! - The acceptance walker, which finds the longest verified path per sequence
//! - Post-processing, which extracts the last accepted token and the
//!   cumulative indices used to compact next-step buffers

pub mod post;
pub mod walker;

pub use post::{select_last_accepted_and_cumsum, PostOutputs, PostParams};
pub use walker::{accept_draft_tokens, match_length, AcceptOutputs, AcceptParams};
