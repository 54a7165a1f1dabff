//! Post-processing of acceptance results.
//!
//! Produces, per sequence:
//! - the last accepted token, which seeds the next draft round
//! - the exclusive prefix sum of `accepted_len - 1`, the number of new tokens
//!   produced by earlier sequences, used to scatter next-step draft inputs
//!   into one flat buffer without gaps
//! - the flat logits row of the last accepted node, used to gather the hidden
//!   state the draft model continues from
//!
//! ```text
//! accepted_lens             = [3, 1, 2]
//! exclusive_sum_accepted    = [0, 2, 2]
//! ```

use crate::error::{Error, Result};
use crate::tree::PathTable;

/// Inputs of post-processing, all produced earlier in the same step.
#[derive(Debug, Clone, Copy)]
pub struct PostParams<'a> {
    /// `[batch, max_path_len]`.
    pub accepted_tokens: &'a [i32],
    /// `[batch]`.
    pub accepted_lens: &'a [i32],
    /// `[batch]`.
    pub best_path_ids: &'a [i32],
    /// Nodes in use per sequence, root included.
    pub node_counts: &'a [i32],
    pub paths: PathTable<'a>,
}

/// Output buffers of post-processing.
#[derive(Debug)]
pub struct PostOutputs<'a> {
    pub last_accepted_token_ids: &'a mut [i32],
    pub exclusive_sum_accepted_indices: &'a mut [i32],
    pub last_accepted_hidden_indices: &'a mut [i32],
}

impl PostParams<'_> {
    fn check_params(&self, outputs: &PostOutputs<'_>) -> Result<()> {
        let batch_size = self.paths.batch_size();
        let max_path_len = self.paths.max_path_len();
        let max_decoding_tokens = self.paths.max_decoding_tokens();

        let per_batch = [
            ("accepted_lens", self.accepted_lens.len()),
            ("best_path_ids", self.best_path_ids.len()),
            ("node_counts", self.node_counts.len()),
            ("last_accepted_token_ids", outputs.last_accepted_token_ids.len()),
            (
                "exclusive_sum_accepted_indices",
                outputs.exclusive_sum_accepted_indices.len(),
            ),
            (
                "last_accepted_hidden_indices",
                outputs.last_accepted_hidden_indices.len(),
            ),
        ];
        for (name, len) in per_batch {
            if len != batch_size {
                return Err(Error::InvalidInput(format!(
                    "{name} has {len} entries, expected {batch_size}"
                )));
            }
        }
        if self.accepted_tokens.len() != batch_size * max_path_len {
            return Err(Error::InvalidInput(format!(
                "accepted_tokens has {} entries, expected {}",
                self.accepted_tokens.len(),
                batch_size * max_path_len
            )));
        }

        for b in 0..batch_size {
            let len = self.accepted_lens[b];
            if len < 1 || len as usize > max_path_len {
                return Err(Error::InvalidInput(format!(
                    "accepted_lens[{b}] = {len} out of range [1, {max_path_len}]"
                )));
            }
            let path_id = self.best_path_ids[b];
            if path_id < 0 || path_id as usize >= max_decoding_tokens {
                return Err(Error::InvalidInput(format!(
                    "best_path_ids[{b}] = {path_id} out of range [0, {max_decoding_tokens})"
                )));
            }
        }
        Ok(())
    }
}

/// Select the last accepted token and compute cumulative indices.
///
/// `exclusive_sum_accepted_indices[0]` is 0 and each following entry adds the
/// previous sequence's `accepted_len - 1`.
pub fn select_last_accepted_and_cumsum(
    params: &PostParams<'_>,
    outputs: PostOutputs<'_>,
) -> Result<()> {
    params.check_params(&outputs)?;
    let max_path_len = params.paths.max_path_len();

    tracing::trace!("select_last_accepted_and_cumsum start");

    let mut accepted_sum = 0i32;
    let mut node_offset = 0i32;
    for b in 0..params.paths.batch_size() {
        let len = params.accepted_lens[b] as usize;
        outputs.last_accepted_token_ids[b] = params.accepted_tokens[b * max_path_len + len - 1];

        outputs.exclusive_sum_accepted_indices[b] = accepted_sum;
        accepted_sum += len as i32 - 1;

        let path = params.paths.path(b, params.best_path_ids[b] as usize);
        let last_node = if PathTable::is_used(path) {
            path[len - 1]
        } else {
            0
        };
        outputs.last_accepted_hidden_indices[b] = node_offset + last_node;
        node_offset += params.node_counts[b];
    }

    tracing::trace!("select_last_accepted_and_cumsum stop");
    Ok(())
}
