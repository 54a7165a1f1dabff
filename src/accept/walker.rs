//! Acceptance walker.
//!
//! For every sequence, walk each candidate path from the root and count how
//! many draft tokens agree with the base model. The draft token at node
//! `path[t]` is verified against the base-model token sampled at its
//! predecessor `path[t - 1]`:
//!
//! ```text
//! path        0      4      5      9
//! draft       -      d4     d5     d9
//! target      t0     t4     t5     t9
//!
//! d4 == t0 ? d5 == t4 ? d9 == t5 ?  -> matched = 2 if the third check fails
//! accepted    [t0, t4, t5]          -> accepted_len = 3
//! ```
//!
//! The accepted sequence always holds base-model tokens: the matched prefix is
//! equal in both streams, and the last entry is the fresh base-model token
//! after the final match.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::sampling::INVALID_TOKEN_ID;
use crate::tree::{PathTable, INVALID_NODE};

/// Read-only inputs of the walker.
#[derive(Debug, Clone, Copy)]
pub struct AcceptParams<'a> {
    /// Draft token per node, `[batch, max_decoding_tokens]`.
    pub draft_ids: &'a [i32],
    /// Base-model token per node, `[batch, max_decoding_tokens]`.
    pub target_ids: &'a [i32],
    /// Nodes in use per sequence, root included.
    pub node_counts: &'a [i32],
    pub paths: PathTable<'a>,
}

/// Output buffers of the walker. Each sequence writes only its own rows.
#[derive(Debug)]
pub struct AcceptOutputs<'a> {
    /// `[batch, max_path_len]`, tail past the accepted length is
    /// [`INVALID_TOKEN_ID`].
    pub accepted_tokens: &'a mut [i32],
    /// `[batch]`, always in `[1, max_path_len]`.
    pub accepted_lens: &'a mut [i32],
    /// `[batch]`, in `[0, max_decoding_tokens)`.
    pub best_path_ids: &'a mut [i32],
}

impl AcceptParams<'_> {
    /// Validate shapes and index ranges. Runs before any token is compared.
    pub fn check_params(&self) -> Result<()> {
        let batch_size = self.paths.batch_size();
        let max_decoding_tokens = self.paths.max_decoding_tokens();
        let num_nodes = batch_size * max_decoding_tokens;

        if self.draft_ids.len() != num_nodes {
            return Err(Error::InvalidInput(format!(
                "draft_ids has {} entries, expected {num_nodes}",
                self.draft_ids.len()
            )));
        }
        if self.target_ids.len() != num_nodes {
            return Err(Error::InvalidInput(format!(
                "target_ids has {} entries, expected {num_nodes}",
                self.target_ids.len()
            )));
        }
        if self.node_counts.len() != batch_size {
            return Err(Error::InvalidInput(format!(
                "node_counts has {} entries, expected {batch_size}",
                self.node_counts.len()
            )));
        }
        for (b, &count) in self.node_counts.iter().enumerate() {
            if count < 1 || count as usize > max_decoding_tokens {
                return Err(Error::InvalidInput(format!(
                    "node_counts[{b}] = {count} out of range [1, {max_decoding_tokens}]"
                )));
            }
        }

        self.paths.validate()
    }
}

impl AcceptOutputs<'_> {
    fn check_shapes(&self, batch_size: usize, max_path_len: usize) -> Result<()> {
        if self.accepted_tokens.len() != batch_size * max_path_len
            || self.accepted_lens.len() != batch_size
            || self.best_path_ids.len() != batch_size
        {
            return Err(Error::InvalidInput(format!(
                "acceptance outputs have shapes [{}], [{}], [{}], expected [{}], [{batch_size}], [{batch_size}]",
                self.accepted_tokens.len(),
                self.accepted_lens.len(),
                self.best_path_ids.len(),
                batch_size * max_path_len,
            )));
        }
        Ok(())
    }
}

/// Number of draft tokens along `path` that match the base-model tokens.
///
/// Stops at the sentinel, at a node the sequence did not draft this step, or
/// at the first mismatch. `path` must start at the root.
pub fn match_length(path: &[i32], draft: &[i32], target: &[i32], node_count: usize) -> usize {
    let mut matched = 0;
    for pair in path.windows(2) {
        let (prev, node) = (pair[0], pair[1]);
        if node == INVALID_NODE || node as usize >= node_count {
            break;
        }
        if draft[node as usize] != target[prev as usize] {
            break;
        }
        matched += 1;
    }
    matched
}

/// Best path of one sequence as `(path_id, matched)`.
///
/// Greatest match wins, ties go to the lowest path id. With no used path the
/// result is `(0, 0)`.
fn best_path(
    paths: &[i32],
    max_path_len: usize,
    draft: &[i32],
    target: &[i32],
    node_count: usize,
) -> (usize, usize) {
    let mut best: Option<(usize, usize)> = None;
    for (p, path) in paths.chunks_exact(max_path_len).enumerate() {
        if !PathTable::is_used(path) {
            continue;
        }
        let matched = match_length(path, draft, target, node_count);
        if best.map_or(true, |(_, m)| matched > m) {
            best = Some((p, matched));
        }
    }
    best.unwrap_or((0, 0))
}

/// Greedily accept draft tokens for every sequence.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if inputs or outputs are malformed. No
/// output is written in that case.
pub fn accept_draft_tokens(params: &AcceptParams<'_>, outputs: AcceptOutputs<'_>) -> Result<()> {
    params.check_params()?;
    let max_decoding_tokens = params.paths.max_decoding_tokens();
    let max_path_len = params.paths.max_path_len();
    outputs.check_shapes(params.paths.batch_size(), max_path_len)?;

    tracing::trace!("accept_draft_tokens start");

    outputs
        .accepted_tokens
        .par_chunks_mut(max_path_len)
        .zip(outputs.accepted_lens.par_iter_mut())
        .zip(outputs.best_path_ids.par_iter_mut())
        .enumerate()
        .for_each(|(b, ((tokens, accepted_len), best_path_id))| {
            let row = b * max_decoding_tokens..(b + 1) * max_decoding_tokens;
            let draft = &params.draft_ids[row.clone()];
            let target = &params.target_ids[row];
            let node_count = params.node_counts[b] as usize;

            let (path_id, matched) = best_path(
                params.paths.paths_of(b),
                max_path_len,
                draft,
                target,
                node_count,
            );
            let path = params.paths.path(b, path_id);

            tokens.fill(INVALID_TOKEN_ID);
            if PathTable::is_used(path) {
                for (slot, &node) in tokens.iter_mut().zip(&path[..=matched]) {
                    *slot = target[node as usize];
                }
            } else {
                tokens[0] = target[0];
            }

            *accepted_len = (matched + 1) as i32;
            *best_path_id = path_id as i32;
        });

    tracing::trace!("accept_draft_tokens stop");
    Ok(())
}
