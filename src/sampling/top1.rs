//! Greedy (top-1) sampling over the draft tree logits.
//!
//! Logits rows are packed per sequence: sequence `b` owns
//! `draft_lens[b] + 1` consecutive rows (its draft nodes plus the root), and
//! the first row of `b` sits after all rows of earlier sequences.
//!
//! ```text
//! draft_lens   = [2, 0, 3]
//! node_counts  = [3, 1, 4]
//! first row    = [0, 3, 4]      exclusive prefix sum of node_counts
//! ```

use candle_core::Tensor;
use rayon::prelude::*;

use super::{LogitElement, INVALID_TOKEN_ID};
use crate::config::Precision;
use crate::error::{Error, Result};

/// Argmax of one logits row.
///
/// Ties go to the lowest token id. A NaN never beats a number; an all-NaN row
/// yields token 0.
pub fn argmax<T: LogitElement>(row: &[T]) -> (usize, T) {
    let mut best_idx = 0;
    let mut best = row[0];
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > best || (best.is_nan() && !v.is_nan()) {
            best = v;
            best_idx = i;
        }
    }
    (best_idx, best)
}

/// Compute the node count and logits offsets of every sequence.
///
/// Writes `node_counts[b] = draft_lens[b] + 1` and, for every node `n` below
/// that count, `logits_offsets[b * max_decoding_tokens + n]` = element offset
/// of its logits row. Offsets of unused nodes are left at zero.
///
/// Returns the number of logits rows consumed.
///
/// # Panics
///
/// Panics if a `draft_lens` entry is negative or not below
/// `max_decoding_tokens`, or if `logits_offsets` holds fewer than
/// `draft_lens.len() * max_decoding_tokens` entries or `node_counts` fewer
/// than `draft_lens.len()`. [`SampleAndAccept::step`] checks all of these
/// before calling.
///
/// [`SampleAndAccept::step`]: crate::SampleAndAccept::step
pub fn assemble_logits_offsets(
    draft_lens: &[i32],
    max_decoding_tokens: usize,
    vocab_size: usize,
    logits_offsets: &mut [u64],
    node_counts: &mut [i32],
) -> usize {
    let mut row = 0usize;
    for (b, &draft_len) in draft_lens.iter().enumerate() {
        let count = draft_len as usize + 1;
        node_counts[b] = count as i32;

        let offsets = &mut logits_offsets[b * max_decoding_tokens..(b + 1) * max_decoding_tokens];
        for (n, offset) in offsets.iter_mut().enumerate() {
            *offset = if n < count {
                ((row + n) * vocab_size) as u64
            } else {
                0
            };
        }
        row += count;
    }
    row
}

/// Sample the base-model token of every node.
///
/// `target_ids` and `best_scores` are `[batch, max_decoding_tokens]`. Nodes at
/// or past a sequence's node count get [`INVALID_TOKEN_ID`]. Parallel over
/// sequences; each sequence writes only its own rows.
///
/// # Panics
///
/// Panics if an offset of a node below its sequence's count, plus
/// `vocab_size`, runs past the end of `logits`. Offsets and counts must come
/// from [`assemble_logits_offsets`] over the same `vocab_size`.
pub fn sample_top1<T: LogitElement>(
    logits: &[T],
    vocab_size: usize,
    max_decoding_tokens: usize,
    logits_offsets: &[u64],
    node_counts: &[i32],
    target_ids: &mut [i32],
    best_scores: &mut [T],
) {
    tracing::trace!(precision = T::PRECISION.as_str(), "sample_top1 start");

    target_ids
        .par_chunks_mut(max_decoding_tokens)
        .zip(best_scores.par_chunks_mut(max_decoding_tokens))
        .zip(logits_offsets.par_chunks(max_decoding_tokens))
        .zip(node_counts.par_iter())
        .for_each(|(((ids, scores), offsets), &count)| {
            let count = count as usize;
            for n in 0..max_decoding_tokens {
                if n < count {
                    let start = offsets[n] as usize;
                    let (token, score) = argmax(&logits[start..start + vocab_size]);
                    ids[n] = token as i32;
                    scores[n] = score;
                } else {
                    ids[n] = INVALID_TOKEN_ID;
                    scores[n] = T::zeroed();
                }
            }
        });

    tracing::trace!("sample_top1 stop");
}

/// Standalone greedy sampler over a `[rows, vocab]` logits tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Top1Sampler;

impl Top1Sampler {
    pub fn new() -> Self {
        Self
    }

    /// Argmax token of every row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPrecision`] for dtypes other than F32 and
    /// F16, and [`Error::InvalidInput`] for tensors that are not 2D or have an
    /// empty vocabulary.
    pub fn sample(&self, logits: &Tensor) -> Result<Vec<u32>> {
        let (rows, vocab_size) = logits.dims2().map_err(|_| {
            Error::InvalidInput(format!("expected 2D logits, got {:?}", logits.dims()))
        })?;
        if vocab_size == 0 {
            return Err(Error::InvalidInput("vocabulary size must be positive".into()));
        }

        match Precision::from_dtype(logits.dtype())? {
            Precision::F32 => self.sample_typed::<f32>(logits, rows, vocab_size),
            Precision::F16 => self.sample_typed::<half::f16>(logits, rows, vocab_size),
        }
    }

    fn sample_typed<T: LogitElement>(
        &self,
        logits: &Tensor,
        rows: usize,
        vocab_size: usize,
    ) -> Result<Vec<u32>> {
        debug_assert_eq!(logits.dtype(), T::DTYPE);
        let values = logits.flatten_all()?.to_vec1::<T>()?;
        Ok((0..rows)
            .into_par_iter()
            .map(|r| argmax(&values[r * vocab_size..(r + 1) * vocab_size]).0 as u32)
            .collect())
    }
}

/// Dtype check shared with the engine.
pub(crate) fn expect_dtype(logits: &Tensor, precision: Precision) -> Result<()> {
    if logits.dtype() == precision.dtype() {
        return Ok(());
    }
    // Report unsupported dtypes as such, not as a mismatch.
    Precision::from_dtype(logits.dtype())?;
    Err(Error::PrecisionMismatch {
        configured: precision.as_str(),
        actual: format!("{:?}", logits.dtype()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use half::f16;

    #[test]
    fn test_argmax_tie_goes_to_lowest_id() {
        let row = [1.0f32, 3.0, 3.0, 2.0];
        assert_eq!(argmax(&row).0, 1);

        let row: Vec<f16> = row.iter().map(|&v| f16::from_f32(v)).collect();
        assert_eq!(argmax(&row).0, 1);
    }

    #[test]
    fn test_argmax_skips_nan() {
        let row = [f32::NAN, 0.5, 2.0, f32::NAN];
        assert_eq!(argmax(&row), (2, 2.0));
    }

    #[test]
    fn test_assemble_offsets() {
        let draft_lens = [2, 0, 1];
        let mut offsets = vec![0u64; 9];
        let mut counts = vec![0i32; 3];

        let rows = assemble_logits_offsets(&draft_lens, 3, 10, &mut offsets, &mut counts);

        assert_eq!(rows, 6);
        assert_eq!(counts, vec![3, 1, 2]);
        assert_eq!(offsets, vec![0, 10, 20, 30, 0, 0, 40, 50, 0]);
    }

    #[test]
    fn test_sample_top1_marks_unused_nodes() {
        // 1 sequence, 1 draft node, max_decoding_tokens = 3, vocab = 3
        let logits = [0.1f32, 0.9, 0.0, 5.0, 1.0, 1.0];
        let mut offsets = vec![0u64; 3];
        let mut counts = vec![0i32; 1];
        assemble_logits_offsets(&[1], 3, 3, &mut offsets, &mut counts);

        let mut ids = vec![0i32; 3];
        let mut scores = vec![0f32; 3];
        sample_top1(&logits, 3, 3, &offsets, &counts, &mut ids, &mut scores);

        assert_eq!(ids, vec![1, 0, INVALID_TOKEN_ID]);
        assert_eq!(&scores[..2], &[0.9, 5.0]);
    }

    #[test]
    fn test_sampler_on_tensor() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0.1f32, 0.2, 0.3, 10.0, 0.4], [0.1, 10.0, 0.3, 0.4, 0.5]], &device)
            .unwrap();

        let tokens = Top1Sampler::new().sample(&logits).unwrap();
        assert_eq!(tokens, vec![3, 1]);

        let half = logits.to_dtype(DType::F16).unwrap();
        assert_eq!(Top1Sampler::new().sample(&half).unwrap(), vec![3, 1]);
    }

    #[test]
    fn test_sampler_rejects_bf16() {
        let device = Device::Cpu;
        let logits = Tensor::zeros((2, 4), DType::BF16, &device).unwrap();
        let err = Top1Sampler::new().sample(&logits).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPrecision(_)));
    }
}
