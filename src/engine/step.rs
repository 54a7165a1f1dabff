//! Sample-and-accept step.
//!
//! [`SampleAndAccept`] runs one speculative decoding iteration:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SampleAndAccept::step                   │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼ validate shapes, dtype, workspace
//!                   ┌──────────────────┐
//!                   │ dispatch on      │  f32 | f16
//!                   │ Precision        │
//!                   └──────────────────┘
//!                            │
//!                            ▼
//!                   ┌──────────────────┐
//!                   │ Top-1 sampling   │  base-model token per node
//!                   └──────────────────┘
//!                            │
//!                            ▼
//!                   ┌──────────────────┐
//!                   │ Acceptance walk  │  longest verified path
//!                   └──────────────────┘
//!                            │
//!                            ▼
//!                   ┌──────────────────┐
//!                   │ Post-processing  │  last token, cumulative indices
//!                   └──────────────────┘
//! ```

use candle_core::Tensor;

use crate::accept::{
    accept_draft_tokens, select_last_accepted_and_cumsum, AcceptOutputs, AcceptParams,
    PostOutputs, PostParams,
};
use crate::config::{AcceptConfig, Precision};
use crate::error::{Error, Result};
use crate::sampling::top1::expect_dtype;
use crate::sampling::{assemble_logits_offsets, sample_top1, LogitElement, INVALID_TOKEN_ID};
use crate::tree::PathTable;
use crate::workspace::{Workspace, WorkspaceLayout};

/// Dimensions of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepShape {
    pub batch_size: usize,
    /// Node capacity per sequence, root included.
    pub max_decoding_tokens: usize,
    /// Path capacity, root included.
    pub max_path_len: usize,
    pub vocab_size: usize,
}

impl StepShape {
    pub fn new(
        batch_size: usize,
        max_decoding_tokens: usize,
        max_path_len: usize,
        vocab_size: usize,
    ) -> Self {
        Self {
            batch_size,
            max_decoding_tokens,
            max_path_len,
            vocab_size,
        }
    }

    /// Node slots across the batch.
    pub fn num_nodes(&self) -> usize {
        self.batch_size * self.max_decoding_tokens
    }
}

/// Inputs of one step.
#[derive(Debug, Clone, Copy)]
pub struct StepInputs<'a> {
    /// `[total_rows, vocab_size]`, F32 or F16.
    pub logits: &'a Tensor,
    /// `[batch, max_decoding_tokens]`, draft token per node.
    pub draft_token_ids: &'a [i32],
    /// `[batch]`, draft nodes per sequence, root excluded.
    pub draft_lens: &'a [i32],
    pub paths: PathTable<'a>,
    /// `[batch]`, unused by greedy acceptance.
    pub temperature: &'a [f32],
    /// `[batch]`, unused by greedy acceptance.
    pub rand_validation: &'a [f32],
}

impl StepInputs<'_> {
    /// Shape implied by the path table and logits.
    pub fn shape(&self) -> Result<StepShape> {
        let (_, vocab_size) = self.logits.dims2().map_err(|_| {
            Error::InvalidInput(format!(
                "expected 2D logits, got {:?}",
                self.logits.dims()
            ))
        })?;
        Ok(StepShape::new(
            self.paths.batch_size(),
            self.paths.max_decoding_tokens(),
            self.paths.max_path_len(),
            vocab_size,
        ))
    }
}

/// Outputs of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutputs {
    /// `[batch, max_path_len]`.
    pub accepted_tokens: Vec<i32>,
    /// `[batch]`.
    pub num_accepted_tokens: Vec<i32>,
    /// `[batch]`.
    pub accepted_path_ids: Vec<i32>,
    /// `[batch]`.
    pub last_accepted_token_ids: Vec<i32>,
    /// `[batch]`.
    pub exclusive_sum_accepted_indices: Vec<i32>,
    /// `[batch]`, flat logits row of the last accepted node.
    pub last_accepted_hidden_indices: Vec<i32>,
    /// `[batch, max_decoding_tokens]`, filled by the draft model.
    pub next_draft_tokens: Vec<i32>,
    /// `[batch]`, filled by the draft model.
    pub next_draft_lens: Vec<i32>,
    max_path_len: usize,
}

impl StepOutputs {
    fn new(shape: &StepShape) -> Self {
        Self {
            accepted_tokens: vec![INVALID_TOKEN_ID; shape.batch_size * shape.max_path_len],
            num_accepted_tokens: vec![0; shape.batch_size],
            accepted_path_ids: vec![0; shape.batch_size],
            last_accepted_token_ids: vec![INVALID_TOKEN_ID; shape.batch_size],
            exclusive_sum_accepted_indices: vec![0; shape.batch_size],
            last_accepted_hidden_indices: vec![0; shape.batch_size],
            next_draft_tokens: vec![INVALID_TOKEN_ID; shape.num_nodes()],
            next_draft_lens: vec![0; shape.batch_size],
            max_path_len: shape.max_path_len,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.num_accepted_tokens.len()
    }

    pub fn max_path_len(&self) -> usize {
        self.max_path_len
    }

    /// Accepted tokens of one sequence, without the unused tail.
    pub fn accepted(&self, batch_idx: usize) -> &[i32] {
        let start = batch_idx * self.max_path_len;
        let len = self.num_accepted_tokens[batch_idx] as usize;
        &self.accepted_tokens[start..start + len]
    }

    /// Tokens produced across the batch this step.
    pub fn total_accepted(&self) -> usize {
        self.num_accepted_tokens.iter().map(|&n| n as usize).sum()
    }
}

/// Greedy sample-and-accept for EAGLE draft trees.
#[derive(Debug, Clone)]
pub struct SampleAndAccept {
    config: AcceptConfig,
}

impl SampleAndAccept {
    /// Create a new step runner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonGreedyUnsupported`] if the config asks for
    /// probabilistic acceptance.
    pub fn new(config: AcceptConfig) -> Result<Self> {
        if !config.greedy_sampling {
            tracing::error!("non-greedy acceptance requested");
            return Err(Error::NonGreedyUnsupported);
        }
        tracing::debug!(precision = %config.precision, "created sample-and-accept step");
        Ok(Self { config })
    }

    /// Restore from [`SampleAndAccept::serialize`] output.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Self::new(AcceptConfig::from_bytes(data)?)
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.config.to_bytes()
    }

    pub fn config(&self) -> &AcceptConfig {
        &self.config
    }

    pub fn precision(&self) -> Precision {
        self.config.precision
    }

    /// Workspace layout for `shape`.
    pub fn workspace_layout(&self, shape: &StepShape) -> WorkspaceLayout {
        WorkspaceLayout::new(shape.batch_size, shape.max_decoding_tokens, self.config.precision)
    }

    /// Bytes of workspace [`SampleAndAccept::step`] needs for `shape`.
    pub fn workspace_size(&self, shape: &StepShape) -> usize {
        self.workspace_layout(shape).total_bytes()
    }

    /// Run one step.
    ///
    /// # Errors
    ///
    /// Any malformed input, dtype mismatch or undersized workspace aborts the
    /// whole step before sampling starts.
    pub fn step(&self, inputs: &StepInputs<'_>, workspace: &mut Workspace) -> Result<StepOutputs> {
        let shape = inputs.shape()?;
        let rows = self.validate(inputs, &shape, workspace)?;

        let outputs = match self.config.precision {
            Precision::F32 => self.run::<f32>(inputs, &shape, rows, workspace)?,
            Precision::F16 => self.run::<half::f16>(inputs, &shape, rows, workspace)?,
        };

        tracing::debug!(
            batch_size = shape.batch_size,
            rows,
            accepted = outputs.total_accepted(),
            mean_accepted_len = outputs.total_accepted() as f32 / shape.batch_size as f32,
            "sample-and-accept step done"
        );
        Ok(outputs)
    }

    /// Check every precondition. Returns the number of logits rows in use.
    fn validate(
        &self,
        inputs: &StepInputs<'_>,
        shape: &StepShape,
        workspace: &Workspace,
    ) -> Result<usize> {
        expect_dtype(inputs.logits, self.config.precision)?;

        if shape.vocab_size == 0 {
            return Err(Error::InvalidInput("vocabulary size must be positive".into()));
        }

        let per_batch = [
            ("draft_lens", inputs.draft_lens.len()),
            ("temperature", inputs.temperature.len()),
            ("rand_validation", inputs.rand_validation.len()),
        ];
        for (name, len) in per_batch {
            if len != shape.batch_size {
                return Err(Error::InvalidInput(format!(
                    "{name} has {len} entries, expected {}",
                    shape.batch_size
                )));
            }
        }
        if inputs.draft_token_ids.len() != shape.num_nodes() {
            return Err(Error::InvalidInput(format!(
                "draft_token_ids has {} entries, expected {}",
                inputs.draft_token_ids.len(),
                shape.num_nodes()
            )));
        }

        let mut rows = 0usize;
        for (b, &len) in inputs.draft_lens.iter().enumerate() {
            if len < 0 || len as usize >= shape.max_decoding_tokens {
                return Err(Error::InvalidInput(format!(
                    "draft_lens[{b}] = {len} out of range [0, {})",
                    shape.max_decoding_tokens
                )));
            }
            rows += len as usize + 1;
        }

        let total_rows = inputs.logits.dim(0)?;
        if total_rows < rows {
            return Err(Error::InvalidInput(format!(
                "logits have {total_rows} rows, draft lengths need {rows}"
            )));
        }
        if total_rows > rows {
            tracing::warn!(total_rows, rows, "ignoring padded logits rows");
        }

        inputs.paths.validate()?;

        let required = self.workspace_size(shape);
        if workspace.len() < required {
            return Err(Error::WorkspaceTooSmall {
                required,
                available: workspace.len(),
            });
        }

        Ok(rows)
    }

    fn run<T: LogitElement>(
        &self,
        inputs: &StepInputs<'_>,
        shape: &StepShape,
        rows: usize,
        workspace: &mut Workspace,
    ) -> Result<StepOutputs> {
        tracing::trace!(precision = T::PRECISION.as_str(), "greedy step start");

        let logits = inputs
            .logits
            .narrow(0, 0, rows)?
            .flatten_all()?
            .to_vec1::<T>()?;

        let num_nodes = shape.num_nodes();
        let mut arena = workspace.arena();
        let best_scores = arena.take::<T>(num_nodes, "sampling")?;
        let target_ids = arena.take::<i32>(num_nodes, "target_ids")?;
        let logits_offsets = arena.take::<u64>(num_nodes, "logits_offsets")?;
        let node_counts = arena.take::<i32>(shape.batch_size, "node_counts")?;
        debug_assert!(arena.used() <= self.workspace_size(shape));

        assemble_logits_offsets(
            inputs.draft_lens,
            shape.max_decoding_tokens,
            shape.vocab_size,
            logits_offsets,
            node_counts,
        );

        sample_top1(
            &logits,
            shape.vocab_size,
            shape.max_decoding_tokens,
            logits_offsets,
            node_counts,
            target_ids,
            best_scores,
        );

        let mut outputs = StepOutputs::new(shape);

        accept_draft_tokens(
            &AcceptParams {
                draft_ids: inputs.draft_token_ids,
                target_ids,
                node_counts,
                paths: inputs.paths,
            },
            AcceptOutputs {
                accepted_tokens: &mut outputs.accepted_tokens,
                accepted_lens: &mut outputs.num_accepted_tokens,
                best_path_ids: &mut outputs.accepted_path_ids,
            },
        )?;

        select_last_accepted_and_cumsum(
            &PostParams {
                accepted_tokens: &outputs.accepted_tokens,
                accepted_lens: &outputs.num_accepted_tokens,
                best_path_ids: &outputs.accepted_path_ids,
                node_counts,
                paths: inputs.paths,
            },
            PostOutputs {
                last_accepted_token_ids: &mut outputs.last_accepted_token_ids,
                exclusive_sum_accepted_indices: &mut outputs.exclusive_sum_accepted_indices,
                last_accepted_hidden_indices: &mut outputs.last_accepted_hidden_indices,
            },
        )?;

        tracing::trace!("greedy step stop");
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_rejects_non_greedy() {
        let result = SampleAndAccept::new(AcceptConfig::default().greedy(false));
        assert!(matches!(result, Err(Error::NonGreedyUnsupported)));
    }

    #[test]
    fn test_workspace_size_depends_on_precision() {
        let shape = StepShape::new(4, 64, 5, 32000);
        let f32_step = SampleAndAccept::new(AcceptConfig::new(Precision::F32)).unwrap();
        let f16_step = SampleAndAccept::new(AcceptConfig::new(Precision::F16)).unwrap();

        assert_eq!(f32_step.workspace_size(&shape), f32_step.workspace_size(&shape));
        assert!(f32_step.workspace_size(&shape) > f16_step.workspace_size(&shape));
    }

    #[test]
    fn test_single_path_step() {
        let device = Device::Cpu;
        // root + 2 draft nodes, vocab 4; argmax per row = [2, 3, 1]
        let logits = Tensor::new(
            &[
                [0.0f32, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 0.0],
            ],
            &device,
        )
        .unwrap();
        #[rustfmt::skip]
        let paths = [
            0, 1, 2,
            -1, -1, -1,
            -1, -1, -1,
        ];
        let draft_ids = [9, 2, 3];
        let inputs = StepInputs {
            logits: &logits,
            draft_token_ids: &draft_ids,
            draft_lens: &[2],
            paths: PathTable::new(&paths, 1, 3, 3).unwrap(),
            temperature: &[1.0],
            rand_validation: &[0.0],
        };

        let step = SampleAndAccept::new(AcceptConfig::default()).unwrap();
        let mut workspace = Workspace::new(step.workspace_size(&inputs.shape().unwrap()));
        let outputs = step.step(&inputs, &mut workspace).unwrap();

        assert_eq!(outputs.accepted(0), &[2, 3, 1]);
        assert_eq!(outputs.num_accepted_tokens, vec![3]);
        assert_eq!(outputs.last_accepted_token_ids, vec![1]);
        assert_eq!(outputs.last_accepted_hidden_indices, vec![2]);
    }
}
