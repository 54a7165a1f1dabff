//! Acceptance statistics across steps.
//!
//! The step itself keeps no state; callers that want to monitor draft
//! quality own an [`AcceptanceStats`] and feed it every step's outputs.

use super::step::StepOutputs;

/// Running totals over recorded steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptanceStats {
    /// Steps recorded.
    pub num_steps: usize,
    /// Sequence-steps recorded (batch size summed over steps).
    pub num_sequence_steps: usize,
    /// Draft tree nodes proposed, root excluded.
    pub total_draft_tokens: usize,
    /// Draft tokens verified by the base model.
    pub total_accepted_draft_tokens: usize,
    /// Tokens emitted, including the fresh base-model token of every sequence.
    pub total_tokens: usize,
}

impl AcceptanceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one step.
    ///
    /// `draft_lens` is the same slice that was passed to the step.
    pub fn record(&mut self, outputs: &StepOutputs, draft_lens: &[i32]) {
        debug_assert_eq!(draft_lens.len(), outputs.batch_size());
        self.num_steps += 1;
        self.num_sequence_steps += outputs.batch_size();
        self.total_draft_tokens += draft_lens.iter().map(|&n| n.max(0) as usize).sum::<usize>();
        self.total_tokens += outputs.total_accepted();
        self.total_accepted_draft_tokens += outputs.total_accepted() - outputs.batch_size();
    }

    /// Fraction of proposed draft nodes that were accepted.
    ///
    /// Tree drafts propose more nodes than any single path can accept, so this
    /// is a lower bound on per-path acceptance.
    pub fn acceptance_rate(&self) -> f32 {
        if self.total_draft_tokens == 0 {
            0.0
        } else {
            self.total_accepted_draft_tokens as f32 / self.total_draft_tokens as f32
        }
    }

    /// Mean tokens emitted per sequence per step. 1.0 means no speedup.
    pub fn tokens_per_sequence_step(&self) -> f32 {
        if self.num_sequence_steps == 0 {
            0.0
        } else {
            self.total_tokens as f32 / self.num_sequence_steps as f32
        }
    }

    /// Combine totals from another collector.
    pub fn merge(&mut self, other: &AcceptanceStats) {
        self.num_steps += other.num_steps;
        self.num_sequence_steps += other.num_sequence_steps;
        self.total_draft_tokens += other.total_draft_tokens;
        self.total_accepted_draft_tokens += other.total_accepted_draft_tokens;
        self.total_tokens += other.total_tokens;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
