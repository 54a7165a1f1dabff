//! Scratch workspace for one sample-and-accept step.
//!
//! The caller sizes a [`Workspace`] once with [`WorkspaceLayout::total_bytes`]
//! and hands it to every step. A step carves it into typed, non-overlapping
//! regions through a [`WorkspaceArena`]:
//!
//! ```text
//! ┌──────────────────┬──────────────┬──────────────────┬─────────────┐
//! │ sampling scratch │ target ids   │ logits offsets   │ node counts │
//! │ T × B·N          │ i32 × B·N    │ u64 × B·N        │ i32 × B     │
//! └──────────────────┴──────────────┴──────────────────┴─────────────┘
//!   each region rounded up to WORKSPACE_ALIGNMENT bytes
//! ```
//!
//! where `B` is the batch size and `N` is `max_decoding_tokens`.

use bytemuck::Pod;

use crate::config::Precision;
use crate::error::{Error, Result};

/// Alignment of every region, in bytes.
pub const WORKSPACE_ALIGNMENT: usize = 256;

/// Round `bytes` up to [`WORKSPACE_ALIGNMENT`].
pub const fn aligned_size(bytes: usize) -> usize {
    bytes.div_ceil(WORKSPACE_ALIGNMENT) * WORKSPACE_ALIGNMENT
}

/// Byte sizes of the workspace regions for a given step shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceLayout {
    /// Per-node sampling scratch (best logit per node).
    pub sampling_bytes: usize,
    /// Per-node sampled target token ids.
    pub target_ids_bytes: usize,
    /// Per-node logits row offsets.
    pub logits_offsets_bytes: usize,
    /// Per-sequence node counts.
    pub node_counts_bytes: usize,
}

impl WorkspaceLayout {
    /// Compute region sizes. Pure function of its arguments.
    pub fn new(batch_size: usize, max_decoding_tokens: usize, precision: Precision) -> Self {
        let num_nodes = batch_size * max_decoding_tokens;
        Self {
            sampling_bytes: num_nodes * precision.size_in_bytes(),
            target_ids_bytes: num_nodes * std::mem::size_of::<i32>(),
            logits_offsets_bytes: num_nodes * std::mem::size_of::<u64>(),
            node_counts_bytes: batch_size * std::mem::size_of::<i32>(),
        }
    }

    /// Total bytes including alignment padding.
    pub fn total_bytes(&self) -> usize {
        [
            self.sampling_bytes,
            self.target_ids_bytes,
            self.logits_offsets_bytes,
            self.node_counts_bytes,
        ]
        .into_iter()
        .map(aligned_size)
        .sum()
    }
}

/// Owned scratch buffer.
///
/// Backed by `u64` words so every region offset keeps 8-byte alignment.
#[derive(Debug, Default)]
pub struct Workspace {
    words: Vec<u64>,
    len: usize,
}

impl Workspace {
    /// Allocate a zeroed workspace of at least `bytes` bytes.
    pub fn new(bytes: usize) -> Self {
        Self {
            words: vec![0; bytes.div_ceil(8)],
            len: bytes,
        }
    }

    /// Allocate exactly what `layout` needs.
    pub fn for_layout(layout: &WorkspaceLayout) -> Self {
        Self::new(layout.total_bytes())
    }

    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow to at least `bytes`. Existing content is not preserved.
    pub fn reserve(&mut self, bytes: usize) {
        if bytes > self.len {
            *self = Self::new(bytes);
        }
    }

    /// Start handing out regions from the beginning of the buffer.
    pub fn arena(&mut self) -> WorkspaceArena<'_> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.words[..]);
        WorkspaceArena {
            rest: &mut bytes[..self.len],
            used: 0,
            capacity: self.len,
        }
    }
}

/// Bump allocator over a [`Workspace`].
///
/// Regions borrow disjoint parts of the buffer, so they can be written in
/// parallel.
#[derive(Debug)]
pub struct WorkspaceArena<'a> {
    rest: &'a mut [u8],
    used: usize,
    capacity: usize,
}

impl<'a> WorkspaceArena<'a> {
    /// Take the next region of `count` elements of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkspaceTooSmall`] if the aligned region does not fit.
    pub fn take<T: Pod>(&mut self, count: usize, label: &'static str) -> Result<&'a mut [T]> {
        let bytes = count * std::mem::size_of::<T>();
        let reserved = aligned_size(bytes);
        if reserved > self.rest.len() {
            tracing::error!(
                region = label,
                required = self.used + reserved,
                available = self.capacity,
                "workspace region does not fit"
            );
            return Err(Error::WorkspaceTooSmall {
                required: self.used + reserved,
                available: self.capacity,
            });
        }

        let rest = std::mem::take(&mut self.rest);
        let (head, tail) = rest.split_at_mut(reserved);
        self.rest = tail;
        self.used += reserved;

        debug_assert_eq!(head.as_ptr() as usize % std::mem::align_of::<T>(), 0);
        Ok(bytemuck::cast_slice_mut(&mut head[..bytes]))
    }

    /// Bytes handed out so far, including padding.
    pub fn used(&self) -> usize {
        self.used
    }
}
