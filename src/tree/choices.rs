//! Build path tables from EAGLE/Medusa "choices".
//!
//! A choice is the list of top-k ranks walked from the root, e.g. `[0, 1]` is
//! the second-best continuation of the best first token. Choices are sorted by
//! depth then lexicographically, and the i-th choice becomes node `i + 1`.

use std::collections::HashMap;

use super::paths::INVALID_NODE;
use crate::error::{Error, Result};

/// Draft tree with node 0 as root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftTree {
    /// Parent of every node; `None` only for the root.
    parents: Vec<Option<usize>>,
    /// Depth of every node, root = 0.
    depths: Vec<usize>,
}

impl DraftTree {
    /// Build from choice lists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTree`] for an empty or duplicate choice, or a
    /// choice whose prefix is not itself a choice.
    pub fn from_choices<C: AsRef<[usize]>>(choices: &[C]) -> Result<Self> {
        let mut sorted: Vec<&[usize]> = choices.iter().map(AsRef::as_ref).collect();
        sorted.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let mut node_of: HashMap<&[usize], usize> = HashMap::with_capacity(sorted.len());
        let mut parents = Vec::with_capacity(sorted.len() + 1);
        let mut depths = Vec::with_capacity(sorted.len() + 1);
        parents.push(None);
        depths.push(0);

        for (i, choice) in sorted.into_iter().enumerate() {
            let node = i + 1;
            if choice.is_empty() {
                return Err(Error::InvalidTree("empty choice".into()));
            }
            let parent = if choice.len() == 1 {
                0
            } else {
                let prefix = &choice[..choice.len() - 1];
                *node_of.get(prefix).ok_or_else(|| {
                    Error::InvalidTree(format!("choice {choice:?} has no parent {prefix:?}"))
                })?
            };
            if node_of.insert(choice, node).is_some() {
                return Err(Error::InvalidTree(format!("duplicate choice {choice:?}")));
            }
            parents.push(Some(parent));
            depths.push(depths[parent] + 1);
        }

        Ok(Self { parents, depths })
    }

    /// Build from a parent list where `parents[i]` is the parent of node `i + 1`.
    ///
    /// Parents must precede their children.
    pub fn from_parents(parents: &[usize]) -> Result<Self> {
        let mut all = Vec::with_capacity(parents.len() + 1);
        let mut depths = Vec::with_capacity(parents.len() + 1);
        all.push(None);
        depths.push(0);

        for (i, &parent) in parents.iter().enumerate() {
            let node = i + 1;
            if parent >= node {
                return Err(Error::InvalidTree(format!(
                    "node {node} has parent {parent}, parents must come first"
                )));
            }
            all.push(Some(parent));
            depths.push(depths[parent] + 1);
        }

        Ok(Self {
            parents: all,
            depths,
        })
    }

    /// Number of nodes including the root.
    pub fn num_nodes(&self) -> usize {
        self.parents.len()
    }

    /// Number of draft nodes, i.e. nodes other than the root.
    pub fn num_draft_nodes(&self) -> usize {
        self.parents.len() - 1
    }

    /// Longest root-to-leaf path, counting the root.
    pub fn max_path_len(&self) -> usize {
        self.depths.iter().copied().max().unwrap_or(0) + 1
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parents.get(node).copied().flatten()
    }

    /// Leaves in ascending node order.
    pub fn leaves(&self) -> Vec<usize> {
        let mut has_child = vec![false; self.parents.len()];
        for parent in self.parents.iter().flatten() {
            has_child[*parent] = true;
        }
        (0..self.parents.len()).filter(|&n| !has_child[n]).collect()
    }

    /// Nodes from the root down to `node`.
    pub fn path_to(&self, node: usize) -> Vec<usize> {
        let mut path = Vec::with_capacity(self.depths[node] + 1);
        let mut cur = Some(node);
        while let Some(n) = cur {
            path.push(n);
            cur = self.parents[n];
        }
        path.reverse();
        path
    }

    /// Serialize into a `[max_decoding_tokens, max_path_len]` path table.
    ///
    /// One row per leaf, unused rows and tails padded with [`INVALID_NODE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTree`] if the tree has more nodes than
    /// `max_decoding_tokens` or is deeper than `max_path_len`.
    pub fn to_paths(&self, max_decoding_tokens: usize, max_path_len: usize) -> Result<Vec<i32>> {
        if self.num_nodes() > max_decoding_tokens {
            return Err(Error::InvalidTree(format!(
                "{} nodes exceed max_decoding_tokens {max_decoding_tokens}",
                self.num_nodes()
            )));
        }
        if self.max_path_len() > max_path_len {
            return Err(Error::InvalidTree(format!(
                "depth {} exceeds max_path_len {max_path_len}",
                self.max_path_len()
            )));
        }

        let mut table = vec![INVALID_NODE; max_decoding_tokens * max_path_len];
        for (row, leaf) in self.leaves().into_iter().enumerate() {
            let dst = &mut table[row * max_path_len..(row + 1) * max_path_len];
            for (slot, node) in dst.iter_mut().zip(self.path_to(leaf)) {
                *slot = node as i32;
            }
        }
        Ok(table)
    }
}
