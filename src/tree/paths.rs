//! Read-only view over a batched path table.
//!
//! Layout is `[batch_size, max_decoding_tokens, max_path_len]`, row-major.
//! Entry `[b, p, t]` is the node index at depth `t` of path `p` for batch
//! element `b`.

use crate::error::{Error, Result};

/// Sentinel that terminates a path early.
pub const INVALID_NODE: i32 = -1;

/// Borrowed path table for one step.
#[derive(Debug, Clone, Copy)]
pub struct PathTable<'a> {
    data: &'a [i32],
    batch_size: usize,
    max_decoding_tokens: usize,
    max_path_len: usize,
}

impl<'a> PathTable<'a> {
    /// Wrap a flat buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a dimension is zero or the buffer
    /// length does not match the dimensions.
    pub fn new(
        data: &'a [i32],
        batch_size: usize,
        max_decoding_tokens: usize,
        max_path_len: usize,
    ) -> Result<Self> {
        if batch_size == 0 || max_decoding_tokens == 0 || max_path_len == 0 {
            return Err(Error::InvalidInput(format!(
                "path table dimensions must be positive, got [{batch_size}, {max_decoding_tokens}, {max_path_len}]"
            )));
        }
        let expected = batch_size * max_decoding_tokens * max_path_len;
        if data.len() != expected {
            return Err(Error::InvalidInput(format!(
                "path table has {} entries, expected {expected} ([{batch_size}, {max_decoding_tokens}, {max_path_len}])",
                data.len()
            )));
        }

        Ok(Self {
            data,
            batch_size,
            max_decoding_tokens,
            max_path_len,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_decoding_tokens(&self) -> usize {
        self.max_decoding_tokens
    }

    pub fn max_path_len(&self) -> usize {
        self.max_path_len
    }

    pub fn as_slice(&self) -> &'a [i32] {
        self.data
    }

    /// All paths of one batch element, `[max_decoding_tokens, max_path_len]`.
    pub fn paths_of(&self, batch_idx: usize) -> &'a [i32] {
        let stride = self.max_decoding_tokens * self.max_path_len;
        &self.data[batch_idx * stride..(batch_idx + 1) * stride]
    }

    /// One path row.
    pub fn path(&self, batch_idx: usize, path_idx: usize) -> &'a [i32] {
        let start = (batch_idx * self.max_decoding_tokens + path_idx) * self.max_path_len;
        &self.data[start..start + self.max_path_len]
    }

    /// A row whose first entry is the sentinel carries no path.
    pub fn is_used(path: &[i32]) -> bool {
        path.first().is_some_and(|&node| node != INVALID_NODE)
    }

    /// Number of nodes before the first sentinel.
    pub fn path_len(path: &[i32]) -> usize {
        path.iter()
            .position(|&node| node == INVALID_NODE)
            .unwrap_or(path.len())
    }

    /// Check every entry before any data is consulted.
    ///
    /// Entries must be the sentinel or a node in `[0, max_decoding_tokens)`,
    /// and every used row must start at the root node 0. The root appears
    /// only at depth 0, and nothing but sentinels may follow a sentinel.
    pub fn validate(&self) -> Result<()> {
        for b in 0..self.batch_size {
            for p in 0..self.max_decoding_tokens {
                let path = self.path(b, p);
                for (t, &node) in path.iter().enumerate() {
                    if node != INVALID_NODE
                        && (node < 0 || node as usize >= self.max_decoding_tokens)
                    {
                        return Err(Error::InvalidInput(format!(
                            "paths[{b}][{p}][{t}] = {node} out of range [0, {})",
                            self.max_decoding_tokens
                        )));
                    }
                    if t > 0 && node == 0 {
                        return Err(Error::InvalidInput(format!(
                            "paths[{b}][{p}][{t}] revisits the root node"
                        )));
                    }
                    if t > 0 && node != INVALID_NODE && path[t - 1] == INVALID_NODE {
                        return Err(Error::InvalidInput(format!(
                            "paths[{b}][{p}][{t}] = {node} follows a sentinel"
                        )));
                    }
                }
                if Self::is_used(path) && path[0] != 0 {
                    return Err(Error::InvalidInput(format!(
                        "paths[{b}][{p}] starts at node {} instead of the root",
                        path[0]
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_access() {
        #[rustfmt::skip]
        let data = [
            0, 1, 2,
            0, 2, -1,
            -1, -1, -1,
        ];
        let table = PathTable::new(&data, 1, 3, 3).unwrap();

        assert_eq!(table.path(0, 1), &[0, 2, -1]);
        assert!(PathTable::is_used(table.path(0, 0)));
        assert!(!PathTable::is_used(table.path(0, 2)));
        assert_eq!(PathTable::path_len(table.path(0, 1)), 2);
        assert_eq!(PathTable::path_len(table.path(0, 0)), 3);
        table.validate().unwrap();
    }

    #[test]
    fn test_rejects_wrong_length() {
        let data = [0, 1, 2, 3];
        assert!(PathTable::new(&data, 1, 2, 3).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_node() {
        let data = [0, 1, 0, 2];
        let table = PathTable::new(&data, 1, 2, 2).unwrap();
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_rejects_root_below_depth_zero() {
        let data = [0, 0, -1, -1];
        let table = PathTable::new(&data, 1, 2, 2).unwrap();
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("revisits the root"));
    }

    #[test]
    fn test_rejects_node_after_sentinel() {
        #[rustfmt::skip]
        let data = [
            0, -1, 1,
            -1, -1, -1,
        ];
        let table = PathTable::new(&data, 1, 2, 3).unwrap();
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("follows a sentinel"));
    }

    #[test]
    fn test_rejects_path_not_rooted() {
        let data = [1, 0, -1, -1];
        let table = PathTable::new(&data, 1, 2, 2).unwrap();
        assert!(table.validate().is_err());
    }
}
