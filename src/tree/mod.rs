//! Draft token trees.
//!
//! The draft model proposes a tree of candidate tokens per sequence. The
//! acceptance step consumes that tree serialized as a path table: one row per
//! root-to-leaf path, rows sharing prefixes, padded with [`INVALID_NODE`].
//!
//! ```text
//! tree              path table (max_path_len = 4)
//!
//!   0               [0, 1, 3, 4]
//!  / \              [0, 2, -1, -1]
//! 1   2             [-1, -1, -1, -1]   <- unused row
//! |
//! 3
//! |
//! 4
//! ```

pub mod choices;
pub mod paths;

pub use choices::DraftTree;
pub use paths::{PathTable, INVALID_NODE};
