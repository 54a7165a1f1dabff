//! Top-1 sampling of base-model tokens.
//!
//! Every draft tree node gets one base-model token: the argmax of its logits
//! row. The reduction is generic over [`LogitElement`] so the f32 and f16 code
//! paths share one implementation and one tie-break rule.

pub mod top1;

use crate::config::Precision;

pub use top1::{argmax, assemble_logits_offsets, sample_top1, Top1Sampler};

/// Token id written where no token exists.
pub const INVALID_TOKEN_ID: i32 = -1;

/// Element types the sampler can reduce over.
pub trait LogitElement: candle_core::WithDType + bytemuck::Pod {
    /// Precision tag matching this element type.
    const PRECISION: Precision;

    fn is_nan(self) -> bool;
}

impl LogitElement for f32 {
    const PRECISION: Precision = Precision::F32;

    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}

impl LogitElement for half::f16 {
    const PRECISION: Precision = Precision::F16;

    fn is_nan(self) -> bool {
        half::f16::is_nan(self)
    }
}
