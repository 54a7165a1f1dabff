//! Configuration types for nano-eagle.
//!
//! [`AcceptConfig`] is the only state the sample-and-accept step carries
//! between construction and execution. It has two encodings:
//!
//! - JSON through serde, for config files.
//! - A fixed little-endian byte layout, for embedding into serialized engines:
//!
//! ```text
//! offset  size  field
//! 0       4     format version (u32)
//! 4       4     precision tag  (i32, 0 = f32, 1 = f16)
//! 8       1     greedy flag    (u8, 0 or 1)
//! ```

use std::fmt;
use std::path::Path;

use candle_core::DType;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Version of the binary configuration layout.
pub const SERIALIZATION_VERSION: u32 = 1;

/// Numeric precision of the logits buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit float.
    F32,
    /// 16-bit IEEE half.
    F16,
}

impl Precision {
    /// Tag used in the binary layout.
    pub fn tag(self) -> i32 {
        match self {
            Precision::F32 => 0,
            Precision::F16 => 1,
        }
    }

    /// Inverse of [`Precision::tag`].
    pub fn from_tag(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(Precision::F32),
            1 => Ok(Precision::F16),
            other => Err(Error::UnsupportedPrecision(format!("tag {other}"))),
        }
    }

    /// Map a candle dtype to a supported precision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPrecision`] for anything but F32 and F16.
    pub fn from_dtype(dtype: DType) -> Result<Self> {
        match dtype {
            DType::F32 => Ok(Precision::F32),
            DType::F16 => Ok(Precision::F16),
            other => Err(Error::UnsupportedPrecision(format!("{other:?}"))),
        }
    }

    /// Candle dtype for this precision.
    pub fn dtype(self) -> DType {
        match self {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
        }
    }

    /// Size of one logit in bytes.
    pub fn size_in_bytes(self) -> usize {
        self.dtype().size_in_bytes()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Precision::F32 => "f32",
            Precision::F16 => "f16",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float32" | "float" => Ok(Precision::F32),
            "f16" | "float16" | "half" => Ok(Precision::F16),
            other => Err(Error::UnsupportedPrecision(other.to_string())),
        }
    }
}

/// Configuration for the sample-and-accept step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptConfig {
    /// Precision the logits are expected in.
    pub precision: Precision,
    /// Accept by argmax equality. `false` requests probabilistic acceptance,
    /// which is rejected when the step is constructed.
    pub greedy_sampling: bool,
}

impl Default for AcceptConfig {
    fn default() -> Self {
        Self {
            precision: Precision::F32,
            greedy_sampling: true,
        }
    }
}

impl AcceptConfig {
    /// Create a greedy config for the given precision.
    pub fn new(precision: Precision) -> Self {
        Self {
            precision,
            ..Default::default()
        }
    }

    /// Create a greedy config from a candle dtype.
    pub fn for_dtype(dtype: DType) -> Result<Self> {
        Ok(Self::new(Precision::from_dtype(dtype)?))
    }

    /// Set the precision.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the greedy flag.
    pub fn greedy(mut self, greedy: bool) -> Self {
        self.greedy_sampling = greedy;
        self
    }

    /// Length of the binary encoding.
    pub const fn serialized_size() -> usize {
        std::mem::size_of::<u32>() + std::mem::size_of::<i32>() + std::mem::size_of::<u8>()
    }

    /// Encode into the fixed binary layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::serialized_size());
        buf.extend_from_slice(&SERIALIZATION_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.precision.tag().to_le_bytes());
        buf.push(u8::from(self.greedy_sampling));
        debug_assert_eq!(buf.len(), Self::serialized_size());
        buf
    }

    /// Decode from the fixed binary layout.
    ///
    /// # Errors
    ///
    /// - [`Error::SerializedLength`] if `data` is not exactly
    ///   [`AcceptConfig::serialized_size`] bytes.
    /// - [`Error::VersionMismatch`] if the version field differs.
    /// - [`Error::UnsupportedPrecision`] for an unknown precision tag.
    /// - [`Error::Config`] for a greedy flag other than 0 or 1.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let expected = Self::serialized_size();
        if data.len() != expected {
            return Err(Error::SerializedLength {
                expected,
                actual: data.len(),
            });
        }

        let version = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if version != SERIALIZATION_VERSION {
            return Err(Error::VersionMismatch {
                expected: SERIALIZATION_VERSION,
                actual: version,
            });
        }

        let tag = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let precision = Precision::from_tag(tag)?;

        let greedy_sampling = match data[8] {
            0 => false,
            1 => true,
            other => {
                return Err(Error::Config(format!("invalid greedy flag byte {other}")));
            }
        };

        Ok(Self {
            precision,
            greedy_sampling,
        })
    }

    /// Parse a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Render as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_greedy_f32() {
        let config = AcceptConfig::default();
        assert_eq!(config.precision, Precision::F32);
        assert!(config.greedy_sampling);
    }

    #[test]
    fn test_bytes_layout() {
        let bytes = AcceptConfig::new(Precision::F16).to_bytes();
        assert_eq!(bytes, vec![1, 0, 0, 0, 1, 0, 0, 0, 1]);
    }

    #[test]
    fn test_bf16_is_unsupported() {
        let err = Precision::from_dtype(DType::BF16).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPrecision(_)));
    }

    #[test]
    fn test_parse_precision() {
        assert_eq!("half".parse::<Precision>().unwrap(), Precision::F16);
        assert_eq!("F32".parse::<Precision>().unwrap(), Precision::F32);
        assert!("int8".parse::<Precision>().is_err());
    }
}
