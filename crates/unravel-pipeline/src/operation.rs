//! The closed set of reversible operations and their priority order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::transform;
use crate::types::PixelBuffer;

/// A rotation width in bits, always within `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RotateBits(u8);

impl RotateBits {
    /// Smallest rotation.
    pub const MIN: u8 = 1;
    /// Largest rotation (a full byte, equivalent to no rotation).
    pub const MAX: u8 = 8;

    /// Create a rotation width, or `None` if `bits` is outside `1..=8`.
    #[must_use]
    pub const fn new(bits: u8) -> Option<Self> {
        if bits >= Self::MIN && bits <= Self::MAX {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// The width in bits.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Every width from 1 through 8, ascending.
    pub fn all() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).map(Self)
    }
}

/// Error for a rotation width outside `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rotation must be between 1 and 8 bits, got {0}")]
pub struct InvalidRotateBits(pub u8);

impl TryFrom<u8> for RotateBits {
    type Error = InvalidRotateBits;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::new(bits).ok_or(InvalidRotateBits(bits))
    }
}

impl From<RotateBits> for u8 {
    fn from(bits: RotateBits) -> Self {
        bits.0
    }
}

/// A reversible byte-level operation.
///
/// When produced by the classifier, the value names the operation that
/// *undoes* a stage: applying it once to the stage's input yields the
/// stage's predecessor. XOR is its own inverse; a detected
/// `RotateLeft(n)` undoes a forward `RotateRight(n)` and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Byte-wise XOR with the reference image.
    Xor,
    /// Byte-wise circular left rotation.
    RotateLeft(RotateBits),
    /// Byte-wise circular right rotation.
    RotateRight(RotateBits),
}

impl Operation {
    /// Number of candidates the classifier tries: one XOR plus a left and
    /// a right rotation for each of the eight widths.
    pub const CANDIDATE_COUNT: usize = 1 + 2 * RotateBits::MAX as usize;

    /// Candidates in classification priority order.
    ///
    /// XOR first, then for each width from 1 to 8 a left rotation followed
    /// by a right rotation. The order decides which operation is reported
    /// when more than one validates. On a byte, a left rotation by `n` is
    /// a right rotation by `8 - n`, so only the first of each such pair
    /// can ever be reported.
    pub fn candidates() -> impl Iterator<Item = Self> {
        std::iter::once(Self::Xor).chain(
            RotateBits::all().flat_map(|bits| [Self::RotateLeft(bits), Self::RotateRight(bits)]),
        )
    }

    /// Apply the operation, returning a new buffer.
    ///
    /// Returns `None` only for [`Operation::Xor`] when `xor_reference`
    /// differs in length from `image`.
    #[must_use = "returns the transformed buffer"]
    pub fn apply(self, image: &PixelBuffer, xor_reference: &PixelBuffer) -> Option<PixelBuffer> {
        match self {
            Self::Xor => transform::xor_buffers(image, xor_reference),
            Self::RotateLeft(bits) => Some(transform::rotate_left(image, bits)),
            Self::RotateRight(bits) => Some(transform::rotate_right(image, bits)),
        }
    }

    /// The operation that reverses this one.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Xor => Self::Xor,
            Self::RotateLeft(bits) => Self::RotateRight(bits),
            Self::RotateRight(bits) => Self::RotateLeft(bits),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xor => f.write_str("XOR with reference"),
            Self::RotateLeft(bits) => write!(f, "rotate left {} bits", bits.get()),
            Self::RotateRight(bits) => write!(f, "rotate right {} bits", bits.get()),
        }
    }
}

/// Error parsing an [`Operation`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseOperationError {
    /// Not `xor`, `rotl:N` or `rotr:N`.
    #[error("unknown operation '{0}' (expected xor, rotl:N or rotr:N)")]
    Unknown(String),
    /// The bit count is not a number.
    #[error("invalid rotation width '{0}'")]
    InvalidNumber(String),
    /// The bit count is outside `1..=8`.
    #[error(transparent)]
    OutOfRange(#[from] InvalidRotateBits),
}

impl FromStr for Operation {
    type Err = ParseOperationError;

    /// Parse `xor`, `rotl:N` or `rotr:N` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "xor" {
            return Ok(Self::Xor);
        }
        let (kind, width) = lower
            .split_once(':')
            .ok_or_else(|| ParseOperationError::Unknown(s.to_string()))?;
        let width: u8 = width
            .parse()
            .map_err(|_| ParseOperationError::InvalidNumber(width.to_string()))?;
        let bits = RotateBits::try_from(width)?;
        match kind {
            "rotl" => Ok(Self::RotateLeft(bits)),
            "rotr" => Ok(Self::RotateRight(bits)),
            _ => Err(ParseOperationError::Unknown(s.to_string())),
        }
    }
}
