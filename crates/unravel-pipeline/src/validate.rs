//! Mask-sum validation: the oracle that tells a correct inverse from a
//! wrong one.
//!
//! Each stage ships a table of expected values `image[offset + k] +
//! mask[k]`, computed on the image *before* that stage's distortion. A
//! candidate inverse is correct exactly when its output reproduces every
//! value in the table. The sums are compared without modular reduction,
//! so a value of 300 can only be matched by a byte pair summing to 300.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PixelBuffer, StageMaskRecord};

/// Why a candidate failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskMismatch {
    /// A covered byte summed to the wrong value.
    Value {
        /// Index into the expected table (not into the image).
        index: usize,
        /// Value from the table.
        expected: u32,
        /// `candidate[offset + index] + mask[index]`.
        actual: u32,
    },
    /// The mask has fewer bytes than the window it must cover.
    MaskTooShort {
        /// Mask length in bytes.
        mask_len: usize,
        /// Covered window length in bytes.
        required: usize,
    },
    /// The XOR reference is not the size of the candidate, so the XOR
    /// candidate could not be computed.
    ReferenceLength {
        /// Candidate length in bytes.
        expected: usize,
        /// Reference length in bytes.
        actual: usize,
    },
}

impl fmt::Display for MaskMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value {
                index,
                expected,
                actual,
            } => write!(f, "position {index}: expected {expected}, got {actual}"),
            Self::MaskTooShort { mask_len, required } => {
                write!(f, "mask has {mask_len} bytes but {required} are covered")
            }
            Self::ReferenceLength { expected, actual } => {
                write!(f, "reference has {actual} bytes, image has {expected}")
            }
        }
    }
}

/// Outcome of a mask-sum check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum MaskCheck {
    /// Every covered byte matched.
    Valid {
        /// Number of bytes compared.
        covered: usize,
    },
    /// The first failing position.
    Invalid(MaskMismatch),
}

impl MaskCheck {
    /// Returns `true` if every covered byte matched.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The mismatch, if validation failed.
    #[must_use]
    pub const fn mismatch(&self) -> Option<&MaskMismatch> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid(mismatch) => Some(mismatch),
        }
    }
}

/// Number of table entries that land inside an image of `image_len`
/// bytes when placed at `offset`.
pub(crate) fn covered_len(image_len: usize, expected_len: usize, offset: usize) -> usize {
    expected_len.min(image_len.saturating_sub(offset))
}

/// Check `candidate[offset + k] + mask[k] == expected[k]` for every `k`
/// whose position falls inside the candidate.
///
/// Entries past the end of the candidate are ignored, so an offset past
/// the end validates vacuously.
pub fn validate_mask_sum(
    candidate: &PixelBuffer,
    mask: &PixelBuffer,
    expected: &[u32],
    offset: usize,
) -> MaskCheck {
    let covered = covered_len(candidate.len(), expected.len(), offset);
    if mask.len() < covered {
        return MaskCheck::Invalid(MaskMismatch::MaskTooShort {
            mask_len: mask.len(),
            required: covered,
        });
    }

    let window = candidate.as_bytes().iter().skip(offset);
    for (index, ((byte, m), want)) in window.zip(mask.as_bytes()).zip(expected).enumerate() {
        let actual = u32::from(*byte) + u32::from(*m);
        if actual != *want {
            return MaskCheck::Invalid(MaskMismatch::Value {
                index,
                expected: *want,
                actual,
            });
        }
    }
    MaskCheck::Valid { covered }
}

/// [`validate_mask_sum`] against a stage record.
pub fn validate_record(
    candidate: &PixelBuffer,
    mask: &PixelBuffer,
    record: &StageMaskRecord,
) -> MaskCheck {
    validate_mask_sum(candidate, mask, &record.expected, record.offset)
}

/// Check an image that already had the mask added modulo 256 (see
/// [`crate::transform::add_mask_modular`]) against a record: every
/// covered byte must equal its expected sum reduced modulo 256.
pub fn validate_masked(masked: &PixelBuffer, record: &StageMaskRecord) -> MaskCheck {
    let covered = covered_len(masked.len(), record.expected.len(), record.offset);
    let window = masked.as_bytes().iter().skip(record.offset);
    for (index, (byte, want)) in window.zip(&record.expected).enumerate() {
        if u32::from(*byte) != want % 256 {
            return MaskCheck::Invalid(MaskMismatch::Value {
                index,
                expected: want % 256,
                actual: u32::from(*byte),
            });
        }
    }
    MaskCheck::Valid { covered }
}
