//! Shared types for the unravel reconstruction pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::operation::Operation;
use crate::store::{Artifact, ImageInput, RecordId, StoreError};
use crate::validate::MaskMismatch;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Number of bytes an RGB buffer of these dimensions occupies, or
    /// `None` if it does not fit in `usize`.
    #[must_use]
    pub fn byte_len(self) -> Option<usize> {
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(PixelBuffer::CHANNELS)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors raised when constructing a [`PixelBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The byte count does not equal `width * height * 3`.
    #[error("{dimensions} RGB buffer needs {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Declared dimensions.
        dimensions: Dimensions,
        /// Required byte count.
        expected: usize,
        /// Byte count supplied.
        actual: usize,
    },

    /// The dimensions overflow the addressable byte count.
    #[error("{0} RGB buffer is too large to address")]
    TooLarge(Dimensions),
}

/// An owned RGB image: 3 bytes per pixel, rows top to bottom.
///
/// The invariant `len == width * height * 3` is checked by every
/// constructor, so transforms can work on the flat byte slice without
/// re-validating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    dimensions: Dimensions,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Bytes per pixel (R, G, B).
    pub const CHANNELS: usize = 3;

    /// Wrap raw RGB bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::LengthMismatch`] if `data` is not exactly
    /// `width * height * 3` bytes long, or [`BufferError::TooLarge`] if
    /// that product overflows.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, BufferError> {
        let dimensions = Dimensions { width, height };
        let expected = dimensions
            .byte_len()
            .ok_or(BufferError::TooLarge(dimensions))?;
        if data.len() != expected {
            return Err(BufferError::LengthMismatch {
                dimensions,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dimensions, data })
    }

    /// Build a buffer with the same dimensions as `self` around freshly
    /// computed bytes of equal length.
    pub(crate) fn with_bytes(&self, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), self.data.len(), "transform changed length");
        Self {
            dimensions: self.dimensions,
            data,
        }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// The flattened RGB bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Number of bytes (`width * height * 3`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-area image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-stage checksum data: where the mask lands and what each covered
/// byte must sum to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMaskRecord {
    /// Starting byte index inside the flattened main image.
    pub offset: usize,
    /// Expected `image[offset + k] + mask[k]` for every covered `k`,
    /// without modular reduction (values may exceed 255).
    pub expected: Vec<u32>,
}

impl StageMaskRecord {
    /// Create a record.
    #[must_use]
    pub const fn new(offset: usize, expected: Vec<u32>) -> Self {
        Self { offset, expected }
    }

    /// Number of RGB triples the record covers.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.expected.len() / PixelBuffer::CHANNELS
    }
}

/// The immutable images every stage reads from.
///
/// `distorted` is the seed of the reconstruction: stages borrow it and
/// never take ownership, so it stays valid for the whole run.
#[derive(Debug, Clone)]
pub struct ReferenceImages {
    /// Additive mask (`M.bmp`), usually much smaller than the main image.
    pub mask: PixelBuffer,
    /// XOR operand (`I_M.bmp`).
    pub xor_reference: PixelBuffer,
    /// Final distorted image (`I_D.bmp`).
    pub distorted: PixelBuffer,
    /// Untouched original (`I_O.bmp`), used only for the final cross-check.
    pub original: PixelBuffer,
}

/// Reconstruction configuration.
///
/// There are no defaults: the caller names the data directory and the
/// number of distortion stages it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Directory holding the input images and mask records. Artifacts are
    /// written next to them.
    pub base_path: PathBuf,
    /// Number of distortion stages (`M1.txt` through `M{n}.txt`).
    pub stage_count: usize,
}

impl ReconstructionConfig {
    /// Create a configuration.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>, stage_count: usize) -> Self {
        Self {
            base_path: base_path.into(),
            stage_count,
        }
    }

    /// Check the configuration before any input is touched.
    ///
    /// # Errors
    ///
    /// Returns [`ReconstructionError::InvalidConfig`] if `stage_count` is
    /// zero or `base_path` is empty.
    pub fn validate(&self) -> Result<(), ReconstructionError> {
        if self.stage_count == 0 {
            return Err(ReconstructionError::InvalidConfig(
                "stage_count must be at least 1".to_string(),
            ));
        }
        if self.base_path.as_os_str().is_empty() {
            return Err(ReconstructionError::InvalidConfig(
                "base_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fatal reconstruction failures.
///
/// Any of these halts the run. Artifacts written before the failure
/// stay on disk, but the final output is never written.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    /// Configuration rejected by [`ReconstructionConfig::validate`].
    #[error("invalid reconstruction configuration: {0}")]
    InvalidConfig(String),

    /// A reference image could not be loaded.
    #[error("failed to load {input}: {source}")]
    LoadImage {
        /// Which reference image.
        input: ImageInput,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A mask record could not be loaded.
    #[error("failed to load {record}: {source}")]
    LoadRecord {
        /// Which record.
        record: RecordId,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A reference image does not match the distorted image's size.
    #[error("{input} is {actual}, expected {expected}")]
    DimensionMismatch {
        /// Offending image.
        input: ImageInput,
        /// Dimensions of the distorted image.
        expected: Dimensions,
        /// Dimensions found.
        actual: Dimensions,
    },

    /// A pixel buffer violated its length invariant.
    #[error("invalid pixel buffer: {0}")]
    InvalidBuffer(#[from] BufferError),

    /// No candidate transform validated against the stage's record.
    #[error("no candidate transform validates stage {}", .stage + 1)]
    Classification {
        /// Zero-based stage index.
        stage: usize,
    },

    /// A required artifact could not be written.
    #[error("failed to persist {artifact}: {source}")]
    Persist {
        /// Which artifact.
        artifact: Artifact,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

/// Non-fatal findings collected during a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Warning {
    /// An intermediate reconstruction could not be written.
    IntermediatePersist {
        /// The artifact that was skipped.
        artifact: Artifact,
        /// Store error message.
        message: String,
    },
    /// The ground-truth record (`M0.txt`) could not be loaded, so the
    /// final cross-check was skipped.
    GroundTruthUnavailable {
        /// Store error message.
        message: String,
    },
    /// The untouched original failed the ground-truth mask check.
    FinalValidation(MaskMismatch),
    /// The validated copy of the original could not be written.
    ValidatedCopyPersist {
        /// Store error message.
        message: String,
    },
    /// A stage's mask record covers no bytes of its image, so every
    /// candidate validated and the first one was taken unchecked.
    UncheckedStage {
        /// Zero-based stage index.
        stage: usize,
        /// The operation that was applied.
        operation: Operation,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntermediatePersist { artifact, message } => {
                write!(f, "could not save {artifact}: {message}")
            }
            Self::GroundTruthUnavailable { message } => {
                write!(f, "final validation skipped: {message}")
            }
            Self::FinalValidation(mismatch) => write!(f, "final validation failed: {mismatch}"),
            Self::ValidatedCopyPersist { message } => {
                write!(f, "could not save validated copy: {message}")
            }
            Self::UncheckedStage { stage, operation } => write!(
                f,
                "stage {}: mask record covers no bytes, applied {operation} unchecked",
                stage + 1
            ),
        }
    }
}
