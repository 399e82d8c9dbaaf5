//! The boundary between the pipeline and wherever its inputs and
//! artifacts live.
//!
//! The pipeline never touches the filesystem. It asks an
//! [`ArtifactStore`] for reference images and mask records, and hands it
//! every image it wants persisted. `unravel-io` provides the filesystem
//! implementation; [`crate::memory::MemoryStore`] keeps everything in
//! memory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PixelBuffer, StageMaskRecord};

/// Error type returned by store implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// The reference images a reconstruction reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImageInput {
    /// Additive mask image.
    Mask,
    /// XOR operand.
    XorReference,
    /// Final distorted image, the starting point of the reconstruction.
    Distorted,
    /// Untouched original, used for the final cross-check.
    Original,
}

impl ImageInput {
    /// All inputs in load order.
    pub const ALL: [Self; 4] = [
        Self::Mask,
        Self::XorReference,
        Self::Distorted,
        Self::Original,
    ];
}

impl fmt::Display for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mask => "mask image",
            Self::XorReference => "XOR reference image",
            Self::Distorted => "distorted image",
            Self::Original => "original image",
        };
        f.write_str(name)
    }
}

/// Identifies a mask record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordId {
    /// Record for a zero-based stage index (file number `stage + 1`).
    Stage(usize),
    /// Record validating the untouched original (file number 0).
    GroundTruth,
}

impl RecordId {
    /// The number used in the record's file name (`M{n}.txt`).
    #[must_use]
    pub const fn file_number(self) -> usize {
        match self {
            Self::Stage(stage) => stage + 1,
            Self::GroundTruth => 0,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "mask record for stage {}", stage + 1),
            Self::GroundTruth => f.write_str("ground-truth mask record"),
        }
    }
}

/// Images the pipeline writes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Artifact {
    /// The image entering a stage, written before it is touched.
    Snapshot {
        /// Zero-based stage index.
        stage: usize,
    },
    /// The image recovered by undoing a stage.
    Reconstruction {
        /// Zero-based stage index.
        stage: usize,
    },
    /// The fully recovered image.
    Final,
    /// Copy of the original written once it passes the ground-truth check.
    ValidatedCopy,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot { stage } => write!(f, "snapshot of stage {}", stage + 1),
            Self::Reconstruction { stage } => {
                write!(f, "reconstruction of stage {}", stage + 1)
            }
            Self::Final => f.write_str("final image"),
            Self::ValidatedCopy => f.write_str("validated copy"),
        }
    }
}

/// Source of reconstruction inputs and sink for its artifacts.
pub trait ArtifactStore {
    /// Load one of the reference images.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the image is missing or unreadable.
    fn load_image(&self, input: ImageInput) -> Result<PixelBuffer, StoreError>;

    /// Load a mask record.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the record is missing or malformed.
    fn load_record(&self, record: RecordId) -> Result<StageMaskRecord, StoreError>;

    /// Persist an image artifact. Bytes must be stored losslessly.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the artifact cannot be written.
    fn persist(&self, artifact: Artifact, image: &PixelBuffer) -> Result<(), StoreError>;
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for &S {
    fn load_image(&self, input: ImageInput) -> Result<PixelBuffer, StoreError> {
        (**self).load_image(input)
    }

    fn load_record(&self, record: RecordId) -> Result<StageMaskRecord, StoreError> {
        (**self).load_record(record)
    }

    fn persist(&self, artifact: Artifact, image: &PixelBuffer) -> Result<(), StoreError> {
        (**self).persist(artifact, image)
    }
}
