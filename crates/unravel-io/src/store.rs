//! [`ArtifactStore`] backed by a data-set directory.
//!
//! File names follow the layout existing data sets use:
//!
//! | item | file |
//! |---|---|
//! | mask image | `M.bmp` |
//! | XOR reference | `I_M.bmp` |
//! | distorted image | `I_D.bmp` |
//! | original image | `I_O.bmp` |
//! | record `n` | `M{n}.txt` (`M0.txt` is the ground truth) |
//! | snapshot entering stage `s` | `P{s+1}.bmp` |
//! | reconstruction of stage `s` | `P{s}_reconstruida.bmp` |
//! | final image | `I_0Reconstruida.bmp` |
//! | validated copy | `I_OReconstruida.bmp` |
//!
//! Stages are zero-based in the pipeline. The final image uses the digit
//! zero and the validated copy the letter O.

use std::path::{Path, PathBuf};

use unravel_pipeline::{
    Artifact, ArtifactStore, ImageInput, PixelBuffer, RecordId, StageMaskRecord, StoreError,
};

use crate::{codec, mask_file};

/// File name of a reference image.
#[must_use]
pub const fn input_file_name(input: ImageInput) -> &'static str {
    match input {
        ImageInput::Mask => "M.bmp",
        ImageInput::XorReference => "I_M.bmp",
        ImageInput::Distorted => "I_D.bmp",
        ImageInput::Original => "I_O.bmp",
    }
}

/// File name of a mask record.
#[must_use]
pub fn record_file_name(record: RecordId) -> String {
    format!("M{}.txt", record.file_number())
}

/// File name of an artifact.
#[must_use]
pub fn artifact_file_name(artifact: Artifact) -> String {
    match artifact {
        Artifact::Snapshot { stage } => format!("P{}.bmp", stage + 1),
        Artifact::Reconstruction { stage } => format!("P{stage}_reconstruida.bmp"),
        Artifact::Final => "I_0Reconstruida.bmp".to_string(),
        Artifact::ValidatedCopy => "I_OReconstruida.bmp".to_string(),
    }
}

/// Reads inputs from, and writes artifacts into, one directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// A store rooted at `root`. Nothing is touched until the pipeline
    /// asks for it.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data-set directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a reference image.
    #[must_use]
    pub fn input_path(&self, input: ImageInput) -> PathBuf {
        self.root.join(input_file_name(input))
    }

    /// Full path of a mask record.
    #[must_use]
    pub fn record_path(&self, record: RecordId) -> PathBuf {
        self.root.join(record_file_name(record))
    }

    /// Full path of an artifact.
    #[must_use]
    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(artifact_file_name(artifact))
    }
}

impl ArtifactStore for FsStore {
    fn load_image(&self, input: ImageInput) -> Result<PixelBuffer, StoreError> {
        Ok(codec::decode(&self.input_path(input))?)
    }

    fn load_record(&self, record: RecordId) -> Result<StageMaskRecord, StoreError> {
        Ok(mask_file::load_mask_record(&self.record_path(record))?)
    }

    fn persist(&self, artifact: Artifact, image: &PixelBuffer) -> Result<(), StoreError> {
        Ok(codec::encode(image, &self.artifact_path(artifact))?)
    }
}
