//! unravel-io: Filesystem I/O for the unravel pipeline.
//!
//! Decodes and encodes BMP images, reads and writes mask-record text
//! files, and provides [`FsStore`], the [`ArtifactStore`] that maps the
//! pipeline's inputs and artifacts onto a data-set directory.
//!
//! [`ArtifactStore`]: unravel_pipeline::ArtifactStore

pub mod codec;
pub mod mask_file;
pub mod store;

use std::path::{Path, PathBuf};

use unravel_pipeline::synth::SynthCase;
use unravel_pipeline::{
    BufferError, ImageInput, ReconstructionConfig, ReconstructionError, ReconstructionReport,
    RecordId,
};

pub use mask_file::MaskFileError;
pub use store::FsStore;

/// Errors from file-level operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Image decode, encode or file access failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Plain file or directory access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A mask-record file is malformed.
    #[error("{}: {source}", path.display())]
    MaskFile {
        /// The file that failed to parse.
        path: PathBuf,
        /// What was wrong with it.
        #[source]
        source: MaskFileError,
    },

    /// Decoded pixels did not form a valid buffer.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Reconstruct the data set in `config.base_path`, writing every
/// artifact next to the inputs.
///
/// # Errors
///
/// Returns the first fatal [`ReconstructionError`].
pub fn reconstruct(config: ReconstructionConfig) -> Result<ReconstructionReport, ReconstructionError> {
    let store = FsStore::new(config.base_path.clone());
    unravel_pipeline::reconstruct(config, &store)
}

/// Write a synthetic case into `dir` as a complete data set: the four
/// reference images, `M1.txt` through `M{n}.txt`, and `M0.txt`.
///
/// # Errors
///
/// Returns [`IoError`] if the directory cannot be created or any file
/// cannot be written.
pub fn write_case(dir: &Path, case: &SynthCase) -> Result<(), IoError> {
    std::fs::create_dir_all(dir)?;
    let store = FsStore::new(dir);

    let refs = &case.references;
    for (input, image) in [
        (ImageInput::Mask, &refs.mask),
        (ImageInput::XorReference, &refs.xor_reference),
        (ImageInput::Distorted, &refs.distorted),
        (ImageInput::Original, &refs.original),
    ] {
        codec::encode(image, &store.input_path(input))?;
    }

    for (stage, record) in case.records.iter().enumerate() {
        mask_file::save_mask_record(record, &store.record_path(RecordId::Stage(stage)))?;
    }
    mask_file::save_mask_record(&case.ground_truth, &store.record_path(RecordId::GroundTruth))?;

    log::info!(
        "wrote {}-stage data set to {}",
        case.records.len(),
        dir.display()
    );
    Ok(())
}
