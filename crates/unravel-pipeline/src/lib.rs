//! unravel-pipeline: Pure reconstruction pipeline (sans-IO).
//!
//! Recovers an image that went through a chain of XOR and per-byte
//! bit-rotation stages. Which transform each stage used is not recorded;
//! it is inferred by trying every candidate inverse and checking the
//! result against that stage's mask-sum record:
//! load -> (snapshot -> classify -> invert -> persist) per stage ->
//! ground-truth check -> final image.
//!
//! This crate has **no I/O dependencies** -- images and records come
//! from an [`ArtifactStore`] and artifacts go back to it. The filesystem
//! store and BMP codec live in `unravel-io`.

pub mod classify;
pub mod memory;
pub mod operation;
pub mod pipeline;
pub mod report;
pub mod stage;
pub mod store;
pub mod synth;
pub mod transform;
pub mod types;
pub mod validate;

pub use classify::{Classification, classify};
pub use memory::MemoryStore;
pub use operation::{Operation, RotateBits};
pub use pipeline::Reconstruction;
pub use report::{FinalValidation, ReconstructionReport};
pub use stage::StageReport;
pub use store::{Artifact, ArtifactStore, ImageInput, RecordId, StoreError};
pub use types::{
    BufferError, Dimensions, PixelBuffer, ReconstructionConfig, ReconstructionError,
    ReferenceImages, StageMaskRecord, Warning,
};
pub use validate::{MaskCheck, MaskMismatch};

/// Run a full reconstruction against `store`.
///
/// Shorthand for [`Reconstruction::new`] followed by
/// [`Reconstruction::run`].
///
/// # Errors
///
/// Returns [`ReconstructionError::InvalidConfig`] for a rejected
/// configuration, or the first fatal error raised while loading inputs,
/// undoing a stage or writing the final image.
pub fn reconstruct<S: ArtifactStore + ?Sized>(
    config: ReconstructionConfig,
    store: &S,
) -> Result<ReconstructionReport, ReconstructionError> {
    Reconstruction::new(config)?.run(store)
}
