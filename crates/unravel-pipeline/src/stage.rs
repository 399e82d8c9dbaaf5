//! Stage processor: undo one distortion stage, one step at a time.
//!
//! A stage moves through `Snapshot -> Classify -> Invert -> Persist ->
//! Done`. Each state is its own type; every transition consumes `self`
//! and returns the next state, or a [`ReconstructionError`] for the
//! fallible ones:
//!
//! ```rust
//! # use std::borrow::Cow;
//! # use unravel_pipeline::{ArtifactStore, ReconstructionError, ReferenceImages, StageMaskRecord};
//! # use unravel_pipeline::stage::Snapshot;
//! # fn run(store: &dyn ArtifactStore, refs: &ReferenceImages, record: &StageMaskRecord)
//! #     -> Result<(), ReconstructionError> {
//! let done = Snapshot::new(2, refs, record, Cow::Borrowed(&refs.distorted))
//!     .snapshot(store)?
//!     .classify()?
//!     .invert()?
//!     .persist(store);
//! println!("stage 3 was undone with {}", done.operation());
//! # Ok(())
//! # }
//! ```
//!
//! # Ownership
//!
//! The image entering a stage is a [`WorkingImage`]. The orchestrator
//! starts with `Cow::Borrowed(&refs.distorted)`: the distorted input
//! belongs to the [`ReferenceImages`] for the whole run and is never
//! released by a stage. Every later stage receives `Cow::Owned`, the
//! buffer recovered by the stage before it, and drops it as soon as its
//! own inverse has been computed.

use std::borrow::Cow;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::classify;
use crate::validate;
use crate::operation::Operation;
use crate::store::{Artifact, ArtifactStore, ImageInput};
use crate::types::{PixelBuffer, ReconstructionError, ReferenceImages, StageMaskRecord, Warning};

/// The image a stage works on: borrowed when it is the distorted input,
/// owned when it was recovered by an earlier stage.
pub type WorkingImage<'a> = Cow<'a, PixelBuffer>;

/// What one stage did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Zero-based stage index.
    pub stage: usize,
    /// The inverse operation that was applied.
    pub operation: Operation,
    /// Priority rank of `operation` among the candidates (1-based).
    pub candidates_tried: usize,
    /// Whether the reconstruction artifact was written.
    pub reconstruction_persisted: bool,
}

// ───────────────────────── Snapshot ──────────────────────────

/// Stage state before anything has happened.
///
/// Call [`snapshot`](Self::snapshot) to persist the incoming image.
#[must_use = "stage states are consumed by advancing; call .snapshot() to continue"]
pub struct Snapshot<'a> {
    stage: usize,
    refs: &'a ReferenceImages,
    record: &'a StageMaskRecord,
    current: WorkingImage<'a>,
}

impl<'a> Snapshot<'a> {
    /// Start processing zero-based `stage` on `current`.
    pub const fn new(
        stage: usize,
        refs: &'a ReferenceImages,
        record: &'a StageMaskRecord,
        current: WorkingImage<'a>,
    ) -> Self {
        Self {
            stage,
            refs,
            record,
            current,
        }
    }

    /// The image entering this stage.
    #[must_use]
    pub fn current(&self) -> &PixelBuffer {
        &self.current
    }

    /// Persist the incoming image and advance to [`Classify`].
    ///
    /// # Errors
    ///
    /// Returns [`ReconstructionError::Persist`] if the snapshot cannot be
    /// written; a stage never mutates an image that was not saved first.
    pub fn snapshot<S: ArtifactStore + ?Sized>(
        self,
        store: &S,
    ) -> Result<Classify<'a>, ReconstructionError> {
        let artifact = Artifact::Snapshot { stage: self.stage };
        store
            .persist(artifact, &self.current)
            .map_err(|source| ReconstructionError::Persist { artifact, source })?;
        debug!("saved {artifact}");
        Ok(Classify {
            stage: self.stage,
            refs: self.refs,
            record: self.record,
            current: self.current,
        })
    }
}

// ───────────────────────── Classify ──────────────────────────

/// Stage state after the snapshot was written.
///
/// Call [`classify`](Self::classify) to find the inverse operation.
#[must_use = "stage states are consumed by advancing; call .classify() to continue"]
pub struct Classify<'a> {
    stage: usize,
    refs: &'a ReferenceImages,
    record: &'a StageMaskRecord,
    current: WorkingImage<'a>,
}

impl<'a> Classify<'a> {
    /// Find the inverse operation and advance to [`Invert`].
    ///
    /// # Errors
    ///
    /// Returns [`ReconstructionError::Classification`] if no candidate
    /// validates against the stage's mask record.
    pub fn classify(self) -> Result<Invert<'a>, ReconstructionError> {
        #[cfg(feature = "parallel")]
        let result = classify::classify_parallel(
            &self.current,
            &self.refs.xor_reference,
            &self.refs.mask,
            self.record,
        );
        #[cfg(not(feature = "parallel"))]
        let result = classify::classify(
            &self.current,
            &self.refs.xor_reference,
            &self.refs.mask,
            self.record,
        );

        let operation = result
            .operation
            .ok_or(ReconstructionError::Classification { stage: self.stage })?;
        info!(
            "stage {}: detected {operation} (candidate {} of {})",
            self.stage + 1,
            result.candidates_tried,
            Operation::CANDIDATE_COUNT,
        );

        let mut warnings = Vec::new();
        let covered = validate::covered_len(
            self.current.len(),
            self.record.expected.len(),
            self.record.offset,
        );
        if covered == 0 {
            let warning = Warning::UncheckedStage {
                stage: self.stage,
                operation,
            };
            warn!("{warning}");
            warnings.push(warning);
        }

        Ok(Invert {
            stage: self.stage,
            refs: self.refs,
            current: self.current,
            operation,
            candidates_tried: result.candidates_tried,
            warnings,
        })
    }
}

// ───────────────────────── Invert ──────────────────────────

/// Stage state once the inverse operation is known.
///
/// Call [`invert`](Self::invert) to apply it.
#[must_use = "stage states are consumed by advancing; call .invert() to continue"]
pub struct Invert<'a> {
    stage: usize,
    refs: &'a ReferenceImages,
    current: WorkingImage<'a>,
    operation: Operation,
    candidates_tried: usize,
    warnings: Vec<Warning>,
}

impl Invert<'_> {
    /// The detected inverse operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Apply the inverse and advance to [`Persist`].
    ///
    /// The detected operation already names the reversing transform, so
    /// it is applied exactly once. The incoming image is released here
    /// unless it is the borrowed distorted input.
    ///
    /// # Errors
    ///
    /// Returns [`ReconstructionError::DimensionMismatch`] if the XOR
    /// reference does not match the image size.
    pub fn invert(self) -> Result<Persist, ReconstructionError> {
        let recovered = self
            .operation
            .apply(&self.current, &self.refs.xor_reference)
            .ok_or_else(|| ReconstructionError::DimensionMismatch {
                input: ImageInput::XorReference,
                expected: self.current.dimensions(),
                actual: self.refs.xor_reference.dimensions(),
            })?;
        drop(self.current);
        Ok(Persist {
            stage: self.stage,
            recovered,
            operation: self.operation,
            candidates_tried: self.candidates_tried,
            warnings: self.warnings,
        })
    }
}

// ───────────────────────── Persist ──────────────────────────

/// Stage state holding the recovered image.
///
/// Call [`persist`](Self::persist) to write it out and finish the stage.
#[must_use = "stage states are consumed by advancing; call .persist() to continue"]
pub struct Persist {
    stage: usize,
    recovered: PixelBuffer,
    operation: Operation,
    candidates_tried: usize,
    warnings: Vec<Warning>,
}

impl Persist {
    /// The image recovered by this stage.
    #[must_use]
    pub const fn recovered(&self) -> &PixelBuffer {
        &self.recovered
    }

    /// Write the recovered image and finish the stage.
    ///
    /// A write failure is not fatal: the recovered image in memory is
    /// still correct, so the failure is returned as a [`Warning`] on the
    /// [`Done`] state instead.
    pub fn persist<S: ArtifactStore + ?Sized>(mut self, store: &S) -> Done {
        let artifact = Artifact::Reconstruction { stage: self.stage };
        let persisted = match store.persist(artifact, &self.recovered) {
            Ok(()) => {
                debug!("saved {artifact}");
                true
            }
            Err(err) => {
                warn!("could not save {artifact}: {err}");
                self.warnings.push(Warning::IntermediatePersist {
                    artifact,
                    message: err.to_string(),
                });
                false
            }
        };
        Done {
            report: StageReport {
                stage: self.stage,
                operation: self.operation,
                candidates_tried: self.candidates_tried,
                reconstruction_persisted: persisted,
            },
            recovered: self.recovered,
            warnings: self.warnings,
        }
    }
}

// ───────────────────────── Done ──────────────────────────

/// A finished stage.
#[must_use = "call .into_parts() to take the recovered image"]
pub struct Done {
    report: StageReport,
    recovered: PixelBuffer,
    warnings: Vec<Warning>,
}

impl Done {
    /// The inverse operation that was applied.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.report.operation
    }

    /// The image recovered by this stage.
    #[must_use]
    pub const fn recovered(&self) -> &PixelBuffer {
        &self.recovered
    }

    /// The stage's report.
    #[must_use]
    pub const fn report(&self) -> &StageReport {
        &self.report
    }

    /// Non-fatal findings raised while the stage ran.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Split into the report, the recovered image and the warnings.
    #[must_use]
    pub fn into_parts(self) -> (StageReport, PixelBuffer, Vec<Warning>) {
        (self.report, self.recovered, self.warnings)
    }
}

/// Run one stage from [`Snapshot`] to [`Done`].
///
/// # Errors
///
/// Returns [`ReconstructionError::Persist`] if the snapshot cannot be
/// written and [`ReconstructionError::Classification`] if no candidate
/// validates.
pub fn process_stage<'a, S: ArtifactStore + ?Sized>(
    stage: usize,
    refs: &'a ReferenceImages,
    record: &'a StageMaskRecord,
    current: WorkingImage<'a>,
    store: &S,
) -> Result<Done, ReconstructionError> {
    Ok(Snapshot::new(stage, refs, record, current)
        .snapshot(store)?
        .classify()?
        .invert()?
        .persist(store))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::operation::RotateBits;

    fn row(bytes: Vec<u8>) -> PixelBuffer {
        let width = u32::try_from(bytes.len() / PixelBuffer::CHANNELS).unwrap();
        PixelBuffer::from_raw(width, 1, bytes).unwrap()
    }

    fn refs(distorted: Vec<u8>) -> ReferenceImages {
        let len = distorted.len();
        ReferenceImages {
            mask: row(vec![5, 5, 5]),
            xor_reference: row(vec![1; len]),
            distorted: row(distorted),
            original: row(vec![0; len]),
        }
    }

    #[test]
    fn xor_stage_runs_to_done() {
        let refs = refs(vec![10, 20, 30, 40, 50, 60]);
        let record = StageMaskRecord::new(0, vec![16, 26, 36]);
        let store = MemoryStore::new();

        let done = process_stage(0, &refs, &record, Cow::Borrowed(&refs.distorted), &store)
            .unwrap();

        assert_eq!(done.operation(), Operation::Xor);
        assert_eq!(done.recovered().as_bytes(), &[11, 21, 31, 41, 51, 61]);
        assert!(done.warnings().is_empty());
        assert_eq!(
            store.artifact(Artifact::Snapshot { stage: 0 }),
            Some(refs.distorted.clone())
        );
        assert_eq!(
            store.artifact(Artifact::Reconstruction { stage: 0 }).as_ref(),
            Some(done.recovered())
        );
    }

    #[test]
    fn snapshot_failure_is_fatal() {
        let refs = refs(vec![10, 20, 30, 40, 50, 60]);
        let record = StageMaskRecord::new(0, vec![16, 26, 36]);
        let store = MemoryStore::new().failing_on(Artifact::Snapshot { stage: 3 });

        let result = process_stage(3, &refs, &record, Cow::Borrowed(&refs.distorted), &store);
        assert!(matches!(
            result,
            Err(ReconstructionError::Persist {
                artifact: Artifact::Snapshot { stage: 3 },
                ..
            })
        ));
        assert!(store.artifact(Artifact::Reconstruction { stage: 3 }).is_none());
    }

    #[test]
    fn reconstruction_persist_failure_is_a_warning() {
        let refs = refs(vec![10, 20, 30, 40, 50, 60]);
        let record = StageMaskRecord::new(0, vec![16, 26, 36]);
        let store = MemoryStore::new().failing_on(Artifact::Reconstruction { stage: 1 });

        let done = process_stage(1, &refs, &record, Cow::Borrowed(&refs.distorted), &store)
            .unwrap();
        assert!(matches!(
            done.warnings(),
            [Warning::IntermediatePersist {
                artifact: Artifact::Reconstruction { stage: 1 },
                ..
            }]
        ));
        assert!(!done.report().reconstruction_persisted);
        assert_eq!(done.recovered().as_bytes(), &[11, 21, 31, 41, 51, 61]);
    }

    #[test]
    fn record_covering_nothing_is_flagged() {
        let refs = refs(vec![10, 20, 30, 40, 50, 60]);
        let store = MemoryStore::new();
        for record in [
            StageMaskRecord::new(0, Vec::new()),
            StageMaskRecord::new(6, vec![16, 26, 36]),
        ] {
            let done = process_stage(2, &refs, &record, Cow::Borrowed(&refs.distorted), &store)
                .unwrap();
            assert_eq!(done.operation(), Operation::Xor);
            assert_eq!(
                done.warnings(),
                [Warning::UncheckedStage {
                    stage: 2,
                    operation: Operation::Xor,
                }]
            );
        }
    }

    #[test]
    fn partially_covered_record_is_not_flagged() {
        let refs = refs(vec![10, 20, 30, 40, 50, 60]);
        let record = StageMaskRecord::new(5, vec![66, 0, 0]);
        let store = MemoryStore::new();

        let done = process_stage(0, &refs, &record, Cow::Borrowed(&refs.distorted), &store)
            .unwrap();
        assert_eq!(done.operation(), Operation::Xor);
        assert!(done.warnings().is_empty());
    }

    #[test]
    fn unknown_operation_fails_after_snapshot() {
        let refs = refs(vec![10, 20, 30, 40, 50, 60]);
        let record = StageMaskRecord::new(0, vec![600, 0, 0]);
        let store = MemoryStore::new();

        let classify = Snapshot::new(4, &refs, &record, Cow::Borrowed(&refs.distorted))
            .snapshot(&store)
            .unwrap();
        assert!(store.artifact(Artifact::Snapshot { stage: 4 }).is_some());
        assert!(matches!(
            classify.classify(),
            Err(ReconstructionError::Classification { stage: 4 })
        ));
    }

    #[test]
    fn owned_input_is_consumed() {
        let refs = refs(vec![0x13, 0x2C, 0x4B, 0x71, 0x86, 0xD2]);
        let bits = RotateBits::new(2).unwrap();
        let previous = Operation::RotateRight(bits)
            .apply(&refs.distorted, &refs.xor_reference)
            .unwrap();
        let expected: Vec<u32> = refs.distorted.as_bytes()[..3]
            .iter()
            .map(|b| u32::from(*b) + 5)
            .collect();
        let record = StageMaskRecord::new(0, expected);
        let store = MemoryStore::new();

        let invert = Snapshot::new(0, &refs, &record, Cow::Owned(previous))
            .snapshot(&store)
            .unwrap()
            .classify()
            .unwrap();
        assert_eq!(invert.operation(), Operation::RotateLeft(bits));
        let persist = invert.invert().unwrap();
        assert_eq!(persist.recovered(), &refs.distorted);
    }
}
