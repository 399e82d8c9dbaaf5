//! Orchestrator: load every input, undo the stages newest first, then
//! cross-check the untouched original and write the final image.

use std::borrow::Cow;
use std::time::Instant;

use log::{error, info, warn};

use crate::report::{FinalValidation, ReconstructionReport};
use crate::stage::{self, WorkingImage};
use crate::store::{Artifact, ArtifactStore, ImageInput, RecordId};
use crate::transform::add_mask_modular;
use crate::types::{
    PixelBuffer, ReconstructionConfig, ReconstructionError, ReferenceImages, StageMaskRecord,
    Warning,
};
use crate::validate::{self, MaskCheck};

/// A validated reconstruction, ready to run against a store.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    config: ReconstructionConfig,
}

impl Reconstruction {
    /// Accept a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReconstructionError::InvalidConfig`] if the configuration
    /// fails [`ReconstructionConfig::validate`].
    pub fn new(config: ReconstructionConfig) -> Result<Self, ReconstructionError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this run was built from.
    #[must_use]
    pub const fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Run the whole reconstruction.
    ///
    /// 1. Load the four reference images, then every stage record.
    /// 2. Undo stages from the last applied to the first, persisting a
    ///    snapshot before and a reconstruction after each one.
    /// 3. Check the untouched original against the ground-truth record
    ///    and persist a validated copy of it.
    /// 4. Persist the final recovered image.
    ///
    /// Only the first two steps and the final write can fail the run;
    /// everything in step 3 and each intermediate reconstruction write
    /// degrade to a [`Warning`] on the report.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`ReconstructionError`]. Artifacts written
    /// before the failure are left in the store; the final image is not
    /// written.
    pub fn run<S: ArtifactStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<ReconstructionReport, ReconstructionError> {
        let start = Instant::now();
        let stage_count = self.config.stage_count;
        info!("reconstructing {stage_count} stages");

        let refs = load_references(store)?;
        let records = load_records(store, stage_count)?;

        let mut warnings = Vec::new();
        let mut stages = Vec::with_capacity(stage_count);
        let mut current: WorkingImage<'_> = Cow::Borrowed(&refs.distorted);
        for (index, record) in records.iter().enumerate().rev() {
            info!("stage {}: start", index + 1);
            let done = stage::process_stage(index, &refs, record, current, store)
                .inspect_err(|err| error!("stage {}: {err}", index + 1))?;
            let (report, recovered, stage_warnings) = done.into_parts();
            warnings.extend(stage_warnings);
            stages.push(report);
            current = Cow::Owned(recovered);
        }
        let recovered = current.into_owned();

        let final_validation = validate_original(&refs, store, &mut warnings);

        store
            .persist(Artifact::Final, &recovered)
            .map_err(|source| ReconstructionError::Persist {
                artifact: Artifact::Final,
                source,
            })?;
        let matches_original = recovered == refs.original;
        if !matches_original {
            warn!("recovered image differs from the original");
        }

        let report = ReconstructionReport::new(
            stages,
            final_validation,
            matches_original,
            warnings,
            start.elapsed(),
            recovered,
        );
        info!(
            "reconstruction finished in {:.3}ms with {} warnings",
            report.elapsed.as_secs_f64() * 1000.0,
            report.warnings.len(),
        );
        Ok(report)
    }
}

/// Load the four reference images.
///
/// # Errors
///
/// Returns [`ReconstructionError::LoadImage`] for the first image that
/// fails to load, or [`ReconstructionError::DimensionMismatch`] if the
/// XOR reference is not the size of the distorted image.
pub fn load_references<S: ArtifactStore + ?Sized>(
    store: &S,
) -> Result<ReferenceImages, ReconstructionError> {
    let load = |input| {
        store
            .load_image(input)
            .map_err(|source| ReconstructionError::LoadImage { input, source })
    };
    let refs = ReferenceImages {
        mask: load(ImageInput::Mask)?,
        xor_reference: load(ImageInput::XorReference)?,
        distorted: load(ImageInput::Distorted)?,
        original: load(ImageInput::Original)?,
    };
    if refs.xor_reference.dimensions() != refs.distorted.dimensions() {
        return Err(ReconstructionError::DimensionMismatch {
            input: ImageInput::XorReference,
            expected: refs.distorted.dimensions(),
            actual: refs.xor_reference.dimensions(),
        });
    }
    info!(
        "loaded {} image, {} mask",
        refs.distorted.dimensions(),
        refs.mask.dimensions(),
    );
    Ok(refs)
}

/// Load the records for stages `0..stage_count`.
///
/// # Errors
///
/// Returns [`ReconstructionError::LoadRecord`] for the first record that
/// fails to load; records already loaded are dropped.
pub fn load_records<S: ArtifactStore + ?Sized>(
    store: &S,
    stage_count: usize,
) -> Result<Vec<StageMaskRecord>, ReconstructionError> {
    (0..stage_count)
        .map(|stage| {
            let record = RecordId::Stage(stage);
            store
                .load_record(record)
                .map_err(|source| ReconstructionError::LoadRecord { record, source })
        })
        .collect()
}

/// Check `original` against a ground-truth record: the exact mask sums
/// must hold, and adding the mask modulo 256 must produce the sums
/// reduced modulo 256.
pub fn check_ground_truth(
    original: &PixelBuffer,
    mask: &PixelBuffer,
    record: &StageMaskRecord,
) -> MaskCheck {
    match validate::validate_record(original, mask, record) {
        MaskCheck::Valid { .. } => {
            let masked = add_mask_modular(original, mask, record.offset);
            validate::validate_masked(&masked, record)
        }
        invalid @ MaskCheck::Invalid(_) => invalid,
    }
}

/// Run the ground-truth check and persist the validated copy. Every
/// failure here becomes a warning.
fn validate_original<S: ArtifactStore + ?Sized>(
    refs: &ReferenceImages,
    store: &S,
    warnings: &mut Vec<Warning>,
) -> FinalValidation {
    let record = match store.load_record(RecordId::GroundTruth) {
        Ok(record) => record,
        Err(err) => {
            warn!("final validation skipped: {err}");
            warnings.push(Warning::GroundTruthUnavailable {
                message: err.to_string(),
            });
            return FinalValidation::Unavailable;
        }
    };

    match check_ground_truth(&refs.original, &refs.mask, &record) {
        MaskCheck::Valid { covered } => {
            info!("original passes the ground-truth check over {covered} bytes");
            if let Err(err) = store.persist(Artifact::ValidatedCopy, &refs.original) {
                warn!("could not save validated copy: {err}");
                warnings.push(Warning::ValidatedCopyPersist {
                    message: err.to_string(),
                });
            }
            FinalValidation::Passed { covered }
        }
        MaskCheck::Invalid(mismatch) => {
            warn!("final validation failed: {mismatch}");
            warnings.push(Warning::FinalValidation(mismatch));
            FinalValidation::Failed(mismatch)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::operation::{Operation, RotateBits};
    use crate::synth;
    use crate::validate::MaskMismatch;

    fn image(width: u32, height: u32, salt: u8) -> PixelBuffer {
        let len = (width * height * 3) as usize;
        let data = (0..len)
            .map(|i| (i as u8).wrapping_mul(73).wrapping_add(salt))
            .collect();
        PixelBuffer::from_raw(width, height, data).unwrap()
    }

    fn bits(n: u8) -> RotateBits {
        RotateBits::new(n).unwrap()
    }

    fn plan() -> [Operation; 3] {
        [
            Operation::Xor,
            Operation::RotateLeft(bits(3)),
            Operation::RotateRight(bits(2)),
        ]
    }

    fn case() -> synth::SynthCase {
        synth::distort(image(6, 4, 17), image(6, 4, 129), image(3, 1, 41), &plan(), 9).unwrap()
    }

    fn run(store: &MemoryStore, stages: usize) -> Result<ReconstructionReport, ReconstructionError> {
        Reconstruction::new(ReconstructionConfig::new("mem", stages))
            .unwrap()
            .run(store)
    }

    #[test]
    fn three_stage_plan_reconstructs_the_original() {
        let case = case();
        let original = case.references.original.clone();
        let store = MemoryStore::from_case(case);

        let report = run(&store, 3).unwrap();

        assert_eq!(report.recovered(), &original);
        assert!(report.matches_original);
        assert!(report.warnings.is_empty());
        assert!(report.final_validation.passed());
        let detected: Vec<Operation> = report.stages.iter().map(|s| s.operation).collect();
        let expected: Vec<Operation> = plan().iter().rev().map(|op| op.inverse()).collect();
        assert_eq!(detected, expected);
        assert_eq!(report.operations().last(), Some(&Operation::Xor));
        assert_eq!(store.artifact(Artifact::Final), Some(original.clone()));
        assert_eq!(store.artifact(Artifact::ValidatedCopy), Some(original));
        assert_eq!(Some(report.into_recovered()), store.artifact(Artifact::Final));
    }

    #[test]
    fn every_stage_leaves_snapshot_and_reconstruction() {
        let store = MemoryStore::from_case(case());
        run(&store, 3).unwrap();
        for stage in 0..3 {
            assert!(store.artifact(Artifact::Snapshot { stage }).is_some());
            assert!(store.artifact(Artifact::Reconstruction { stage }).is_some());
        }
        // The snapshot entering stage s is what stage s + 1 recovered.
        assert_eq!(
            store.artifact(Artifact::Snapshot { stage: 1 }),
            store.artifact(Artifact::Reconstruction { stage: 2 })
        );
    }

    #[test]
    fn unmatchable_record_halts_the_run() {
        let store = MemoryStore::from_case(case())
            .with_record(RecordId::Stage(1), StageMaskRecord::new(0, vec![999]));

        let err = run(&store, 3).unwrap_err();
        assert!(matches!(err, ReconstructionError::Classification { stage: 1 }));
        // Stage 2 ran, stage 1 was snapshotted, stage 0 never started.
        assert!(store.artifact(Artifact::Reconstruction { stage: 2 }).is_some());
        assert!(store.artifact(Artifact::Snapshot { stage: 1 }).is_some());
        assert!(store.artifact(Artifact::Snapshot { stage: 0 }).is_none());
        assert!(store.artifact(Artifact::Final).is_none());
    }

    #[test]
    fn missing_image_fails_before_any_stage() {
        let case = case();
        let refs = case.references.clone();
        let store = MemoryStore::new()
            .with_image(ImageInput::Mask, refs.mask)
            .with_image(ImageInput::Distorted, refs.distorted)
            .with_image(ImageInput::Original, refs.original);

        let err = run(&store, 3).unwrap_err();
        assert!(matches!(
            err,
            ReconstructionError::LoadImage {
                input: ImageInput::XorReference,
                ..
            }
        ));
        assert!(store.persisted().is_empty());
    }

    #[test]
    fn missing_record_fails_before_any_stage() {
        let store = MemoryStore::from_case(case()).without_record(RecordId::Stage(0));
        let err = run(&store, 3).unwrap_err();
        assert!(matches!(
            err,
            ReconstructionError::LoadRecord {
                record: RecordId::Stage(0),
                ..
            }
        ));
        assert!(store.persisted().is_empty());
    }

    #[test]
    fn mismatched_reference_is_rejected() {
        let case = case();
        let store = MemoryStore::from_case(case).with_image(ImageInput::XorReference, image(2, 2, 0));
        assert!(matches!(
            run(&store, 3),
            Err(ReconstructionError::DimensionMismatch {
                input: ImageInput::XorReference,
                ..
            })
        ));
    }

    #[test]
    fn intermediate_write_failure_is_a_warning() {
        let store =
            MemoryStore::from_case(case()).failing_on(Artifact::Reconstruction { stage: 1 });
        let report = run(&store, 3).unwrap();
        assert!(report.matches_original);
        assert_eq!(report.warnings.len(), 1);
        assert!(!report.stages[1].reconstruction_persisted);
    }

    #[test]
    fn snapshot_write_failure_is_fatal() {
        let store = MemoryStore::from_case(case()).failing_on(Artifact::Snapshot { stage: 2 });
        assert!(matches!(
            run(&store, 3),
            Err(ReconstructionError::Persist {
                artifact: Artifact::Snapshot { stage: 2 },
                ..
            })
        ));
        assert!(store.persisted().is_empty());
    }

    #[test]
    fn final_write_failure_is_fatal() {
        let store = MemoryStore::from_case(case()).failing_on(Artifact::Final);
        assert!(matches!(
            run(&store, 3),
            Err(ReconstructionError::Persist {
                artifact: Artifact::Final,
                ..
            })
        ));
    }

    #[test]
    fn missing_ground_truth_is_a_warning() {
        let store = MemoryStore::from_case(case()).without_record(RecordId::GroundTruth);
        let report = run(&store, 3).unwrap();
        assert_eq!(report.final_validation, FinalValidation::Unavailable);
        assert!(matches!(
            report.warnings.as_slice(),
            [Warning::GroundTruthUnavailable { .. }]
        ));
        assert!(store.artifact(Artifact::ValidatedCopy).is_none());
        assert!(store.artifact(Artifact::Final).is_some());
    }

    #[test]
    fn failed_ground_truth_is_a_warning() {
        let store = MemoryStore::from_case(case())
            .with_record(RecordId::GroundTruth, StageMaskRecord::new(0, vec![700]));
        let report = run(&store, 3).unwrap();
        assert!(matches!(
            report.final_validation,
            FinalValidation::Failed(MaskMismatch::Value { index: 0, .. })
        ));
        assert!(report.matches_original);
        assert!(store.artifact(Artifact::ValidatedCopy).is_none());
    }

    #[test]
    fn validated_copy_failure_is_a_warning() {
        let store = MemoryStore::from_case(case()).failing_on(Artifact::ValidatedCopy);
        let report = run(&store, 3).unwrap();
        assert!(report.final_validation.passed());
        assert!(matches!(
            report.warnings.as_slice(),
            [Warning::ValidatedCopyPersist { .. }]
        ));
    }

    #[test]
    fn empty_stage_record_is_reported() {
        let store = MemoryStore::from_case(case())
            .with_record(RecordId::Stage(0), StageMaskRecord::new(0, Vec::new()));
        let report = run(&store, 1).unwrap();
        assert_eq!(report.stages[0].operation, Operation::Xor);
        assert_eq!(
            report.warnings,
            vec![Warning::UncheckedStage {
                stage: 0,
                operation: Operation::Xor,
            }]
        );
        assert!(!report.matches_original);
    }

    #[test]
    fn zero_stages_is_rejected() {
        assert!(matches!(
            Reconstruction::new(ReconstructionConfig::new("mem", 0)),
            Err(ReconstructionError::InvalidConfig(_))
        ));
    }
}
