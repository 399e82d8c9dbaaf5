//! In-memory [`ArtifactStore`] for tests and embedding.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::store::{Artifact, ArtifactStore, ImageInput, RecordId, StoreError};
use crate::synth::SynthCase;
use crate::types::{PixelBuffer, ReferenceImages, StageMaskRecord};

/// Error returned by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryStoreError {
    /// No image was registered for the input.
    #[error("no {0} in store")]
    MissingImage(ImageInput),
    /// No record was registered under the id.
    #[error("no {0} in store")]
    MissingRecord(RecordId),
    /// The artifact was configured to fail.
    #[error("write of {0} rejected")]
    Rejected(Artifact),
}

/// Keeps inputs and persisted artifacts in ordered maps.
///
/// Persisting takes `&self`, so artifacts live behind a [`RefCell`]; the
/// store is single-threaded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    images: BTreeMap<ImageInput, PixelBuffer>,
    records: BTreeMap<RecordId, StageMaskRecord>,
    failing: BTreeSet<Artifact>,
    artifacts: RefCell<BTreeMap<Artifact, PixelBuffer>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with the four reference images.
    #[must_use]
    pub fn with_references(refs: ReferenceImages) -> Self {
        Self::new()
            .with_image(ImageInput::Mask, refs.mask)
            .with_image(ImageInput::XorReference, refs.xor_reference)
            .with_image(ImageInput::Distorted, refs.distorted)
            .with_image(ImageInput::Original, refs.original)
    }

    /// A store preloaded with a synthetic case: its images, one record
    /// per stage and the ground-truth record.
    #[must_use]
    pub fn from_case(case: SynthCase) -> Self {
        let SynthCase {
            references,
            records,
            ground_truth,
        } = case;
        let store = records.into_iter().enumerate().fold(
            Self::with_references(references),
            |store, (stage, record)| store.with_record(RecordId::Stage(stage), record),
        );
        store.with_record(RecordId::GroundTruth, ground_truth)
    }

    /// Register a reference image.
    #[must_use]
    pub fn with_image(mut self, input: ImageInput, image: PixelBuffer) -> Self {
        self.images.insert(input, image);
        self
    }

    /// Register a mask record.
    #[must_use]
    pub fn with_record(mut self, id: RecordId, record: StageMaskRecord) -> Self {
        self.records.insert(id, record);
        self
    }

    /// Remove a record, so loading it fails.
    #[must_use]
    pub fn without_record(mut self, id: RecordId) -> Self {
        self.records.remove(&id);
        self
    }

    /// Make every write of `artifact` fail.
    #[must_use]
    pub fn failing_on(mut self, artifact: Artifact) -> Self {
        self.failing.insert(artifact);
        self
    }

    /// A persisted artifact, if it was written.
    #[must_use]
    pub fn artifact(&self, artifact: Artifact) -> Option<PixelBuffer> {
        self.artifacts.borrow().get(&artifact).cloned()
    }

    /// Every artifact written so far, in [`Artifact`] order.
    #[must_use]
    pub fn persisted(&self) -> Vec<Artifact> {
        self.artifacts.borrow().keys().copied().collect()
    }
}

impl ArtifactStore for MemoryStore {
    fn load_image(&self, input: ImageInput) -> Result<PixelBuffer, StoreError> {
        self.images
            .get(&input)
            .cloned()
            .ok_or_else(|| MemoryStoreError::MissingImage(input).into())
    }

    fn load_record(&self, record: RecordId) -> Result<StageMaskRecord, StoreError> {
        self.records
            .get(&record)
            .cloned()
            .ok_or_else(|| MemoryStoreError::MissingRecord(record).into())
    }

    fn persist(&self, artifact: Artifact, image: &PixelBuffer) -> Result<(), StoreError> {
        if self.failing.contains(&artifact) {
            return Err(MemoryStoreError::Rejected(artifact).into());
        }
        self.artifacts.borrow_mut().insert(artifact, image.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pixel(value: u8) -> PixelBuffer {
        PixelBuffer::from_raw(1, 1, vec![value; 3]).unwrap()
    }

    #[test]
    fn missing_inputs_are_errors() {
        let store = MemoryStore::new();
        let err = store.load_image(ImageInput::Mask).unwrap_err();
        assert_eq!(err.to_string(), "no mask image in store");
        assert!(store.load_record(RecordId::GroundTruth).is_err());
    }

    #[test]
    fn persisted_artifacts_are_readable() {
        let store = MemoryStore::new();
        store.persist(Artifact::Final, &pixel(4)).unwrap();
        store
            .persist(Artifact::Snapshot { stage: 1 }, &pixel(9))
            .unwrap();
        assert_eq!(store.artifact(Artifact::Final), Some(pixel(4)));
        assert_eq!(
            store.persisted(),
            vec![Artifact::Snapshot { stage: 1 }, Artifact::Final]
        );
    }

    #[test]
    fn failing_artifact_is_rejected() {
        let store = MemoryStore::new().failing_on(Artifact::ValidatedCopy);
        assert!(store.persist(Artifact::ValidatedCopy, &pixel(1)).is_err());
        assert!(store.artifact(Artifact::ValidatedCopy).is_none());
        assert!(store.persist(Artifact::Final, &pixel(1)).is_ok());
    }

    #[test]
    fn record_can_be_removed() {
        let record = StageMaskRecord::new(0, vec![1, 2, 3]);
        let store = MemoryStore::new()
            .with_record(RecordId::Stage(0), record.clone())
            .without_record(RecordId::GroundTruth);
        assert_eq!(store.load_record(RecordId::Stage(0)).unwrap(), record);
        let store = store.without_record(RecordId::Stage(0));
        assert!(store.load_record(RecordId::Stage(0)).is_err());
    }
}
