//! Generate a data set on disk, reconstruct it from the files alone, and
//! check every artifact the run leaves behind.

#![allow(clippy::unwrap_used)]

use std::hash::Hasher;

use siphasher::sip::SipHasher13;
use unravel_io::{FsStore, codec, mask_file, write_case};
use unravel_pipeline::synth;
use unravel_pipeline::{
    Artifact, ImageInput, Operation, PixelBuffer, ReconstructionConfig, ReconstructionError,
    RecordId, RotateBits, Warning,
};

fn image(width: u32, height: u32, seed: u64) -> PixelBuffer {
    let data = (0..u64::from(width * height * 3))
        .map(|i| {
            let mut hasher = SipHasher13::new_with_keys(seed, 0x6469_736b);
            hasher.write_u64(i);
            hasher.finish() as u8
        })
        .collect();
    PixelBuffer::from_raw(width, height, data).unwrap()
}

fn plan() -> Vec<Operation> {
    vec![
        Operation::Xor,
        Operation::RotateLeft(RotateBits::new(3).unwrap()),
        Operation::RotateRight(RotateBits::new(2).unwrap()),
    ]
}

fn dataset() -> (tempfile::TempDir, PixelBuffer) {
    let dir = tempfile::tempdir().unwrap();
    let case = synth::distort(image(9, 7, 3), image(9, 7, 8), image(3, 2, 5), &plan(), 77).unwrap();
    let original = case.references.original.clone();
    write_case(dir.path(), &case).unwrap();
    (dir, original)
}

#[test]
fn written_case_uses_the_data_set_layout() {
    let (dir, _) = dataset();
    for name in [
        "M.bmp", "I_M.bmp", "I_D.bmp", "I_O.bmp", "M0.txt", "M1.txt", "M2.txt", "M3.txt",
    ] {
        assert!(dir.path().join(name).is_file(), "{name} missing");
    }
    let record = mask_file::load_mask_record(&dir.path().join("M1.txt")).unwrap();
    assert_eq!(record.expected.len(), 18);
}

#[test]
fn reconstruction_from_disk_recovers_the_original() {
    let (dir, original) = dataset();
    let report = unravel_io::reconstruct(ReconstructionConfig::new(dir.path(), 3)).unwrap();

    assert!(report.matches_original);
    assert!(report.warnings.is_empty());
    assert_eq!(report.recovered(), &original);

    let store = FsStore::new(dir.path());
    let on_disk = codec::decode(&store.artifact_path(Artifact::Final)).unwrap();
    assert_eq!(on_disk, original);
    let copy = codec::decode(&dir.path().join("I_OReconstruida.bmp")).unwrap();
    assert_eq!(copy, original);

    // P3 is the distorted input, P0_reconstruida the recovered original.
    let distorted = codec::decode(&store.input_path(ImageInput::Distorted)).unwrap();
    assert_eq!(codec::decode(&dir.path().join("P3.bmp")).unwrap(), distorted);
    for name in [
        "P1.bmp",
        "P2.bmp",
        "P2_reconstruida.bmp",
        "P1_reconstruida.bmp",
    ] {
        assert!(dir.path().join(name).is_file(), "{name} missing");
    }
    assert_eq!(
        codec::decode(&dir.path().join("P0_reconstruida.bmp")).unwrap(),
        original
    );
}

#[test]
fn missing_stage_record_fails_without_output() {
    let (dir, _) = dataset();
    let store = FsStore::new(dir.path());
    std::fs::remove_file(store.record_path(RecordId::Stage(1))).unwrap();

    let err = unravel_io::reconstruct(ReconstructionConfig::new(dir.path(), 3)).unwrap_err();
    assert!(matches!(
        err,
        ReconstructionError::LoadRecord {
            record: RecordId::Stage(1),
            ..
        }
    ));
    assert!(!dir.path().join("P3.bmp").exists());
    assert!(!dir.path().join("I_0Reconstruida.bmp").exists());
}

#[test]
fn missing_ground_truth_only_warns() {
    let (dir, original) = dataset();
    std::fs::remove_file(dir.path().join("M0.txt")).unwrap();

    let report = unravel_io::reconstruct(ReconstructionConfig::new(dir.path(), 3)).unwrap();
    assert_eq!(report.recovered(), &original);
    assert!(matches!(
        report.warnings.as_slice(),
        [Warning::GroundTruthUnavailable { .. }]
    ));
    assert!(dir.path().join("I_0Reconstruida.bmp").is_file());
    assert!(!dir.path().join("I_OReconstruida.bmp").exists());
}

#[test]
fn corrupt_record_is_reported_with_its_file() {
    let (dir, _) = dataset();
    std::fs::write(dir.path().join("M2.txt"), "offset?\n").unwrap();

    let err = unravel_io::reconstruct(ReconstructionConfig::new(dir.path(), 3)).unwrap_err();
    assert!(err.to_string().contains("M2.txt"), "{err}");
}
