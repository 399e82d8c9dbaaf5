//! Build distortion cases: apply a plan of forward operations to an
//! original image and record the mask sums each stage needs to be undone.
//!
//! Stage `s` of a plan turns `P_s` into `P_{s+1}`, starting from the
//! original (`P_0`). The stage's record holds `P_s[offset + k] + mask[k]`,
//! so the reconstruction can recognise `P_s` when it recovers it. Offsets
//! are derived from a seed with SipHash, so a given seed always produces
//! the same case.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use crate::operation::Operation;
use crate::store::ImageInput;
use crate::types::{PixelBuffer, ReconstructionError, ReferenceImages, StageMaskRecord};

/// Second SipHash key; the first is the caller's seed.
const OFFSET_KEY: u64 = 0x756e_7261_7665_6c21;

/// Everything a reconstruction needs: the four reference images, one
/// record per stage and the ground-truth record for the original.
#[derive(Debug, Clone)]
pub struct SynthCase {
    /// Mask, XOR reference, distorted result and original.
    pub references: ReferenceImages,
    /// `records[s]` validates the image entering stage `s`.
    pub records: Vec<StageMaskRecord>,
    /// Record computed on the original at its own offset.
    pub ground_truth: StageMaskRecord,
}

/// Compute the mask record for `image` at `offset`.
///
/// Only positions inside the image produce an entry, so the table is
/// shorter than the mask when the mask runs past the end.
#[must_use]
pub fn mask_record(image: &PixelBuffer, mask: &PixelBuffer, offset: usize) -> StageMaskRecord {
    let expected = image
        .as_bytes()
        .iter()
        .skip(offset)
        .zip(mask.as_bytes())
        .map(|(a, m)| u32::from(*a) + u32::from(*m))
        .collect();
    StageMaskRecord::new(offset, expected)
}

/// Pick a deterministic offset for `stage` that keeps the whole mask
/// inside an image of `image_len` bytes.
///
/// Returns 0 when the mask is at least as long as the image.
#[must_use]
pub fn stage_offset(seed: u64, stage: u64, image_len: usize, mask_len: usize) -> usize {
    let span = image_len.saturating_sub(mask_len);
    let Ok(choices) = u64::try_from(span) else {
        return 0;
    };
    let mut hasher = SipHasher13::new_with_keys(seed, OFFSET_KEY);
    hasher.write_u64(stage);
    usize::try_from(hasher.finish() % choices.saturating_add(1)).unwrap_or(0)
}

/// Ground-truth records use this stage number when deriving their offset.
const GROUND_TRUTH_STAGE: u64 = u64::MAX;

/// Distort `original` by applying `plan` in order.
///
/// # Errors
///
/// Returns [`ReconstructionError::DimensionMismatch`] if `xor_reference`
/// is not the size of `original` and the plan contains
/// [`Operation::Xor`], or [`ReconstructionError::InvalidConfig`] if the
/// plan is empty.
pub fn distort(
    original: PixelBuffer,
    xor_reference: PixelBuffer,
    mask: PixelBuffer,
    plan: &[Operation],
    seed: u64,
) -> Result<SynthCase, ReconstructionError> {
    if plan.is_empty() {
        return Err(ReconstructionError::InvalidConfig(
            "a distortion plan needs at least one operation".to_string(),
        ));
    }

    let mut records = Vec::with_capacity(plan.len());
    let mut current = original.clone();
    for (stage, operation) in (0u64..).zip(plan) {
        let offset = stage_offset(seed, stage, current.len(), mask.len());
        records.push(mask_record(&current, &mask, offset));
        current = operation.apply(&current, &xor_reference).ok_or_else(|| {
            ReconstructionError::DimensionMismatch {
                input: ImageInput::XorReference,
                expected: current.dimensions(),
                actual: xor_reference.dimensions(),
            }
        })?;
        log::debug!("stage {}: applied {operation} at offset {offset}", stage + 1);
    }

    let offset = stage_offset(seed, GROUND_TRUTH_STAGE, original.len(), mask.len());
    let ground_truth = mask_record(&original, &mask, offset);

    Ok(SynthCase {
        references: ReferenceImages {
            mask,
            xor_reference,
            distorted: current,
            original,
        },
        records,
        ground_truth,
    })
}
