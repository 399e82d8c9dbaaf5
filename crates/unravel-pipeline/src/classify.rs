//! Operation classifier: find which inverse a stage needs.
//!
//! Tries every [`Operation::candidates`] entry in priority order, applies
//! it to the stage's input, and validates the result against the stage's
//! mask record. The first candidate that validates wins. XOR goes first
//! so a rotation that happens to satisfy a narrow mask window can never
//! shadow it.

use log::debug;

use crate::operation::Operation;
use crate::types::{PixelBuffer, StageMaskRecord};
use crate::validate::{self, MaskCheck};

/// Result of classifying one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Classification {
    /// The inverse operation that validated, or `None` if no candidate did.
    pub operation: Option<Operation>,
    /// Position in priority order of the winning candidate (1-based), or
    /// the number of candidates tried when none matched.
    pub candidates_tried: usize,
}

/// Apply one candidate and validate its output.
fn check_candidate(
    operation: Operation,
    candidate: &PixelBuffer,
    xor_reference: &PixelBuffer,
    mask: &PixelBuffer,
    record: &StageMaskRecord,
) -> MaskCheck {
    match operation.apply(candidate, xor_reference) {
        Some(transformed) => validate::validate_record(&transformed, mask, record),
        // A reference of the wrong size can never validate.
        None => MaskCheck::Invalid(validate::MaskMismatch::ReferenceLength {
            expected: candidate.len(),
            actual: xor_reference.len(),
        }),
    }
}

/// Classify a stage sequentially, stopping at the first match.
pub fn classify(
    candidate: &PixelBuffer,
    xor_reference: &PixelBuffer,
    mask: &PixelBuffer,
    record: &StageMaskRecord,
) -> Classification {
    let mut tried = 0;
    for operation in Operation::candidates() {
        tried += 1;
        let check = check_candidate(operation, candidate, xor_reference, mask, record);
        match check {
            MaskCheck::Valid { covered } => {
                debug!("{operation}: valid over {covered} bytes");
                return Classification {
                    operation: Some(operation),
                    candidates_tried: tried,
                };
            }
            MaskCheck::Invalid(mismatch) => debug!("{operation}: {mismatch}"),
        }
    }
    Classification {
        operation: None,
        candidates_tried: tried,
    }
}

/// Classify a stage with every candidate evaluated on the rayon pool.
///
/// Returns exactly what [`classify`] returns: when several candidates
/// validate, the one earliest in priority order is reported.
#[cfg(feature = "parallel")]
pub fn classify_parallel(
    candidate: &PixelBuffer,
    xor_reference: &PixelBuffer,
    mask: &PixelBuffer,
    record: &StageMaskRecord,
) -> Classification {
    use rayon::prelude::*;

    let candidates: Vec<Operation> = Operation::candidates().collect();
    let hit = candidates.par_iter().position_first(|operation| {
        check_candidate(*operation, candidate, xor_reference, mask, record).is_valid()
    });
    match hit.and_then(|index| candidates.get(index).map(|op| (index, *op))) {
        Some((index, operation)) => Classification {
            operation: Some(operation),
            candidates_tried: index + 1,
        },
        None => Classification {
            operation: None,
            candidates_tried: candidates.len(),
        },
    }
}
