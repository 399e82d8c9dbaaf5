//! What a reconstruction found, for people and for tools.
//!
//! [`ReconstructionReport`] serializes to JSON (minus the recovered
//! pixels) and renders a plain-text [`summary`](ReconstructionReport::summary).

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use crate::operation::Operation;
use crate::stage::StageReport;
use crate::types::{PixelBuffer, Warning};
use crate::validate::MaskMismatch;

/// Serialize a `Duration` as fractional seconds, the way JSON consumers
/// expect a timing.
mod duration_secs {
    use std::time::Duration;

    use serde::{Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }
}

/// Outcome of the ground-truth check on the untouched original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FinalValidation {
    /// Both the exact and the modular mask checks passed.
    Passed {
        /// Bytes compared.
        covered: usize,
    },
    /// A check failed.
    Failed(MaskMismatch),
    /// The ground-truth record could not be loaded.
    Unavailable,
}

impl FinalValidation {
    /// Returns `true` if the check ran and passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

/// Result of a successful reconstruction.
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionReport {
    /// Number of stages undone.
    pub stage_count: usize,
    /// Per-stage results in processing order: the last applied stage
    /// comes first.
    pub stages: Vec<StageReport>,
    /// Ground-truth check on the untouched original.
    pub final_validation: FinalValidation,
    /// Whether the recovered image is byte-identical to the original.
    pub matches_original: bool,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<Warning>,
    /// Wall-clock time of the whole run.
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    #[serde(skip)]
    recovered: PixelBuffer,
}

impl ReconstructionReport {
    pub(crate) fn new(
        stages: Vec<StageReport>,
        final_validation: FinalValidation,
        matches_original: bool,
        warnings: Vec<Warning>,
        elapsed: Duration,
        recovered: PixelBuffer,
    ) -> Self {
        Self {
            stage_count: stages.len(),
            stages,
            final_validation,
            matches_original,
            warnings,
            elapsed,
            recovered,
        }
    }

    /// The fully recovered image.
    #[must_use]
    pub const fn recovered(&self) -> &PixelBuffer {
        &self.recovered
    }

    /// Take the recovered image.
    #[must_use]
    pub fn into_recovered(self) -> PixelBuffer {
        self.recovered
    }

    /// Detected operations in processing order, followed by the trailing
    /// XOR that every data set assumes as its first forward step.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.stages
            .iter()
            .map(|stage| stage.operation)
            .chain(std::iter::once(Operation::Xor))
            .collect()
    }

    /// Human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Reconstruction Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Stages: {}  |  Total duration: {:.3}ms",
            self.stage_count,
            self.elapsed.as_secs_f64() * 1000.0,
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<6} {:<7} {:<24} {:<24} {:>6}",
            "Step", "Stage", "Detected", "Undoes", "Rank"
        ));
        lines.push("-".repeat(71));
        for (step, stage) in (1..).zip(&self.stages) {
            let mut rank = stage.candidates_tried.to_string();
            if !stage.reconstruction_persisted {
                rank.push('*');
            }
            lines.push(format!(
                "{:<6} {:<7} {:<24} {:<24} {:>6}",
                step,
                stage.stage + 1,
                stage.operation.to_string(),
                stage.operation.inverse().to_string(),
                rank,
            ));
        }
        // The first forward XOR has no record of its own.
        lines.push(format!(
            "{:<6} {:<7} {:<24} {:<24} {:>6}",
            self.stages.len() + 1,
            "-",
            Operation::Xor.to_string(),
            "(assumed)",
            "-",
        ));
        lines.push(String::new());

        let mut validation = String::from("Final validation: ");
        match &self.final_validation {
            FinalValidation::Passed { covered } => {
                let _ = write!(validation, "passed ({covered} bytes)");
            }
            FinalValidation::Failed(mismatch) => {
                let _ = write!(validation, "FAILED ({mismatch})");
            }
            FinalValidation::Unavailable => validation.push_str("skipped"),
        }
        lines.push(validation);
        lines.push(format!(
            "Matches original: {}",
            if self.matches_original { "yes" } else { "no" }
        ));

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  - {warning}"));
            }
        }

        lines.join("\n")
    }
}
