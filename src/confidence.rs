//! Accept/reject decision combining match quality with speech quality

use tracing::debug;

use crate::command::CommandMatch;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// A match that did not clear the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub candidate: CommandMatch,
    pub combined: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceCombiner {
    threshold: f64,
}

impl Default for ConfidenceCombiner {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

impl ConfidenceCombiner {
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_finite() { threshold.clamp(0.0, 1.0) } else { DEFAULT_THRESHOLD };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Multiply the two confidences; accept only when strictly above the threshold.
    /// The accepted match carries the combined value.
    pub fn accept(&self, candidate: CommandMatch, speech_confidence: f64) -> Result<CommandMatch, Rejection> {
        let speech = if speech_confidence.is_finite() { speech_confidence.clamp(0.0, 1.0) } else { 0.0 };
        let combined = (candidate.confidence * speech).clamp(0.0, 1.0);

        if combined > self.threshold {
            Ok(CommandMatch { confidence: combined, ..candidate })
        } else {
            debug!(
                "Rejected {} ({:.3} x {:.3} = {:.3} <= {:.2})",
                candidate.command, candidate.confidence, speech, combined, self.threshold
            );
            Err(Rejection { candidate, combined, threshold: self.threshold })
        }
    }
}
