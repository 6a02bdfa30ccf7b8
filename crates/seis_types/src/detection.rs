//! Signal detection types used for named-filter resolution

use serde::{Deserialize, Serialize};

/// A signal detection hypothesis. Named filters resolve through the filter
/// table of the hypothesis associated with a segment (or with the single
/// selected detection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDetectionHypothesis {
    /// Hypothesis id.
    pub id: String,
    /// Id of the signal detection this hypothesis belongs to.
    pub detection_id: String,
}
