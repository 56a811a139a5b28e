//! Per-target attempt log.
//!
//! Target rows keep every recorded outcome, not just the latest one. The
//! current row status is always the last entry's status; the history is what
//! lets us answer "why is this target failed" and prove a published target
//! was never re-invoked.

use serde::{Deserialize, Serialize};

use super::outcome::DeliveryOutcome;

/// A single entry in a target's append-only attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// 1-indexed position in the log.
    pub seq: u32,

    pub outcome: DeliveryOutcome,
}

impl DeliveryAttempt {
    pub fn new(seq: u32, outcome: DeliveryOutcome) -> Self {
        Self { seq, outcome }
    }
}
