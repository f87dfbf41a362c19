use anchor_proofs_types::{Intent, IntentStatus, LegStatus};

/// Leg tallies kept on the intent row
///
/// `completed + failed + pending` always equals the number of legs tallied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegCounters {
    pub completed: u32,
    /// failed, skipped and rolled back
    pub failed: u32,
    /// every non-terminal status
    pub pending: u32,
}

impl LegCounters {
    pub fn tally(statuses: impl IntoIterator<Item = LegStatus>) -> Self {
        let mut counters = Self::default();
        for status in statuses {
            match status {
                LegStatus::Completed => counters.completed += 1,
                s if s.is_failure() => counters.failed += 1,
                _ => counters.pending += 1,
            }
        }
        counters
    }

    pub fn total(&self) -> u32 {
        self.completed + self.failed + self.pending
    }

    pub fn write_to(&self, intent: &mut Intent) {
        intent.legs_completed = self.completed;
        intent.legs_failed = self.failed;
        intent.legs_pending = self.pending;
    }
}

/// Terminal status of an intent whose legs have all settled.
///
/// `None` while any leg is still pending. Rollback and expiry are decided
/// by the scheduler, not by the tallies.
pub fn settled_status(counters: &LegCounters) -> Option<IntentStatus> {
    if counters.pending > 0 {
        return None;
    }
    Some(match (counters.completed, counters.failed) {
        (_, 0) => IntentStatus::Completed,
        (0, _) => IntentStatus::Failed,
        _ => IntentStatus::PartialComplete,
    })
}

/// Non-terminal status shown while legs are in flight
pub fn running_status(statuses: impl IntoIterator<Item = LegStatus>) -> IntentStatus {
    let anchoring = statuses
        .into_iter()
        .any(|s| matches!(s, LegStatus::Batched | LegStatus::Anchored));
    if anchoring {
        IntentStatus::Anchoring
    } else {
        IntentStatus::Processing
    }
}
