//! Anti-flap cooldown over the decision log
//!
//! A proposal type is suppressed while a record of the same type sits among
//! the most recent `window` decisions, whatever its status. Records age out
//! only as newer decisions are appended; wall-clock time plays no part.

use crate::types::{DecisionRecord, DecisionType};

/// The most recent decision records, oldest first
pub struct Cooldown<'a> {
    recent: Vec<&'a DecisionRecord>,
}

impl<'a> Cooldown<'a> {
    /// Take the last `window` records after a stable sort by timestamp
    pub fn from_history(decisions: &'a [DecisionRecord], window: usize) -> Self {
        let mut sorted: Vec<&DecisionRecord> = decisions.iter().collect();
        sorted.sort_by_key(|d| d.timestamp);
        let start = sorted.len().saturating_sub(window);
        Self {
            recent: sorted.split_off(start),
        }
    }

    /// The record that suppresses `decision_type`, if any
    pub fn blocking(&self, decision_type: DecisionType) -> Option<&'a DecisionRecord> {
        self.recent
            .iter()
            .rev()
            .find(|d| d.decision_type == decision_type)
            .copied()
    }

    pub fn is_suppressed(&self, decision_type: DecisionType) -> bool {
        self.blocking(decision_type).is_some()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}
