//! Append-only record of boundary decisions for one pipeline run.

use serde::Serialize;

use crate::core::boundary::{BoundaryDecision, BoundaryReason, BoundaryStrength};
use crate::schema::event::EventIndex;
use crate::schema::segment::SegmentId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub index: EventIndex,
    pub strength: BoundaryStrength,
    pub reasons: Vec<BoundaryReason>,
    pub collapsed_into: Option<EventIndex>,
    /// Segment the event ended up in.
    pub segment: SegmentId,
    /// The builder demoted a preferred boundary (small-segment merge).
    pub demoted: bool,
}

/// Owned by exactly one run. Sequence ids start at zero and increase by
/// one per entry, in insertion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoundaryAuditLog {
    next_seq: u64,
    entries: Vec<AuditEntry>,
    /// Also record events for which no rule produced any reason.
    pub record_quiet: bool,
}

impl BoundaryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose() -> Self {
        Self {
            record_quiet: true,
            ..Self::default()
        }
    }

    pub fn record(&mut self, decision: &BoundaryDecision, segment: SegmentId, demoted: bool) {
        if decision.reasons.is_empty() && !self.record_quiet {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(AuditEntry {
            seq,
            index: decision.index,
            strength: decision.strength,
            reasons: decision.reasons.clone(),
            collapsed_into: decision.collapsed_into,
            segment,
            demoted,
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
