//! Coverage certification and content fingerprints for segment and block
//! lists.
//!
//! Violations are collected, not short-circuited, unless the caller asks
//! for fail-fast.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::warn;

use crate::schema::block::Block;
use crate::schema::event::{Event, EventIndex};
use crate::schema::segment::{ReasonCode, Segment};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageCounts {
    /// Segments or blocks examined.
    pub units: usize,
    /// Events (for segments) or segments (for blocks) the units claim.
    pub covered: usize,
    /// Events or segments that should be covered, when known.
    pub expected: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub passed: bool,
    pub errors: Vec<String>,
    /// 64 hex characters of SHA-256 over the canonical form.
    pub fingerprint: String,
    pub counts: CoverageCounts,
}

/// Stops the check sequence early in fail-fast mode.
struct Halt;

struct Violations {
    errors: Vec<String>,
    fail_fast: bool,
}

impl Violations {
    fn new(fail_fast: bool) -> Self {
        Self {
            errors: Vec::new(),
            fail_fast,
        }
    }

    fn push(&mut self, message: String) -> Result<(), Halt> {
        self.errors.push(message);
        if self.fail_fast {
            Err(Halt)
        } else {
            Ok(())
        }
    }
}

fn describe_missing(from: u32, to: u32) -> String {
    let count = to - from + 1;
    if count == 1 {
        format!("index {} not covered", from)
    } else if count <= 10 {
        let listed: Vec<String> = (from..=to).map(|i| i.to_string()).collect();
        format!("indices [{}] not covered", listed.join(", "))
    } else {
        format!("indices {}..={} not covered ({} events)", from, to, count)
    }
}

/// Certify that `segments` cover the game exactly once, in order.
///
/// With `events`, the first and last segment are also checked against the
/// game's first and last event and the total event count.
pub fn validate_segments(
    segments: &[Segment<'_>],
    events: Option<&[Event]>,
    fail_fast: bool,
) -> CoverageReport {
    let mut violations = Violations::new(fail_fast);
    let _ = check_segments(segments, events, &mut violations);

    let report = CoverageReport {
        passed: violations.errors.is_empty(),
        errors: violations.errors,
        fingerprint: segment_fingerprint(segments),
        counts: CoverageCounts {
            units: segments.len(),
            covered: segments.iter().map(|s| s.len()).sum(),
            expected: events.map(<[Event]>::len),
        },
    };
    if !report.passed {
        warn!(errors = report.errors.len(), "segment coverage failed");
    }
    report
}

fn check_segments(
    segments: &[Segment<'_>],
    events: Option<&[Event]>,
    violations: &mut Violations,
) -> Result<(), Halt> {
    let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
        return violations.push("no segments".to_string());
    };

    // Per-segment shape.
    for (position, segment) in segments.iter().enumerate() {
        if segment.id.0 as usize != position {
            violations.push(format!(
                "segment at position {} has id {}",
                position, segment.id
            ))?;
        }
        if segment.start_index > segment.end_index {
            violations.push(format!(
                "segment {} has inverted bounds {}..={}",
                segment.id, segment.start_index, segment.end_index
            ))?;
            continue;
        }
        if segment.len() as i64 != segment.declared_len() {
            violations.push(format!(
                "segment {} declares {} events ({}..={}) but holds {}",
                segment.id,
                segment.declared_len(),
                segment.start_index,
                segment.end_index,
                segment.len()
            ))?;
        }
        for (offset, event) in segment.events.iter().enumerate() {
            let expected = EventIndex(segment.start_index.0 + offset as u32);
            if event.index != expected {
                violations.push(format!(
                    "segment {}: event at offset {} is {}, expected {}",
                    segment.id, offset, event.index, expected
                ))?;
                break;
            }
        }
    }

    // Ordering, gaps and overlaps between neighbours.
    for pair in segments.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.start_index <= a.start_index {
            violations.push(format!(
                "segments out of order: {} starts at {} after {} starting at {}",
                b.id, b.start_index, a.id, a.start_index
            ))?;
        }
        if b.start_index > a.end_index.next() {
            violations.push(format!(
                "gap between segment {} (ends at {}) and segment {} (starts at {}): {}",
                a.id,
                a.end_index,
                b.id,
                b.start_index,
                describe_missing(a.end_index.0 + 1, b.start_index.0 - 1)
            ))?;
        }
        if b.start_index <= a.end_index {
            violations.push(format!(
                "overlap: segment {} starts at {} inside segment {} (ends at {})",
                b.id, b.start_index, a.id, a.end_index
            ))?;
        }
    }

    if let Some(events) = events {
        if let (Some(game_first), Some(game_last)) = (events.first(), events.last()) {
            if first.start_index != game_first.index {
                violations.push(format!(
                    "first segment starts at {} but the game starts at {}",
                    first.start_index, game_first.index
                ))?;
            }
            if last.end_index != game_last.index {
                violations.push(format!(
                    "last segment ends at {} but the game ends at {}",
                    last.end_index, game_last.index
                ))?;
            }
        }
        let covered: usize = segments.iter().map(|s| s.len()).sum();
        if covered != events.len() {
            violations.push(format!(
                "segments hold {} events but the game has {}",
                covered,
                events.len()
            ))?;
        }
    }
    Ok(())
}

/// Certify that `blocks` partition `segments` exactly once, in order.
pub fn validate_blocks(blocks: &[Block], segments: &[Segment<'_>], fail_fast: bool) -> CoverageReport {
    let mut violations = Violations::new(fail_fast);
    let _ = check_blocks(blocks, segments, &mut violations);

    let report = CoverageReport {
        passed: violations.errors.is_empty(),
        errors: violations.errors,
        fingerprint: block_fingerprint(blocks),
        counts: CoverageCounts {
            units: blocks.len(),
            covered: blocks.iter().map(|b| b.segment_ids.len()).sum(),
            expected: Some(segments.len()),
        },
    };
    if !report.passed {
        warn!(errors = report.errors.len(), "block coverage failed");
    }
    report
}

fn check_blocks(
    blocks: &[Block],
    segments: &[Segment<'_>],
    violations: &mut Violations,
) -> Result<(), Halt> {
    if blocks.is_empty() {
        return violations.push("no blocks".to_string());
    }

    let segment_at = |id: u32| segments.get(id as usize).filter(|s| s.id.0 == id);

    for (position, block) in blocks.iter().enumerate() {
        if block.index != position {
            violations.push(format!(
                "block at position {} has index {}",
                position, block.index
            ))?;
        }
        let (Some(first), Some(last)) = (block.first_segment(), block.last_segment()) else {
            violations.push(format!("block {} has no segments", block.index))?;
            continue;
        };
        for pair in block.segment_ids.windows(2) {
            if pair[1].0 != pair[0].0 + 1 {
                violations.push(format!(
                    "block {}: segment {} follows {}",
                    block.index, pair[1], pair[0]
                ))?;
            }
        }
        if let Some(unknown) = block.segment_ids.iter().find(|id| segment_at(id.0).is_none()) {
            violations.push(format!(
                "block {} references unknown segment {}",
                block.index, unknown
            ))?;
            continue;
        }

        if let (Some(head), Some(tail)) = (segment_at(first.0), segment_at(last.0)) {
            if block.score_before != head.score_before {
                violations.push(format!(
                    "block {} opens at {} but segment {} opens at {}",
                    block.index, block.score_before, head.id, head.score_before
                ))?;
            }
            if block.score_after != tail.score_after() {
                violations.push(format!(
                    "block {} closes at {} but segment {} closes at {}",
                    block.index,
                    block.score_after,
                    tail.id,
                    tail.score_after()
                ))?;
            }
            if let Some(stray) = block
                .key_event_ids
                .iter()
                .find(|k| **k < head.start_index || **k > tail.end_index)
            {
                violations.push(format!(
                    "block {}: key event {} lies outside its segments",
                    block.index, stray
                ))?;
            }
        }
    }

    for pair in blocks.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if let (Some(a_last), Some(b_first)) = (a.last_segment(), b.first_segment()) {
            if b_first.0 > a_last.0 + 1 {
                let missing: Vec<String> = (a_last.0 + 1..b_first.0).map(|i| i.to_string()).collect();
                violations.push(format!(
                    "gap between block {} and block {}: segments [{}] not covered",
                    a.index,
                    b.index,
                    missing.join(", ")
                ))?;
            } else if b_first.0 <= a_last.0 {
                violations.push(format!(
                    "overlap: block {} starts at segment {} but block {} ends at segment {}",
                    b.index, b_first, a.index, a_last
                ))?;
            }
        }
    }

    if let (Some(first_block), Some(last_block)) = (blocks.first(), blocks.last()) {
        if first_block.first_segment().map(|s| s.0) != Some(0) {
            violations.push("first block does not start at segment 0".to_string())?;
        }
        let expected_last = segments.len().checked_sub(1).map(|l| l as u32);
        if last_block.last_segment().map(|s| s.0) != expected_last {
            violations.push(format!(
                "last block does not end at the last segment ({:?})",
                expected_last
            ))?;
        }
    }

    let covered: usize = blocks.iter().map(|b| b.segment_ids.len()).sum();
    if covered != segments.len() {
        violations.push(format!(
            "blocks claim {} segments but there are {}",
            covered,
            segments.len()
        ))?;
    }
    Ok(())
}

fn digest(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint over the segment list. Reason codes are sorted before
/// hashing; segment order is significant.
pub fn segment_fingerprint(segments: &[Segment<'_>]) -> String {
    let mut canonical = String::new();
    for segment in segments {
        let mut reasons: Vec<ReasonCode> = segment.reason_codes.clone();
        reasons.sort();
        reasons.dedup();
        let reasons: Vec<&str> = reasons.iter().map(ReasonCode::as_str).collect();
        let mut keys: Vec<u32> = segment.key_events.iter().map(|k| k.index.0).collect();
        keys.sort_unstable();
        keys.dedup();
        let keys: Vec<String> = keys.iter().map(u32::to_string).collect();
        let _ = writeln!(
            canonical,
            "S|{}|{}|{}|{}|{}|{}|{}",
            segment.id,
            segment.start_index,
            segment.end_index,
            segment.len(),
            segment.score_before,
            reasons.join(","),
            keys.join(",")
        );
    }
    digest(&canonical)
}

/// Fingerprint over the block list. Narrative text is excluded: it is
/// collaborator output, not structure.
pub fn block_fingerprint(blocks: &[Block]) -> String {
    let mut canonical = String::new();
    for block in blocks {
        let segments: Vec<String> = block.segment_ids.iter().map(|s| s.to_string()).collect();
        let keys: Vec<String> = block.key_event_ids.iter().map(|k| k.to_string()).collect();
        let _ = writeln!(
            canonical,
            "B|{}|{}|{}|{}|{}|{}|{}",
            block.index,
            block.role,
            segments.join(","),
            block.score_before,
            block.score_after,
            keys.join(","),
            block.attachments.join(",")
        );
    }
    digest(&canonical)
}
