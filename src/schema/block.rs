use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::event::{EventIndex, Score, ScoreDelta};
use super::segment::SegmentId;

/// Narrative role of a block. The first block of a game is always
/// `Opening` and the last always `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockRole {
    Opening,
    MomentumShift,
    Response,
    DecisionPoint,
    Closing,
}

impl BlockRole {
    pub const ALL: [BlockRole; 5] = [
        Self::Opening,
        Self::MomentumShift,
        Self::Response,
        Self::DecisionPoint,
        Self::Closing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opening => "OPENING",
            Self::MomentumShift => "MOMENTUM_SHIFT",
            Self::Response => "RESPONSE",
            Self::DecisionPoint => "DECISION_POINT",
            Self::Closing => "CLOSING",
        }
    }
}

impl fmt::Display for BlockRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BlockError {
    #[error("block {0} has no segments")]
    Empty(usize),
    #[error("block {index}: segment {found} follows {previous} (segments must be consecutive)")]
    NotConsecutive {
        index: usize,
        previous: SegmentId,
        found: SegmentId,
    },
}

/// A coarse narrative unit made of one or more consecutive segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: usize,
    pub role: BlockRole,
    pub segment_ids: Vec<SegmentId>,
    pub score_before: Score,
    pub score_after: Score,
    pub key_event_ids: Vec<EventIndex>,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Prose supplied by the text-generation side. The engine only checks
    /// its shape.
    #[serde(default)]
    pub narrative: Option<String>,
}

impl Block {
    pub fn new(
        index: usize,
        role: BlockRole,
        segment_ids: Vec<SegmentId>,
        score_before: Score,
        score_after: Score,
        key_event_ids: Vec<EventIndex>,
    ) -> Result<Block, BlockError> {
        if segment_ids.is_empty() {
            return Err(BlockError::Empty(index));
        }
        for pair in segment_ids.windows(2) {
            if pair[1].0 != pair[0].0 + 1 {
                return Err(BlockError::NotConsecutive {
                    index,
                    previous: pair[0],
                    found: pair[1],
                });
            }
        }
        Ok(Self::new_unchecked(
            index,
            role,
            segment_ids,
            score_before,
            score_after,
            key_event_ids,
        ))
    }

    /// Raw constructor with no checks, for exercising validators.
    pub fn new_unchecked(
        index: usize,
        role: BlockRole,
        segment_ids: Vec<SegmentId>,
        score_before: Score,
        score_after: Score,
        key_event_ids: Vec<EventIndex>,
    ) -> Block {
        Block {
            index,
            role,
            segment_ids,
            score_before,
            score_after,
            key_event_ids,
            attachments: Vec::new(),
            narrative: None,
        }
    }

    pub fn score_delta(&self) -> ScoreDelta {
        self.score_after.delta_since(self.score_before)
    }

    pub fn first_segment(&self) -> Option<SegmentId> {
        self.segment_ids.first().copied()
    }

    pub fn last_segment(&self) -> Option<SegmentId> {
        self.segment_ids.last().copied()
    }

    pub fn narrative_word_count(&self) -> usize {
        self.narrative
            .as_deref()
            .map(|text| text.split_whitespace().count())
            .unwrap_or(0)
    }
}
