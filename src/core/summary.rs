//! What the text-generation side is allowed to see about a block.

use serde::Serialize;

use crate::schema::block::{Block, BlockRole};
use crate::schema::event::{Score, ScoreDelta};
use crate::schema::segment::Segment;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    pub index: usize,
    pub role: BlockRole,
    pub score_before: Score,
    pub score_after: Score,
    pub score_delta: ScoreDelta,
    /// Descriptions of the block's key events, in game order.
    pub key_event_descriptions: Vec<String>,
}

impl BlockSummary {
    pub fn from_block(block: &Block, segments: &[Segment<'_>]) -> Self {
        let key_event_descriptions = block
            .key_event_ids
            .iter()
            .filter_map(|&index| {
                block
                    .segment_ids
                    .iter()
                    .filter_map(|id| segments.get(id.0 as usize))
                    .find_map(|s| s.event(index))
            })
            .map(|e| e.description.clone())
            .collect();

        Self {
            index: block.index,
            role: block.role,
            score_before: block.score_before,
            score_after: block.score_after,
            score_delta: block.score_delta(),
            key_event_descriptions,
        }
    }
}
