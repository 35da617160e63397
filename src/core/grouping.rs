//! Block grouping: rolls the segment list up into a small fixed number of
//! narrative blocks and gives each one a role.

use rustc_hash::FxHashMap;
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::EngineConfig;
use crate::core::key_events::truncate_key_events;
use crate::schema::attachment::ScoredAttachment;
use crate::schema::block::{Block, BlockError, BlockRole};
use crate::schema::event::EventIndex;
use crate::schema::segment::{KeyEvent, ReasonCode, Segment};

#[derive(Debug, Error, PartialEq)]
pub enum GroupingError {
    #[error("need at least {required} segments to build blocks, found {found}")]
    TooFewSegments { found: usize, required: usize },
    #[error("block construction invariant violated: {0}")]
    Invariant(#[from] BlockError),
}

/// How attractive a segment start is as a block start. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SplitTier {
    LeadChange,
    ScoringRun,
    Even,
}

pub struct BlockGrouper<'c> {
    config: &'c EngineConfig,
}

impl<'c> BlockGrouper<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    /// Base count, plus one for a back-and-forth game, one more for a very
    /// back-and-forth game, one for a long game; capped at the maximum.
    pub fn target_block_count(&self, lead_changes: usize, total_events: usize) -> usize {
        let cfg = &self.config.blocks;
        let mut target = cfg.min_blocks;
        if lead_changes >= cfg.lead_changes_for_extra {
            target += 1;
        }
        if lead_changes >= cfg.lead_changes_for_second_extra {
            target += 1;
        }
        if total_events >= cfg.long_game_events {
            target += 1;
        }
        target.min(cfg.max_blocks)
    }

    pub fn group(
        &self,
        segments: &[Segment<'_>],
        lead_changes: usize,
        total_events: usize,
        attachments: &[ScoredAttachment],
    ) -> Result<Vec<Block>, GroupingError> {
        let required = self.config.blocks.min_blocks;
        if segments.len() < required {
            return Err(GroupingError::TooFewSegments {
                found: segments.len(),
                required,
            });
        }

        let count = self
            .target_block_count(lead_changes, total_events)
            .min(segments.len());
        let cuts = self.choose_splits(segments, count);
        let ranges = to_ranges(&cuts, segments.len());
        let roles = self.assign_roles(segments, &ranges);

        let mut blocks = Vec::with_capacity(ranges.len());
        for (index, (range, role)) in ranges.iter().zip(roles).enumerate() {
            let members = &segments[range.clone()];
            let (Some(head), Some(tail)) = (members.first(), members.last()) else {
                return Err(BlockError::Empty(index).into());
            };
            blocks.push(Block::new(
                index,
                role,
                members.iter().map(|s| s.id).collect(),
                head.score_before,
                tail.score_after(),
                self.block_key_events(members),
            )?);
        }

        self.attach(&mut blocks, segments, attachments);

        info!(
            segments = segments.len(),
            blocks = blocks.len(),
            lead_changes,
            "blocks grouped"
        );
        Ok(blocks)
    }

    fn split_tier(&self, segments: &[Segment<'_>], start: usize) -> SplitTier {
        let segment = &segments[start];
        if segment.has_reason(ReasonCode::LeadChange) {
            return SplitTier::LeadChange;
        }
        if segment.has_reason(ReasonCode::RunStart)
            || net_swing(&segments[start - 1]) >= self.config.blocks.large_run_points
        {
            return SplitTier::ScoringRun;
        }
        SplitTier::Even
    }

    /// Pick `count - 1` block starts (segment positions). Each start is
    /// looked for near its evenly spaced ideal, preferring lead changes,
    /// then scoring runs, then period lines, then closeness to the ideal.
    fn choose_splits(&self, segments: &[Segment<'_>], count: usize) -> Vec<usize> {
        let total = segments.len();
        let window = (total / (2 * count)).max(1);
        let mut cuts: Vec<usize> = Vec::with_capacity(count.saturating_sub(1));

        for i in 1..count {
            let ideal = (i * total + count / 2) / count;
            let lo = cuts.last().map(|c| c + 1).unwrap_or(1);
            let hi = total - (count - i);
            let from = lo.max(ideal.saturating_sub(window));
            let to = hi.min(ideal + window);

            let chosen = if from > to {
                ideal.clamp(lo, hi)
            } else {
                (from..=to)
                    .min_by_key(|&p| {
                        let period_line = segments[p].period() != segments[p - 1].period();
                        (self.split_tier(segments, p), !period_line, p.abs_diff(ideal), p)
                    })
                    .unwrap_or_else(|| ideal.clamp(lo, hi))
            };
            debug!(cut = i, ideal, chosen, "block split");
            cuts.push(chosen);
        }
        cuts
    }

    fn assign_roles(&self, segments: &[Segment<'_>], ranges: &[Range<usize>]) -> Vec<BlockRole> {
        let n = ranges.len();
        let mut roles = vec![BlockRole::Response; n];
        let mut used: FxHashMap<BlockRole, usize> = FxHashMap::default();
        let take = |role: BlockRole, used: &mut FxHashMap<BlockRole, usize>| {
            *used.entry(role).or_insert(0) += 1;
            role
        };

        if n == 0 {
            return roles;
        }
        roles[0] = take(BlockRole::Opening, &mut used);
        if n == 1 {
            return roles;
        }
        roles[n - 1] = take(BlockRole::Closing, &mut used);
        if n >= 3 {
            roles[n - 2] = take(BlockRole::DecisionPoint, &mut used);
        }

        for i in 1..n.saturating_sub(2) {
            let naive = if self.has_momentum_shift(&segments[ranges[i].clone()]) {
                BlockRole::MomentumShift
            } else if roles[i - 1] == BlockRole::MomentumShift || i * 2 < n {
                BlockRole::Response
            } else {
                BlockRole::DecisionPoint
            };
            let role = std::iter::once(naive)
                .chain(fallbacks(naive).iter().copied())
                .find(|r| used.get(r).copied().unwrap_or(0) < 2)
                .unwrap_or(naive);
            roles[i] = take(role, &mut used);
        }
        roles
    }

    fn has_momentum_shift(&self, members: &[Segment<'_>]) -> bool {
        members.iter().any(|s| {
            s.has_reason(ReasonCode::LeadChange)
                || s.has_reason(ReasonCode::RunStart)
                || net_swing(s) >= self.config.blocks.large_run_points
        })
    }

    fn block_key_events(&self, members: &[Segment<'_>]) -> Vec<EventIndex> {
        let selection = &self.config.selection;
        let pooled: Vec<KeyEvent> = members
            .iter()
            .flat_map(|s| truncate_key_events(&s.key_events, selection.per_segment_cap))
            .collect();
        truncate_key_events(&pooled, selection.per_block_cap)
            .into_iter()
            .map(|k| k.index)
            .collect()
    }

    /// Place the best attachments: anchored ones in the block holding their
    /// anchor event, the rest in the earliest block with room.
    fn attach(&self, blocks: &mut [Block], segments: &[Segment<'_>], attachments: &[ScoredAttachment]) {
        let cfg = &self.config.blocks;
        let mut ranked: Vec<&ScoredAttachment> = attachments
            .iter()
            .filter(|a| a.score.is_finite() && a.score >= cfg.min_attachment_score)
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

        let mut placed = 0;
        for attachment in ranked {
            if placed >= cfg.max_attachments_total {
                break;
            }
            let target = match attachment.anchor_index {
                Some(anchor) => blocks.iter().position(|b| block_contains(b, segments, anchor)),
                None => blocks
                    .iter()
                    .position(|b| b.attachments.len() < cfg.max_attachments_per_block),
            };
            let Some(target) = target else {
                continue;
            };
            let block = &mut blocks[target];
            if block.attachments.len() >= cfg.max_attachments_per_block {
                continue;
            }
            block.attachments.push(attachment.id.clone());
            placed += 1;
        }
    }
}

const fn fallbacks(role: BlockRole) -> &'static [BlockRole] {
    match role {
        BlockRole::MomentumShift => &[BlockRole::Response, BlockRole::DecisionPoint],
        BlockRole::Response => &[BlockRole::DecisionPoint, BlockRole::MomentumShift],
        BlockRole::DecisionPoint => &[BlockRole::Response, BlockRole::MomentumShift],
        BlockRole::Opening | BlockRole::Closing => &[
            BlockRole::Response,
            BlockRole::DecisionPoint,
            BlockRole::MomentumShift,
        ],
    }
}

/// Net points one side outscored the other by over the segment.
fn net_swing(segment: &Segment<'_>) -> u32 {
    let delta = segment.score_after().delta_since(segment.score_before);
    delta.home.abs_diff(delta.away)
}

fn block_contains(block: &Block, segments: &[Segment<'_>], index: EventIndex) -> bool {
    block
        .segment_ids
        .iter()
        .filter_map(|id| segments.get(id.0 as usize))
        .any(|s| s.contains(index))
}

fn to_ranges(cuts: &[usize], total: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        ranges.push(start..cut);
        start = cut;
    }
    ranges.push(start..total);
    ranges
}
