//! Engine configuration: thresholds, keyword tables and output limits.
//!
//! Every table can be loaded from RON; missing fields fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::keywords::KeywordTables;
use crate::schema::lead::LeadLadder;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Sports with a built-in preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    Nba,
    Ncaab,
    Nhl,
    Nfl,
}

/// Boundary rule thresholds, in events unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Hard ceiling on events since the last boundary.
    pub absolute_max_events: usize,
    /// Soft ceiling on events since the last boundary.
    pub soft_cap_events: usize,
    /// Minimum open-segment size for momentum triggers (runs).
    pub min_segment_events: usize,
    /// Minimum open-segment size for stoppage, review and high-impact
    /// triggers.
    pub stoppage_min_events: usize,
    /// Minimum open-segment size for possession changes.
    pub possession_min_events: usize,
    /// Stoppages closer than this many events collapse into one cluster.
    pub cluster_window: usize,
    /// A tier crossing that reverts within this many events is suppressed.
    pub hysteresis_events: usize,
    /// Unanswered points that count as a run.
    pub run_min_points: u32,
    /// Crunch time: seconds left in the final period or overtime.
    pub crunch_seconds: f32,
    /// Crunch time: largest margin that still counts as close.
    pub crunch_max_margin: u32,
    /// Periods in regulation; anything later is overtime.
    pub regulation_periods: u8,
    /// Soft boundaries closing a segment shorter than this are demoted.
    pub merge_min_events: usize,
    /// A short segment with more scoring plays than this keeps its
    /// boundary...
    pub merge_keep_scoring_events: usize,
    /// ...provided those plays add up to more than this many points.
    pub merge_keep_points: u32,
    pub lead_ladder_enabled: bool,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            absolute_max_events: 50,
            soft_cap_events: 30,
            min_segment_events: 15,
            stoppage_min_events: 5,
            possession_min_events: 10,
            cluster_window: 3,
            hysteresis_events: 2,
            run_min_points: 8,
            crunch_seconds: 300.0,
            crunch_max_margin: 5,
            regulation_periods: 4,
            merge_min_events: 8,
            merge_keep_scoring_events: 2,
            merge_keep_points: 5,
            lead_ladder_enabled: true,
        }
    }
}

impl BoundaryConfig {
    /// Scoring plays only split a segment once it holds two thirds of the
    /// soft cap.
    pub fn scoring_min_events(&self) -> usize {
        (self.soft_cap_events * 2).div_ceil(3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Key events kept per segment when segments roll up into blocks.
    pub per_segment_cap: usize,
    /// Key events kept per block after the union.
    pub per_block_cap: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            per_segment_cap: 2,
            per_block_cap: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub min_blocks: usize,
    pub max_blocks: usize,
    /// Lead changes needed for the first extra block.
    pub lead_changes_for_extra: usize,
    /// Lead changes needed for the second extra block.
    pub lead_changes_for_second_extra: usize,
    /// Event count that marks a long game (one more block).
    pub long_game_events: usize,
    /// Net points over one segment that make its end a run boundary.
    pub large_run_points: u32,
    pub max_attachments_total: usize,
    pub max_attachments_per_block: usize,
    /// Attachments scoring below this are never placed.
    pub min_attachment_score: f64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            min_blocks: 4,
            max_blocks: 7,
            lead_changes_for_extra: 3,
            lead_changes_for_second_extra: 6,
            long_game_events: 500,
            large_run_points: 8,
            max_attachments_total: 5,
            max_attachments_per_block: 1,
            min_attachment_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailLimits {
    pub max_blocks: usize,
    pub min_blocks: usize,
    pub max_attachments_total: usize,
    pub max_attachments_per_block: usize,
    pub min_block_words: usize,
    pub max_block_words: usize,
    pub max_total_words: usize,
}

impl Default for GuardrailLimits {
    fn default() -> Self {
        Self {
            max_blocks: 7,
            min_blocks: 4,
            max_attachments_total: 5,
            max_attachments_per_block: 1,
            min_block_words: 20,
            max_block_words: 150,
            max_total_words: 700,
        }
    }
}

/// Complete static configuration for one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub boundary: BoundaryConfig,
    pub lead_ladder: LeadLadder,
    pub keywords: KeywordTables,
    pub selection: SelectionConfig,
    pub blocks: BlockConfig,
    pub guardrails: GuardrailLimits,
}

impl EngineConfig {
    pub fn for_sport(sport: Sport) -> Self {
        let mut config = Self::default();
        match sport {
            Sport::Nba => {}
            Sport::Ncaab => {
                config.lead_ladder = LeadLadder::new(vec![3, 6, 10, 15]);
                config.boundary.regulation_periods = 2;
                config.blocks.long_game_events = 420;
            }
            Sport::Nhl => {
                config.lead_ladder = LeadLadder::new(vec![1, 2, 3]);
                config.boundary.regulation_periods = 3;
                config.boundary.run_min_points = 2;
                config.boundary.crunch_max_margin = 1;
                config.blocks.long_game_events = 320;
                config.blocks.large_run_points = 2;
            }
            Sport::Nfl => {
                config.lead_ladder = LeadLadder::new(vec![3, 7, 14, 21]);
                config.boundary.run_min_points = 14;
                config.boundary.crunch_max_margin = 8;
                config.blocks.long_game_events = 180;
                config.blocks.large_run_points = 14;
            }
        }
        config
    }

    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the rules contradict each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.boundary;
        if b.absolute_max_events == 0 || b.soft_cap_events == 0 {
            return Err(ConfigError::Invalid("event caps must be positive".into()));
        }
        if b.soft_cap_events >= b.absolute_max_events {
            return Err(ConfigError::Invalid(format!(
                "soft cap {} must be below absolute max {}",
                b.soft_cap_events, b.absolute_max_events
            )));
        }
        if b.regulation_periods == 0 {
            return Err(ConfigError::Invalid("regulation_periods must be positive".into()));
        }
        if !self.lead_ladder.is_sorted() {
            return Err(ConfigError::Invalid(format!(
                "lead ladder thresholds must be strictly ascending: {:?}",
                self.lead_ladder.thresholds
            )));
        }
        let blocks = &self.blocks;
        if blocks.min_blocks < 2 || blocks.min_blocks > blocks.max_blocks {
            return Err(ConfigError::Invalid(format!(
                "block range {}..={} is empty or too small",
                blocks.min_blocks, blocks.max_blocks
            )));
        }
        // The grouper must never build what the guardrails reject.
        let limits = &self.guardrails;
        if blocks.min_blocks < limits.min_blocks || blocks.max_blocks > limits.max_blocks {
            return Err(ConfigError::Invalid(format!(
                "block range {}..={} falls outside guardrail range {}..={}",
                blocks.min_blocks, blocks.max_blocks, limits.min_blocks, limits.max_blocks
            )));
        }
        if blocks.max_attachments_total > limits.max_attachments_total
            || blocks.max_attachments_per_block > limits.max_attachments_per_block
        {
            return Err(ConfigError::Invalid(format!(
                "attachment caps {}/{} exceed guardrail caps {}/{}",
                blocks.max_attachments_total,
                blocks.max_attachments_per_block,
                limits.max_attachments_total,
                limits.max_attachments_per_block
            )));
        }
        if self.selection.per_segment_cap == 0 || self.selection.per_block_cap == 0 {
            return Err(ConfigError::Invalid("key event caps must be positive".into()));
        }
        Ok(())
    }
}
