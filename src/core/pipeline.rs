/// The timeline pipeline: Events → Segments → Blocks orchestration.
///
/// Wires together input validation, boundary classification, segment
/// construction, key-event selection, block grouping, coverage
/// certification and the guardrail checkpoints.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::audit::BoundaryAuditLog;
use crate::core::boundary::count_lead_changes;
use crate::core::config::{ConfigError, EngineConfig, Sport};
use crate::core::coverage::{validate_blocks, validate_segments, CoverageReport};
use crate::core::grouping::{BlockGrouper, GroupingError};
use crate::core::guardrails::{check_guardrails, Checkpoint, GuardrailResult};
use crate::core::segment_builder::{BuildError, SegmentBuilder};
use crate::core::summary::BlockSummary;
use crate::schema::attachment::{
    AttachmentCandidate, AttachmentScorer, DefaultAttachmentScorer, ScoredAttachment,
};
use crate::schema::block::Block;
use crate::schema::event::{validate_events, Event, InputError};
use crate::schema::segment::Segment;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input error: {0}")]
    Input(#[from] InputError),
    #[error("segment construction error: {0}")]
    Build(#[from] BuildError),
    #[error("grouping error: {0}")]
    Grouping(#[from] GroupingError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("expected {expected} narratives, got {found}")]
    NarrativeCount { expected: usize, found: usize },
}

/// Everything one run produces. Segments borrow the caller's events.
#[derive(Debug, Serialize)]
pub struct Timeline<'a> {
    pub segments: Vec<Segment<'a>>,
    pub blocks: Vec<Block>,
    pub segment_report: CoverageReport,
    pub block_report: CoverageReport,
    pub guardrails: GuardrailResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<BoundaryAuditLog>,
}

impl<'a> Timeline<'a> {
    /// Both coverage reports and the post-grouping checkpoint passed.
    pub fn certified(&self) -> bool {
        self.segment_report.passed && self.block_report.passed && self.guardrails.passed
    }

    /// Summaries for blocks `0..=index` only. Later blocks are never
    /// exposed while an earlier one is being narrated.
    pub fn summaries_through(&self, index: usize) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .take(index.saturating_add(1))
            .map(|b| BlockSummary::from_block(b, &self.segments))
            .collect()
    }

    /// Store one narrative per block, in block order.
    pub fn attach_narratives<S: Into<String>>(
        &mut self,
        narratives: Vec<S>,
    ) -> Result<(), EngineError> {
        if narratives.len() != self.blocks.len() {
            return Err(EngineError::NarrativeCount {
                expected: self.blocks.len(),
                found: narratives.len(),
            });
        }
        for (block, text) in self.blocks.iter_mut().zip(narratives) {
            block.narrative = Some(text.into());
        }
        Ok(())
    }
}

/// The top-level timeline engine. Built via `TimelineEngine::builder()`.
pub struct TimelineEngine {
    config: EngineConfig,
    scorer: Box<dyn AttachmentScorer>,
    audit: bool,
    record_quiet: bool,
}

/// Builder for constructing a `TimelineEngine`.
pub struct TimelineEngineBuilder {
    sport: Option<Sport>,
    config_path: Option<String>,
    /// Directly provided config (for testing without files).
    config: Option<EngineConfig>,
    scorer: Option<Box<dyn AttachmentScorer>>,
    audit: bool,
    record_quiet: bool,
}

impl TimelineEngine {
    pub fn builder() -> TimelineEngineBuilder {
        TimelineEngineBuilder {
            sport: None,
            config_path: None,
            config: None,
            scorer: None,
            audit: false,
            record_quiet: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Score raw attachment candidates with the configured scorer, then run.
    pub fn run<'a>(
        &self,
        events: &'a [Event],
        candidates: &[AttachmentCandidate],
    ) -> Result<Timeline<'a>, EngineError> {
        let scored = self.scorer.score_all(candidates);
        self.run_scored(events, &scored)
    }

    /// Run with attachments that were scored elsewhere.
    pub fn run_scored<'a>(
        &self,
        events: &'a [Event],
        attachments: &[ScoredAttachment],
    ) -> Result<Timeline<'a>, EngineError> {
        validate_events(events)?;
        debug!(events = events.len(), "input accepted");

        let mut audit = self.audit.then(|| {
            if self.record_quiet {
                BoundaryAuditLog::verbose()
            } else {
                BoundaryAuditLog::new()
            }
        });
        let segments = SegmentBuilder::new(&self.config)
            .min_segments(self.config.blocks.min_blocks)
            .build(events, audit.as_mut())?;

        let lead_changes = count_lead_changes(events);
        let blocks = BlockGrouper::new(&self.config).group(
            &segments,
            lead_changes,
            events.len(),
            attachments,
        )?;

        let segment_report = validate_segments(&segments, Some(events), false);
        let block_report = validate_blocks(&blocks, &segments, false);
        let guardrails = check_guardrails(&blocks, Checkpoint::PostGrouping, &self.config.guardrails);

        info!(
            events = events.len(),
            segments = segments.len(),
            blocks = blocks.len(),
            lead_changes,
            fingerprint = %segment_report.fingerprint,
            certified = segment_report.passed && block_report.passed && guardrails.passed,
            "timeline built"
        );

        Ok(Timeline {
            segments,
            blocks,
            segment_report,
            block_report,
            guardrails,
            audit,
        })
    }

    /// Second guardrail checkpoint, after narratives are attached.
    pub fn pre_render_check(&self, timeline: &Timeline<'_>) -> GuardrailResult {
        check_guardrails(&timeline.blocks, Checkpoint::PreRender, &self.config.guardrails)
    }
}

impl TimelineEngineBuilder {
    /// Start from a sport preset instead of the basketball defaults.
    pub fn sport(mut self, sport: Sport) -> Self {
        self.sport = Some(sport);
        self
    }

    /// Load the config from a RON file (overrides any sport preset).
    pub fn config_file(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Provide a config directly (for testing without files).
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_scorer(mut self, scorer: impl AttachmentScorer + 'static) -> Self {
        self.scorer = Some(Box::new(scorer));
        self
    }

    /// Keep a boundary audit log for each run.
    pub fn audit(mut self, enabled: bool) -> Self {
        self.audit = enabled;
        self
    }

    /// Audit log also records events no rule fired on.
    pub fn audit_quiet_events(mut self, enabled: bool) -> Self {
        self.record_quiet = enabled;
        self
    }

    pub fn build(self) -> Result<TimelineEngine, EngineError> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(Path::new(&path))?,
            (None, None) => self.sport.map(EngineConfig::for_sport).unwrap_or_default(),
        };
        config.validate()?;

        Ok(TimelineEngine {
            config,
            scorer: self
                .scorer
                .unwrap_or_else(|| Box::new(DefaultAttachmentScorer::default())),
            audit: self.audit,
            record_quiet: self.record_quiet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::event::fixtures::*;
    use crate::schema::segment::ReasonCode;

    /// Four quarters of steady, alternating scoring.
    fn game() -> Vec<Event> {
        let mut events = Vec::new();
        let (mut home, mut away) = (0, 0);
        for i in 0..240u32 {
            let period = (i / 60 + 1) as u8;
            match i % 7 {
                2 => home += 2,
                5 => away += 2,
                _ => {}
            }
            events.push(play(i, period, home, away));
        }
        events
    }

    #[test]
    fn run_produces_certified_timeline() {
        let events = game();
        let engine = TimelineEngine::builder().build().unwrap();
        let timeline = engine.run(&events, &[]).unwrap();
        assert!(timeline.certified(), "{:?}", timeline.segment_report.errors);
        assert!((4..=7).contains(&timeline.blocks.len()));
        assert!(timeline.audit.is_none());
    }

    #[test]
    fn run_is_deterministic() {
        let events = game();
        let engine = TimelineEngine::builder().audit(true).build().unwrap();
        let a = engine.run(&events, &[]).unwrap();
        let b = engine.run(&events, &[]).unwrap();
        assert_eq!(a.segment_report.fingerprint, b.segment_report.fingerprint);
        assert_eq!(a.block_report.fingerprint, b.block_report.fingerprint);
        assert_eq!(a.audit.unwrap().entries(), b.audit.unwrap().entries());
    }

    #[test]
    fn short_single_period_game_still_gets_minimum_blocks() {
        let events: Vec<Event> = (0..25u32)
            .map(|i| play(i, 1, (i / 12) * 2, 0))
            .collect();
        let engine = TimelineEngine::builder().audit(true).build().unwrap();
        let timeline = engine.run(&events, &[]).unwrap();
        assert!(timeline.certified(), "{:?}", timeline.segment_report.errors);
        assert_eq!(timeline.blocks.len(), 4);
        assert!(timeline
            .segments
            .iter()
            .any(|s| s.has_reason(ReasonCode::ForcedSplit)));
        assert!(timeline.audit.unwrap().entries().iter().any(|e| e
            .reasons
            .iter()
            .any(|r| r.code == ReasonCode::ForcedSplit)));
    }

    #[test]
    fn empty_input_is_rejected() {
        let engine = TimelineEngine::builder().build().unwrap();
        assert!(matches!(
            engine.run(&[], &[]),
            Err(EngineError::Input(InputError::Empty))
        ));
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let mut config = EngineConfig::default();
        config.boundary.soft_cap_events = 60;
        assert!(matches!(
            TimelineEngine::builder().with_config(config).build(),
            Err(EngineError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn narratives_must_match_block_count() {
        let events = game();
        let engine = TimelineEngine::builder().build().unwrap();
        let mut timeline = engine.run(&events, &[]).unwrap();
        assert!(matches!(
            timeline.attach_narratives(vec!["only one"]),
            Err(EngineError::NarrativeCount { found: 1, .. })
        ));
        assert!(!engine.pre_render_check(&timeline).passed);

        let text = vec!["word"; 30].join(" ");
        let narratives = vec![text; timeline.blocks.len()];
        timeline.attach_narratives(narratives).unwrap();
        assert!(engine.pre_render_check(&timeline).passed);
    }

    #[test]
    fn summaries_never_run_ahead() {
        let events = game();
        let engine = TimelineEngine::builder().build().unwrap();
        let timeline = engine.run(&events, &[]).unwrap();
        assert_eq!(timeline.summaries_through(0).len(), 1);
        assert_eq!(timeline.summaries_through(2).len(), 3);
        assert_eq!(
            timeline.summaries_through(usize::MAX).len(),
            timeline.blocks.len()
        );
    }
}
