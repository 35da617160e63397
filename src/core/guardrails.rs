//! Hard and soft limits on the final output shape.
//!
//! Guardrails run at two checkpoints. Right after grouping only the
//! structural limits apply; right before rendering the narrative fields are
//! checked as well. Violations come back as data, never as a panic.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::core::config::GuardrailLimits;
use crate::schema::block::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    PostGrouping,
    PreRender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailViolationItem {
    pub invariant_name: &'static str,
    pub severity: Severity,
    pub detail: String,
}

/// Counts observed while checking, kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GuardrailMetrics {
    pub block_count: usize,
    pub total_attachments: usize,
    pub max_attachments_in_block: usize,
    pub total_words: usize,
    pub key_events: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailResult {
    pub checkpoint: Checkpoint,
    /// False when any violation has error severity. Warnings alone pass.
    pub passed: bool,
    pub violations: Vec<GuardrailViolationItem>,
    pub metrics: GuardrailMetrics,
}

impl GuardrailResult {
    pub fn errors(&self) -> impl Iterator<Item = &GuardrailViolationItem> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &GuardrailViolationItem> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
    }

    pub fn has(&self, invariant_name: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.invariant_name == invariant_name)
    }
}

impl fmt::Display for GuardrailResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.errors().map(|v| v.invariant_name).collect();
        write!(f, "{} guardrail error(s): {}", names.len(), names.join(", "))
    }
}

#[derive(Debug, Error)]
#[error("guardrails failed at {:?}: {result}", .result.checkpoint)]
pub struct GuardrailViolation {
    pub result: GuardrailResult,
}

pub fn check_guardrails(
    blocks: &[Block],
    checkpoint: Checkpoint,
    limits: &GuardrailLimits,
) -> GuardrailResult {
    let mut violations = Vec::new();
    let mut push = |invariant_name: &'static str, severity: Severity, detail: String| {
        violations.push(GuardrailViolationItem {
            invariant_name,
            severity,
            detail,
        });
    };

    let metrics = GuardrailMetrics {
        block_count: blocks.len(),
        total_attachments: blocks.iter().map(|b| b.attachments.len()).sum(),
        max_attachments_in_block: blocks.iter().map(|b| b.attachments.len()).max().unwrap_or(0),
        total_words: blocks.iter().map(Block::narrative_word_count).sum(),
        key_events: blocks.iter().map(|b| b.key_event_ids.len()).sum(),
    };

    if metrics.block_count > limits.max_blocks {
        push(
            "max_blocks",
            Severity::Error,
            format!("{} blocks exceeds the limit of {}", metrics.block_count, limits.max_blocks),
        );
    }
    if metrics.block_count < limits.min_blocks {
        push(
            "min_blocks",
            Severity::Warning,
            format!("{} blocks is below the expected minimum of {}", metrics.block_count, limits.min_blocks),
        );
    }
    if metrics.total_attachments > limits.max_attachments_total {
        push(
            "max_attachments_total",
            Severity::Error,
            format!(
                "{} attachments exceeds the game cap of {}",
                metrics.total_attachments, limits.max_attachments_total
            ),
        );
    }
    for block in blocks {
        if block.attachments.len() > limits.max_attachments_per_block {
            push(
                "max_attachments_per_block",
                Severity::Error,
                format!(
                    "block {} carries {} attachments (limit {})",
                    block.index,
                    block.attachments.len(),
                    limits.max_attachments_per_block
                ),
            );
        }
    }

    if checkpoint == Checkpoint::PreRender {
        for block in blocks {
            let text = block.narrative.as_deref().map(str::trim).unwrap_or("");
            if text.is_empty() {
                push(
                    "narrative_present",
                    Severity::Error,
                    format!("block {} ({}) has no narrative", block.index, block.role),
                );
                continue;
            }
            if block.key_event_ids.is_empty() {
                push(
                    "key_events_present",
                    Severity::Error,
                    format!("block {} has no key events to narrate", block.index),
                );
            }
            let words = block.narrative_word_count();
            if words < limits.min_block_words || words > limits.max_block_words {
                push(
                    "block_word_count",
                    Severity::Warning,
                    format!(
                        "block {} narrative has {} words (expected {}..={})",
                        block.index, words, limits.min_block_words, limits.max_block_words
                    ),
                );
            }
        }
        if metrics.total_words > limits.max_total_words {
            push(
                "total_word_count",
                Severity::Warning,
                format!(
                    "narratives total {} words (limit {})",
                    metrics.total_words, limits.max_total_words
                ),
            );
        }
    }

    let passed = violations.iter().all(|v| v.severity != Severity::Error);
    for v in &violations {
        match v.severity {
            Severity::Error => error!(invariant = v.invariant_name, ?checkpoint, "{}", v.detail),
            Severity::Warning => warn!(invariant = v.invariant_name, ?checkpoint, "{}", v.detail),
        }
    }

    GuardrailResult {
        checkpoint,
        passed,
        violations,
        metrics,
    }
}

/// Like [`check_guardrails`], but any error-severity violation becomes an
/// `Err` carrying the full result.
pub fn assert_guardrails(
    blocks: &[Block],
    checkpoint: Checkpoint,
    limits: &GuardrailLimits,
) -> Result<GuardrailResult, GuardrailViolation> {
    let result = check_guardrails(blocks, checkpoint, limits);
    if result.passed {
        Ok(result)
    } else {
        Err(GuardrailViolation { result })
    }
}
