//! Pipeline stages, from boundary classification to the guardrail checks.

pub mod audit;
pub mod boundary;
pub mod config;
pub mod coverage;
pub mod grouping;
pub mod guardrails;
pub mod key_events;
pub mod keywords;
pub mod pipeline;
pub mod segment_builder;
pub mod summary;
