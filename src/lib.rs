//! Timeline Engine: deterministic segmentation of game play-by-play.
//!
//! Turns an ordered stream of play events into contiguous segments split at
//! meaningful boundaries, picks the key plays of every segment, groups the
//! segments into a handful of narrative blocks with roles, and certifies the
//! result with coverage checks, content fingerprints and output guardrails.

pub mod core;
pub mod schema;

pub use crate::core::config::{EngineConfig, Sport};
pub use crate::core::pipeline::{EngineError, Timeline, TimelineEngine};
