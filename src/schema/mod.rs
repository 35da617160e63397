//! Value types shared by every pipeline stage.

pub mod attachment;
pub mod block;
pub mod event;
pub mod lead;
pub mod segment;
