//! # Detection Engine
//!
//! Ties a media source, the scratch directory and the audio analyzer
//! together into one request pipeline.

pub mod engine;
pub mod scratch;

pub use engine::DetectionEngine;
pub use scratch::ScratchSpace;
