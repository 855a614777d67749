//! # bpm-detector
//!
//! Estimate the tempo and musical key of a song behind a video link.
//!
//! The crate downloads audio through `yt-dlp`, tracks beats on a mel
//! spectral-flux onset envelope, flags tempo estimates that look doubled or
//! halved, and estimates the key by correlating a constant-Q chromagram with
//! Krumhansl-Schmuckler profiles.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bpm_detector::{config::Config, detection::DetectionEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = DetectionEngine::with_ytdlp(Config::default())?;
//! let response = engine.analyze("https://www.youtube.com/watch?v=...").await?;
//!
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`audio`] - Decoding, beat tracking, tempo and key estimation
//! - [`source`] - Music classification and download behind [`MediaSource`]
//! - [`detection`] - The per-request pipeline and scratch file handling
//! - [`server`] - HTTP transport (feature `server`)
//! - [`config`] - Configuration management
//!
//! ## Custom Media Sources
//!
//! Anything that can classify and fetch audio can drive the engine by
//! implementing the [`MediaSource`] trait:
//!
//! ```rust,no_run
//! use std::path::{Path, PathBuf};
//! use async_trait::async_trait;
//! use bpm_detector::{MediaSource, Result};
//!
//! struct LocalLibrary;
//!
//! #[async_trait]
//! impl MediaSource for LocalLibrary {
//!     async fn is_music(&self, _url: &str) -> Result<bool> {
//!         Ok(true)
//!     }
//!
//!     async fn download(&self, url: &str, prefix: &Path) -> Result<PathBuf> {
//!         let wav = prefix.with_extension("wav");
//!         std::fs::copy(url, &wav)?;
//!         Ok(wav)
//!     }
//!
//!     async fn title(&self, url: &str) -> Option<String> {
//!         Some(url.to_string())
//!     }
//! }
//! ```

pub mod audio;
pub mod config;
pub mod detection;
pub mod error;
#[cfg(feature = "server")]
pub mod server;
pub mod source;

// Re-export commonly used types for convenience
pub use crate::{
    audio::{AnalysisResponse, AnalysisResult, AudioAnalyzer, MusicalKey, TempoNote},
    config::Config,
    detection::DetectionEngine,
    error::{DetectorError, FailureKind, Result},
    source::MediaSource,
};
