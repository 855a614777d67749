//! # Audio Analysis Module
//!
//! Decodes audio files and estimates the tempo and musical key of a song.
//!
//! ## Core Features
//!
//! - **Beat Tracking**: mel spectral-flux onsets, autocorrelation tempo and
//!   dynamic-programming beat placement
//! - **Tempo Heuristic**: flags a global tempo that looks doubled or halved
//!   compared with the beat-to-beat intervals
//! - **Key Estimation**: constant-Q chroma correlated with Krumhansl-Schmuckler
//!   profiles
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bpm_detector::audio::{AudioAnalyzer, AudioLoader};
//!
//! # fn main() -> anyhow::Result<()> {
//! let audio_data = AudioLoader::load("song.wav")?;
//!
//! let analyzer = AudioAnalyzer::new();
//! let result = analyzer.analyze(&audio_data)?;
//!
//! println!("BPM: {:?} ({})", result.bpm, result.note);
//! println!("Key: {}", result.key);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod beat;
pub mod chroma;
pub mod key;
pub mod loader;
pub mod spectrum;
pub mod tempo;
pub mod types;

pub use analyzer::AudioAnalyzer;
pub use beat::BeatTracker;
pub use key::KeyEstimator;
pub use loader::AudioLoader;
pub use tempo::TempoEstimator;
pub use types::{
    AnalysisResponse, AnalysisResult, AudioData, BeatTrack, KeyConfig, Mode,
    MusicalKey, TempoConfig, TempoNote, TempoReading,
};
