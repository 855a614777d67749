//! Key estimation by correlating the average chroma profile with the
//! Krumhansl-Schmuckler major and minor profiles.

use crate::audio::chroma::ChromaExtractor;
use crate::audio::types::{AudioData, KeyConfig, Mode, MusicalKey};
use crate::error::Result;

/// Krumhansl-Schmuckler major profile, tonic at index 0
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor profile, tonic at index 0
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

pub struct KeyEstimator {
    chroma: ChromaExtractor,
    sample_rate: u32,
}

impl KeyEstimator {
    pub fn new(config: KeyConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            chroma: ChromaExtractor::new(config),
        }
    }

    /// Estimate the key of a waveform. Silence still yields a label.
    pub fn estimate_key(&self, audio: &AudioData) -> Result<MusicalKey> {
        let samples = audio.mono_at(self.sample_rate)?;
        let chromagram = self.chroma.chromagram(&samples);
        let profile = chromagram.mean_profile();

        let key = Self::key_from_profile(&profile);

        tracing::debug!(
            "Chroma profile over {} frames: {:?} -> {}",
            chromagram.frames.len(),
            profile,
            key
        );

        Ok(key)
    }

    /// Best-matching key for a 12-bin pitch-class profile (index 0 = C).
    /// Major wins ties against minor.
    pub fn key_from_profile(profile: &[f64; 12]) -> MusicalKey {
        let major = correlations(profile, &MAJOR_PROFILE);
        let minor = correlations(profile, &MINOR_PROFILE);

        let (major_tonic, major_score) = argmax(&major);
        let (minor_tonic, minor_score) = argmax(&minor);

        if major_score >= minor_score {
            MusicalKey::new(major_tonic, Mode::Major)
        } else {
            MusicalKey::new(minor_tonic, Mode::Minor)
        }
    }
}

impl Default for KeyEstimator {
    fn default() -> Self {
        Self::new(KeyConfig::default())
    }
}

/// Correlation of `reference` with the profile rotated to each tonic
fn correlations(profile: &[f64; 12], reference: &[f64; 12]) -> [f64; 12] {
    let mut scores = [0.0; 12];
    for (tonic, score) in scores.iter_mut().enumerate() {
        let mut rotated = *profile;
        rotated.rotate_left(tonic);
        *score = pearson(&rotated, reference);
    }
    scores
}

/// Pearson correlation; 0.0 when either side has no variance
fn pearson(a: &[f64; 12], b: &[f64; 12]) -> f64 {
    let mean_a = a.iter().sum::<f64>() / 12.0;
    let mean_b = b.iter().sum::<f64>() / 12.0;

    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        covariance += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denominator = (var_a * var_b).sqrt();
    if denominator > 0.0 {
        covariance / denominator
    } else {
        0.0
    }
}

/// First index of the maximum
fn argmax(scores: &[f64; 12]) -> (usize, f64) {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, score)| {
            if score > best.1 {
                (i, score)
            } else {
                best
            }
        })
}
