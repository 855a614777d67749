use crate::audio::key::KeyEstimator;
use crate::audio::tempo::TempoEstimator;
use crate::audio::types::{AnalysisResult, AudioData, KeyConfig, TempoConfig};
use crate::error::{AudioError, Result};

/// Runs tempo and key estimation on one decoded song
pub struct AudioAnalyzer {
    tempo: TempoEstimator,
    key: KeyEstimator,
}

impl AudioAnalyzer {
    /// Create a new analyzer with default configuration
    pub fn new() -> Self {
        Self {
            tempo: TempoEstimator::default(),
            key: KeyEstimator::default(),
        }
    }

    /// Create a new analyzer with custom configuration
    pub fn with_config(tempo: TempoConfig, key: KeyConfig) -> Result<Self> {
        tempo
            .validate()
            .map_err(|details| AudioError::InvalidParameters { details })?;
        key.validate()
            .map_err(|details| AudioError::InvalidParameters { details })?;

        Ok(Self {
            tempo: TempoEstimator::new(tempo),
            key: KeyEstimator::new(key),
        })
    }

    /// Estimate tempo, then key. The key is produced even when no beats are found.
    pub fn analyze(&self, audio_data: &AudioData) -> Result<AnalysisResult> {
        tracing::info!(
            "Starting audio analysis for {:.1} seconds of audio ({} Hz, {} channels)",
            audio_data.duration,
            audio_data.sample_rate,
            audio_data.channels
        );

        let tempo = self.tempo.calc_bpm(audio_data)?;
        let key = self.key.estimate_key(audio_data)?;

        tracing::info!(
            "Analysis complete: BPM {:?}, note: {}, key: {}",
            tempo.bpm,
            tempo.note,
            key
        );

        Ok(AnalysisResult::new(tempo, key))
    }
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::TempoNote;

    fn create_test_audio_data(sample_rate: u32, seconds: f64) -> AudioData {
        // A sustained A with a click every half second
        let len = (sample_rate as f64 * seconds) as usize;
        let period = sample_rate as usize / 2;
        let burst = sample_rate as usize / 50;
        let samples: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let tone = 0.2 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
                let offset = i % period;
                let click = if offset < burst {
                    let ct = offset as f32 / sample_rate as f32;
                    0.6 * (-ct * 200.0).exp() * (2.0 * std::f32::consts::PI * 1500.0 * ct).sin()
                } else {
                    0.0
                };
                tone + click
            })
            .collect();

        AudioData::from_mono(samples, sample_rate)
    }

    #[test]
    fn test_audio_analysis() {
        let audio_data = create_test_audio_data(44100, 6.0);
        let analyzer = AudioAnalyzer::new();

        let result = analyzer.analyze(&audio_data).unwrap();
        assert!(result.bpm.is_some());
        assert_ne!(result.note, TempoNote::NoBeats);
    }

    #[test]
    fn test_silence_still_has_key() {
        let audio_data = AudioData::from_mono(vec![0.0; 44100 * 2], 44100);
        let result = AudioAnalyzer::new().analyze(&audio_data).unwrap();

        assert_eq!(result.bpm, None);
        assert_eq!(result.note, TempoNote::NoBeats);
        assert_eq!(result.key.to_string(), "C Major");
    }

    #[test]
    fn test_config_validation() {
        assert!(AudioAnalyzer::with_config(TempoConfig::default(), KeyConfig::default()).is_ok());

        let tempo = TempoConfig {
            hop_length: 0,
            ..TempoConfig::default()
        };
        assert!(AudioAnalyzer::with_config(tempo, KeyConfig::default()).is_err());

        let key = KeyConfig {
            bins_per_octave: 13,
            ..KeyConfig::default()
        };
        assert!(AudioAnalyzer::with_config(TempoConfig::default(), key).is_err());
    }
}
