use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::audio::loader::AudioLoader;
use crate::error::Result;

/// Decoded audio. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration in seconds
    pub duration: f64,
}

impl AudioData {
    /// Build an in-memory mono waveform, mostly useful for synthetic signals
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = samples.len() as f64 / sample_rate as f64;
        Self {
            samples,
            sample_rate,
            channels: 1,
            duration,
        }
    }

    /// Get mono mix of all channels
    pub fn mono_samples(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let mut mono = Vec::with_capacity(self.samples.len() / self.channels as usize);

        for chunk in self.samples.chunks(self.channels as usize) {
            let sum: f32 = chunk.iter().sum();
            mono.push(sum / self.channels as f32);
        }

        mono
    }

    /// Mono mix resampled to `sample_rate`
    pub fn mono_at(&self, sample_rate: u32) -> Result<Vec<f32>> {
        let mono = self.mono_samples();
        if sample_rate == self.sample_rate {
            return Ok(mono);
        }
        AudioLoader::resample_mono(&mono, self.sample_rate, sample_rate)
    }
}

/// Output of the beat tracker
#[derive(Debug, Clone)]
pub struct BeatTrack {
    /// Global tempo estimate in BPM (0.0 when the onset envelope is empty)
    pub global_bpm: f64,

    /// Beat positions as onset-envelope frame indices, ascending
    pub frames: Vec<usize>,

    /// Onset-envelope frames per second
    pub frame_rate: f64,
}

impl BeatTrack {
    /// Beat timestamps in seconds
    pub fn times(&self) -> Vec<f64> {
        self.frames
            .iter()
            .map(|&frame| frame as f64 / self.frame_rate)
            .collect()
    }

    /// Inter-beat intervals in seconds
    pub fn intervals(&self) -> Vec<f64> {
        self.times()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }
}

/// Diagnostic attached to a tempo estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempoNote {
    #[serde(rename = "OK")]
    Ok,

    #[serde(rename = "Detected possible tempo doubling")]
    PossibleDoubling,

    #[serde(rename = "Detected possible tempo halving")]
    PossibleHalving,

    #[serde(rename = "No beats detected")]
    NoBeats,
}

impl TempoNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::PossibleDoubling => "Detected possible tempo doubling",
            Self::PossibleHalving => "Detected possible tempo halving",
            Self::NoBeats => "No beats detected",
        }
    }
}

impl fmt::Display for TempoNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BPM plus the note explaining how much to trust it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoReading {
    pub bpm: Option<u32>,
    pub note: TempoNote,
}

impl TempoReading {
    pub fn no_beats() -> Self {
        Self {
            bpm: None,
            note: TempoNote::NoBeats,
        }
    }
}

/// Pitch class names, index 0 = C
pub const KEY_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => f.write_str("Major"),
            Self::Minor => f.write_str("Minor"),
        }
    }
}

/// One of the 24 major/minor keys. Serialized as its label, e.g. `"F# Minor"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MusicalKey {
    tonic: usize,
    mode: Mode,
}

impl MusicalKey {
    /// `tonic` is a pitch class; values past 11 wrap around the octave
    pub fn new(tonic: usize, mode: Mode) -> Self {
        Self {
            tonic: tonic % 12,
            mode,
        }
    }

    pub fn tonic(&self) -> usize {
        self.tonic
    }

    pub fn tonic_name(&self) -> &'static str {
        KEY_NAMES[self.tonic]
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic_name(), self.mode)
    }
}

impl FromStr for MusicalKey {
    type Err = String;

    fn from_str(label: &str) -> std::result::Result<Self, Self::Err> {
        let (name, mode) = label
            .trim()
            .split_once(' ')
            .ok_or_else(|| format!("Malformed key label: {label}"))?;

        let tonic = KEY_NAMES
            .iter()
            .position(|&candidate| candidate == name)
            .ok_or_else(|| format!("Unknown tonic: {name}"))?;

        let mode = match mode {
            "Major" => Mode::Major,
            "Minor" => Mode::Minor,
            other => return Err(format!("Unknown mode: {other}")),
        };

        Ok(Self::new(tonic, mode))
    }
}

impl TryFrom<String> for MusicalKey {
    type Error = String;

    fn try_from(label: String) -> std::result::Result<Self, Self::Error> {
        label.parse()
    }
}

impl From<MusicalKey> for String {
    fn from(key: MusicalKey) -> Self {
        key.to_string()
    }
}

/// Tempo and key of one song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub bpm: Option<u32>,
    pub note: TempoNote,
    pub key: MusicalKey,
}

impl AnalysisResult {
    pub fn new(tempo: TempoReading, key: MusicalKey) -> Self {
        Self {
            bpm: tempo.bpm,
            note: tempo.note,
            key,
        }
    }
}

/// Response body of a detection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub title: Option<String>,
    pub result: AnalysisResult,
}

/// Beat tracking and tempo heuristic parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Analysis sample rate (Hz)
    pub sample_rate: u32,

    /// STFT window size for the onset envelope
    pub n_fft: usize,

    /// STFT hop size, also the beat frame resolution
    pub hop_length: usize,

    /// Mel bands feeding the spectral flux
    pub n_mels: usize,

    /// Centre of the tempo prior
    pub start_bpm: f64,

    /// Width of the tempo prior in octaves
    pub std_bpm: f64,

    /// Fastest tempo the estimator may report
    pub max_bpm: f64,

    /// Longest autocorrelation lag considered, in frames
    pub max_lag_frames: usize,

    /// How strictly beats must follow the estimated period
    pub tightness: f64,

    /// Drop weak beats at the start and end of the track
    pub trim: bool,

    /// Largest |mode - global| still reported as agreement (BPM)
    pub agreement_tolerance: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            start_bpm: 120.0,
            std_bpm: 1.0,
            max_bpm: 320.0,
            max_lag_frames: 384,
            tightness: 100.0,
            trim: true,
            agreement_tolerance: 2.0,
        }
    }
}

impl TempoConfig {
    /// Onset-envelope frames per second
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_length as f64
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sample_rate == 0 {
            return Err("Sample rate must be positive".to_string());
        }

        if self.n_fft == 0 || !self.n_fft.is_power_of_two() {
            return Err("FFT size must be a power of two".to_string());
        }

        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err("Hop length must be between 1 and the FFT size".to_string());
        }

        if self.n_mels == 0 {
            return Err("At least one mel band is required".to_string());
        }

        if self.start_bpm <= 0.0 || self.max_bpm <= 0.0 || self.std_bpm <= 0.0 {
            return Err("Tempo prior parameters must be positive".to_string());
        }

        if self.max_lag_frames < 2 {
            return Err("Autocorrelation needs at least two lags".to_string());
        }

        if self.agreement_tolerance < 0.0 {
            return Err("Agreement tolerance cannot be negative".to_string());
        }

        Ok(())
    }
}

/// Constant-Q chroma parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Analysis sample rate (Hz)
    pub sample_rate: u32,

    /// Samples between chroma frames
    pub hop_length: usize,

    /// Lowest CQT bin frequency (Hz), C1 by default
    pub fmin: f64,

    /// Octaves covered by the CQT
    pub n_octaves: usize,

    /// CQT resolution; must be a multiple of 12
    pub bins_per_octave: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            hop_length: 2048,
            fmin: 32.703_195_662_574_83,
            n_octaves: 7,
            bins_per_octave: 36,
        }
    }
}

impl KeyConfig {
    pub fn n_bins(&self) -> usize {
        self.n_octaves * self.bins_per_octave
    }

    /// Centre frequency of the highest CQT bin
    pub fn fmax(&self) -> f64 {
        self.fmin * 2f64.powf((self.n_bins() - 1) as f64 / self.bins_per_octave as f64)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sample_rate == 0 || self.hop_length == 0 {
            return Err("Sample rate and hop length must be positive".to_string());
        }

        if self.bins_per_octave == 0 || self.bins_per_octave % 12 != 0 {
            return Err("Bins per octave must be a multiple of 12".to_string());
        }

        if self.n_octaves == 0 || self.fmin <= 0.0 {
            return Err("CQT range must be non-empty".to_string());
        }

        if self.fmax() >= self.sample_rate as f64 / 2.0 {
            return Err("CQT range exceeds the Nyquist frequency".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_data_mono_conversion() {
        let audio_data = AudioData {
            samples: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], // L, R, L, R, L, R
            sample_rate: 44100,
            channels: 2,
            duration: 1.0,
        };

        let mono = audio_data.mono_samples();
        assert_eq!(mono, vec![1.5, 3.5, 5.5]);
        assert_eq!(audio_data.mono_at(44100).unwrap(), mono);
    }

    #[test]
    fn test_beat_track_intervals() {
        let track = BeatTrack {
            global_bpm: 120.0,
            frames: vec![0, 43, 86, 130],
            frame_rate: 86.0,
        };

        let intervals = track.intervals();
        assert_eq!(intervals.len(), 3);
        assert!((intervals[0] - 0.5).abs() < 1e-9);
        assert!((intervals[2] - 44.0 / 86.0).abs() < 1e-9);
    }

    #[test]
    fn test_key_label_roundtrip() {
        for tonic in 0..12 {
            for mode in [Mode::Major, Mode::Minor] {
                let key = MusicalKey::new(tonic, mode);
                let parsed: MusicalKey = key.to_string().parse().unwrap();
                assert_eq!(parsed, key);
            }
        }

        assert_eq!(MusicalKey::new(13, Mode::Minor).to_string(), "C# Minor");
        assert!("H Major".parse::<MusicalKey>().is_err());
        assert!("C Dorian".parse::<MusicalKey>().is_err());
    }

    #[test]
    fn test_result_json_shape() {
        let result = AnalysisResult::new(
            TempoReading {
                bpm: Some(128),
                note: TempoNote::PossibleDoubling,
            },
            MusicalKey::new(9, Mode::Minor),
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "bpm": 128,
                "note": "Detected possible tempo doubling",
                "key": "A Minor"
            })
        );

        let no_beats = AnalysisResult::new(TempoReading::no_beats(), MusicalKey::new(0, Mode::Major));
        let json = serde_json::to_value(&no_beats).unwrap();
        assert!(json["bpm"].is_null());
        assert_eq!(json["note"], "No beats detected");
    }

    #[test]
    fn test_config_validation() {
        assert!(TempoConfig::default().validate().is_ok());
        assert!(KeyConfig::default().validate().is_ok());

        let invalid = TempoConfig {
            n_fft: 2000,
            ..Default::default()
        };
        assert!(invalid.validate().unwrap_err().contains("power of two"));

        let invalid = KeyConfig {
            bins_per_octave: 24 + 1,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = KeyConfig {
            sample_rate: 8000,
            ..Default::default()
        };
        assert!(invalid.validate().unwrap_err().contains("Nyquist"));
    }
}
