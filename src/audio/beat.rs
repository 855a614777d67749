//! Beat tracking: spectral-flux onset envelope, autocorrelation tempo
//! estimate, and a dynamic programming beat tracker that follows it.

use realfft::RealFftPlanner;

use crate::audio::spectrum::{apply_filterbank, mel_filterbank, power_spectrogram, power_to_db};
use crate::audio::types::{BeatTrack, TempoConfig};
use crate::error::{AudioError, Result};

/// Dynamic range kept by the log-mel spectrogram
const TOP_DB: f32 = 80.0;

/// Onset strength per STFT frame
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    pub values: Vec<f32>,
    pub frame_rate: f64,
}

impl OnsetEnvelope {
    pub fn is_silent(&self) -> bool {
        !self.values.iter().any(|&v| v > 0.0)
    }
}

pub struct BeatTracker {
    config: TempoConfig,
}

impl BeatTracker {
    pub fn new(config: TempoConfig) -> Self {
        Self { config }
    }

    /// Track beats in a mono signal sampled at `config.sample_rate`
    pub fn track(&self, samples: &[f32]) -> Result<BeatTrack> {
        let onsets = self.onset_envelope(samples)?;

        if onsets.is_silent() {
            tracing::debug!("Onset envelope is empty, no beats to track");
            return Ok(BeatTrack {
                global_bpm: 0.0,
                frames: vec![],
                frame_rate: onsets.frame_rate,
            });
        }

        let global_bpm = self.estimate_tempo(&onsets)?;
        let frames = self.beat_frames(&onsets, global_bpm);

        tracing::debug!(
            "Beat tracking: {} frames, tempo {:.2} BPM, {} beats",
            onsets.values.len(),
            global_bpm,
            frames.len()
        );

        Ok(BeatTrack {
            global_bpm,
            frames,
            frame_rate: onsets.frame_rate,
        })
    }

    /// Mean positive log-mel flux between consecutive frames
    pub fn onset_envelope(&self, samples: &[f32]) -> Result<OnsetEnvelope> {
        let config = &self.config;
        let spectra = power_spectrogram(samples, config.n_fft, config.hop_length)?;
        let filterbank = mel_filterbank(config.sample_rate, config.n_fft, config.n_mels);

        let mut mel = apply_filterbank(&spectra, &filterbank);
        power_to_db(&mut mel, TOP_DB);

        let mut values = Vec::with_capacity(mel.len());
        if !mel.is_empty() {
            values.push(0.0);
        }
        for pair in mel.windows(2) {
            let flux: f32 = pair[1]
                .iter()
                .zip(&pair[0])
                .map(|(curr, prev)| (curr - prev).max(0.0))
                .sum();
            values.push(flux / config.n_mels as f32);
        }

        Ok(OnsetEnvelope {
            values,
            frame_rate: config.frame_rate(),
        })
    }

    /// Global tempo from the autocorrelation of the onset envelope, weighted
    /// by a log-normal prior around `start_bpm`. Returns 0.0 when the
    /// envelope is shorter than one period at `max_bpm`.
    pub fn estimate_tempo(&self, onsets: &OnsetEnvelope) -> Result<f64> {
        let config = &self.config;
        let autocorr = autocorrelate(&onsets.values, config.max_lag_frames)?;

        let mut best: Option<(usize, f64)> = None;
        for (lag, &value) in autocorr.iter().enumerate().skip(1) {
            let bpm = 60.0 * onsets.frame_rate / lag as f64;
            if bpm > config.max_bpm {
                continue;
            }

            let octaves = (bpm.log2() - config.start_bpm.log2()) / config.std_bpm;
            let weighted = value as f64 * (-0.5 * octaves * octaves).exp();

            if best.map_or(true, |(_, score)| weighted > score) {
                best = Some((lag, weighted));
            }
        }

        match best {
            Some((lag, _)) => Ok(60.0 * onsets.frame_rate / lag as f64),
            None => {
                // Too short to hold a single period at max_bpm
                tracing::debug!("No autocorrelation lag within the tempo range");
                Ok(0.0)
            }
        }
    }

    /// Beat frames that best fit both the onsets and the tempo period
    pub fn beat_frames(&self, onsets: &OnsetEnvelope, bpm: f64) -> Vec<usize> {
        if bpm <= 0.0 || onsets.is_silent() {
            return vec![];
        }

        let period = (60.0 * onsets.frame_rate / bpm).round().max(1.0) as usize;
        let local = local_score(&normalize(&onsets.values), period);
        let (backlink, cumulative) = track_dp(&local, period, self.config.tightness);

        let Some(last) = last_beat(&cumulative) else {
            return vec![];
        };

        let mut beats = vec![last];
        let mut current = last;
        while let Some(prev) = backlink[current] {
            beats.push(prev);
            current = prev;
        }
        beats.reverse();

        trim_beats(&local, &beats, self.config.trim)
    }
}

/// Autocorrelation for lags `0..max_lag`, computed through the FFT
fn autocorrelate(values: &[f32], max_lag: usize) -> Result<Vec<f32>> {
    let max_lag = max_lag.min(values.len());
    if max_lag == 0 {
        return Ok(vec![]);
    }

    let n = (2 * values.len()).next_power_of_two();
    let mut planner = RealFftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut buffer = forward.make_input_vec();
    buffer[..values.len()].copy_from_slice(values);
    let mut spectrum = forward.make_output_vec();

    let fft_failed = |_| AudioError::AnalysisFailed {
        reason: "FFT processing failed".to_string(),
    };

    forward.process(&mut buffer, &mut spectrum).map_err(fft_failed)?;
    for bin in spectrum.iter_mut() {
        *bin = bin.norm_sqr().into();
    }
    inverse.process(&mut spectrum, &mut buffer).map_err(fft_failed)?;

    Ok(buffer[..max_lag].iter().map(|v| v / n as f32).collect())
}

/// Scale to unit standard deviation
fn normalize(values: &[f32]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0).max(1.0);
    let std = variance.sqrt() + f64::EPSILON;

    values.iter().map(|&v| v as f64 / std).collect()
}

/// Onsets smoothed by a Gaussian a 32nd of a beat wide
fn local_score(onsets: &[f64], period: usize) -> Vec<f64> {
    let half = period as isize;
    let kernel: Vec<f64> = (-half..=half)
        .map(|i| (-0.5 * (i as f64 * 32.0 / period as f64).powi(2)).exp())
        .collect();

    (0..onsets.len() as isize)
        .map(|t| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, weight)| {
                    let idx = t + k as isize - half;
                    (0..onsets.len() as isize)
                        .contains(&idx)
                        .then(|| onsets[idx as usize] * weight)
                })
                .sum()
        })
        .collect()
}

/// Forward pass of the beat DP. Each frame links to the best predecessor
/// between half a period and two periods back; frames before the first
/// real onset start a new chain.
fn track_dp(local: &[f64], period: usize, tightness: f64) -> (Vec<Option<usize>>, Vec<f64>) {
    let period_f = period as f64;
    let far = 2 * period;
    let near = ((period_f / 2.0).round() as usize).max(1);

    // Transition weight for a predecessor `distance` frames back
    let transition: Vec<f64> = (near..=far)
        .map(|distance| -tightness * (distance as f64 / period_f).ln().powi(2))
        .collect();

    let onset_floor = 0.01 * local.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut backlink = vec![None; local.len()];
    let mut cumulative = vec![0.0; local.len()];
    let mut first_beat = true;

    for i in 0..local.len() {
        let mut best_score = f64::NEG_INFINITY;
        let mut best_prev = None;

        for (offset, &weight) in transition.iter().enumerate() {
            let distance = near + offset;
            let (score, prev) = match i.checked_sub(distance) {
                Some(prev) => (weight + cumulative[prev], Some(prev)),
                // Virtual predecessor before the start of the track
                None => (weight, None),
            };
            if score > best_score {
                best_score = score;
                best_prev = prev;
            }
        }

        cumulative[i] = local[i] + best_score;

        if first_beat && local[i] < onset_floor {
            backlink[i] = None;
        } else {
            backlink[i] = best_prev;
            first_beat = false;
        }
    }

    (backlink, cumulative)
}

/// Last local maximum of the cumulative score that is at least half the
/// median peak height
fn last_beat(cumulative: &[f64]) -> Option<usize> {
    let n = cumulative.len();
    let is_peak = |i: usize| {
        let prev = if i == 0 { cumulative[0] } else { cumulative[i - 1] };
        let next = if i + 1 == n { cumulative[i] } else { cumulative[i + 1] };
        cumulative[i] > prev && cumulative[i] >= next
    };

    let mut peaks: Vec<f64> = (0..n).filter(|&i| is_peak(i)).map(|i| cumulative[i]).collect();
    if peaks.is_empty() {
        return None;
    }
    peaks.sort_by(|a, b| a.total_cmp(b));
    let median = if peaks.len() % 2 == 1 {
        peaks[peaks.len() / 2]
    } else {
        (peaks[peaks.len() / 2 - 1] + peaks[peaks.len() / 2]) / 2.0
    };

    (0..n).rev().find(|&i| is_peak(i) && 2.0 * cumulative[i] > median)
}

/// Drop leading and trailing beats whose smoothed onset strength is weak
fn trim_beats(local: &[f64], beats: &[usize], trim: bool) -> Vec<usize> {
    if beats.is_empty() {
        return vec![];
    }

    // 5-point Hann [0, 0.5, 1, 0.5, 0], centred
    let strength: Vec<f64> = beats.iter().map(|&b| local[b]).collect();
    let smoothed: Vec<f64> = (0..strength.len())
        .map(|i| {
            let at = |j: isize| {
                let idx = i as isize + j;
                if idx >= 0 && (idx as usize) < strength.len() {
                    strength[idx as usize]
                } else {
                    0.0
                }
            };
            0.5 * at(-1) + at(0) + 0.5 * at(1)
        })
        .collect();

    let threshold = if trim {
        0.5 * (smoothed.iter().map(|v| v * v).sum::<f64>() / smoothed.len() as f64).sqrt()
    } else {
        0.0
    };

    let first = smoothed.iter().position(|&v| v > threshold);
    let last = smoothed.iter().rposition(|&v| v > threshold);

    match (first, last) {
        // The end bound is exclusive, which always sheds the final beat
        (Some(first), Some(last)) => beats[first..last].to_vec(),
        _ => vec![],
    }
}
