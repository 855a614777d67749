//! Short-time spectra shared by the estimators.

use realfft::RealFftPlanner;

use crate::error::{AudioError, Result};

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
        .collect()
}

/// Power spectrogram with centred frames (the signal is zero-padded by
/// `n_fft / 2` on both sides). Returns one `n_fft / 2 + 1` row per frame.
pub fn power_spectrogram(samples: &[f32], n_fft: usize, hop_length: usize) -> Result<Vec<Vec<f32>>> {
    if n_fft == 0 || hop_length == 0 {
        return Err(AudioError::InvalidParameters {
            details: format!("n_fft={} hop_length={}", n_fft, hop_length),
        }
        .into());
    }

    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    if padded.len() < n_fft {
        return Ok(Vec::new());
    }
    let n_frames = 1 + (padded.len() - n_fft) / hop_length;

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let window = hann_window(n_fft);

    let mut frames = Vec::with_capacity(n_frames);
    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;
        for ((slot, &sample), &w) in input
            .iter_mut()
            .zip(&padded[start..start + n_fft])
            .zip(&window)
        {
            *slot = sample * w;
        }

        fft.process(&mut input, &mut spectrum)
            .map_err(|_| AudioError::AnalysisFailed {
                reason: "FFT processing failed".to_string(),
            })?;

        frames.push(spectrum.iter().map(|c| c.norm_sqr()).collect());
    }

    Ok(frames)
}

fn hz_to_mel(hz: f64) -> f64 {
    // Slaney scale: linear below 1 kHz, logarithmic above
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Triangular, area-normalized mel filterbank (`n_mels` rows of
/// `n_fft / 2 + 1` weights) spanning 0 Hz to Nyquist
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f64 / 2.0;

    let bin_freqs: Vec<f64> = (0..n_bins)
        .map(|bin| bin as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let max_mel = hz_to_mel(fmax);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, centre, upper) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let norm = 2.0 / (upper - lower);

            bin_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - lower) / (centre - lower);
                    let falling = (upper - f) / (upper - centre);
                    (rising.min(falling).max(0.0) * norm) as f32
                })
                .collect()
        })
        .collect()
}

/// Project power spectra onto a filterbank
pub fn apply_filterbank(frames: &[Vec<f32>], filterbank: &[Vec<f32>]) -> Vec<Vec<f32>> {
    frames
        .iter()
        .map(|frame| {
            filterbank
                .iter()
                .map(|weights| weights.iter().zip(frame).map(|(w, p)| w * p).sum())
                .collect()
        })
        .collect()
}

/// Convert power to decibels in place, clipping everything more than
/// `top_db` below the loudest value
pub fn power_to_db(frames: &mut [Vec<f32>], top_db: f32) {
    let mut peak = f32::NEG_INFINITY;
    for value in frames.iter_mut().flat_map(|frame| frame.iter_mut()) {
        *value = 10.0 * value.max(1e-10).log10();
        peak = peak.max(*value);
    }

    let floor = peak - top_db;
    for value in frames.iter_mut().flat_map(|frame| frame.iter_mut()) {
        *value = value.max(floor);
    }
}
