//! Tempo estimation on top of the beat tracker.
//!
//! The beat tracker's global tempo comes from autocorrelation and can land an
//! octave away from what the individual beat intervals say. The estimator
//! compares the two and flags, but does not correct, a likely doubling or
//! halving. The reported BPM is always the global estimate.

use std::collections::BTreeMap;

use crate::audio::beat::BeatTracker;
use crate::audio::types::{AudioData, TempoConfig, TempoNote, TempoReading};
use crate::error::Result;

pub struct TempoEstimator {
    tracker: BeatTracker,
    config: TempoConfig,
}

impl TempoEstimator {
    pub fn new(config: TempoConfig) -> Self {
        Self {
            tracker: BeatTracker::new(config.clone()),
            config,
        }
    }

    /// Estimate the BPM of a waveform
    pub fn calc_bpm(&self, audio: &AudioData) -> Result<TempoReading> {
        tracing::debug!("Detecting BPM at {} Hz", self.config.sample_rate);

        let samples = audio.mono_at(self.config.sample_rate)?;
        let track = self.tracker.track(&samples)?;

        let reading = self.assess(track.global_bpm, &track.intervals());

        tracing::info!(
            "Finished detecting BPM: global {:.2}, {} beats, note: {}",
            track.global_bpm,
            track.frames.len(),
            reading.note
        );

        Ok(reading)
    }

    /// Compare the most common per-interval BPM with the global estimate.
    /// `intervals` are the inter-beat intervals in seconds.
    pub fn assess(&self, global_bpm: f64, intervals: &[f64]) -> TempoReading {
        if intervals.is_empty() {
            return TempoReading::no_beats();
        }

        let instantaneous: Vec<f64> = intervals
            .iter()
            .map(|interval| (60.0 / interval).round_ties_even())
            .collect();
        // A zero interval can only come from duplicate beats; it yields an
        // infinite BPM which never wins agreement checks below
        let bpm_mode = mode(&instantaneous).unwrap_or(f64::INFINITY);

        let tolerance = self.config.agreement_tolerance;
        let note = if (bpm_mode - global_bpm).abs() <= tolerance {
            TempoNote::Ok
        } else if (bpm_mode - 2.0 * global_bpm).abs() < tolerance {
            TempoNote::PossibleDoubling
        } else if (bpm_mode - 0.5 * global_bpm).abs() < tolerance {
            TempoNote::PossibleHalving
        } else {
            // Disagreement that is neither an octave up nor down is still
            // reported as OK
            TempoNote::Ok
        };

        tracing::debug!(
            "Interval mode {:.0} BPM vs global {:.2} BPM over {} intervals",
            bpm_mode,
            global_bpm,
            intervals.len()
        );

        TempoReading {
            bpm: Some(global_bpm.round_ties_even().max(0.0) as u32),
            note,
        }
    }
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new(TempoConfig::default())
    }
}

/// Most frequent value; ties go to the smallest. Non-finite values are ignored.
fn mode(values: &[f64]) -> Option<f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for value in values.iter().filter(|v| v.is_finite()) {
        *counts.entry(*value as i64).or_insert(0) += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (&value, &count) in &counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }

    best.map(|(value, _)| value as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::BeatTrack;

    /// Intervals between `count` beats spaced evenly at `bpm`, starting at 0.5 s
    fn beat_intervals(bpm: f64, count: usize) -> Vec<f64> {
        let times: Vec<f64> = (0..count).map(|i| 0.5 + i as f64 * 60.0 / bpm).collect();
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    /// Short decaying 1 kHz bursts every `period` samples
    fn click_track(period: usize, seconds: f64, sample_rate: u32) -> Vec<f32> {
        let len = (seconds * sample_rate as f64) as usize;
        let burst = (0.02 * sample_rate as f64) as usize;
        let mut samples = vec![0.0f32; len];

        let mut start = sample_rate as usize / 4;
        while start + burst < len {
            for i in 0..burst {
                let t = i as f32 / sample_rate as f32;
                samples[start + i] =
                    0.8 * (-t * 200.0).exp() * (2.0 * std::f32::consts::PI * 1000.0 * t).sin();
            }
            start += period;
        }

        samples
    }

    #[test]
    fn test_mode_prefers_smallest_on_tie() {
        assert_eq!(mode(&[120.0, 120.0, 60.0, 60.0, 240.0]), Some(60.0));
        assert_eq!(mode(&[128.0, 127.0, 128.0]), Some(128.0));
        assert_eq!(mode(&[]), None);
        assert_eq!(mode(&[f64::INFINITY]), None);
    }

    #[test]
    fn test_agreement_is_ok() {
        let estimator = TempoEstimator::default();
        let reading = estimator.assess(121.3, &beat_intervals(120.0, 16));

        assert_eq!(reading.bpm, Some(121));
        assert_eq!(reading.note, TempoNote::Ok);
    }

    #[test]
    fn test_intervals_at_double_tempo_flag_doubling() {
        let estimator = TempoEstimator::default();
        let reading = estimator.assess(70.0, &beat_intervals(140.0, 32));

        assert_eq!(reading.bpm, Some(70));
        assert_eq!(reading.note, TempoNote::PossibleDoubling);
    }

    #[test]
    fn test_intervals_at_half_tempo_flag_halving() {
        let estimator = TempoEstimator::default();
        let reading = estimator.assess(180.0, &beat_intervals(90.0, 12));

        assert_eq!(reading.bpm, Some(180));
        assert_eq!(reading.note, TempoNote::PossibleHalving);
    }

    #[test]
    fn test_unrelated_disagreement_still_reports_ok() {
        let estimator = TempoEstimator::default();
        let reading = estimator.assess(100.0, &beat_intervals(130.0, 12));

        assert_eq!(reading.bpm, Some(100));
        assert_eq!(reading.note, TempoNote::Ok);
    }

    #[test]
    fn test_tolerance_edges() {
        let estimator = TempoEstimator::default();
        // |120 - 118| = 2 is still agreement
        assert_eq!(estimator.assess(118.0, &beat_intervals(120.0, 8)).note, TempoNote::Ok);
        // |120 - 2 * 59| = 2 is not strictly below the tolerance, falls through to OK
        assert_eq!(estimator.assess(59.0, &beat_intervals(120.0, 8)).note, TempoNote::Ok);
        assert_eq!(
            estimator.assess(59.5, &beat_intervals(120.0, 8)).note,
            TempoNote::PossibleDoubling
        );
    }

    #[test]
    fn test_global_bpm_rounds_half_to_even() {
        let estimator = TempoEstimator::default();
        assert_eq!(estimator.assess(120.5, &beat_intervals(120.0, 4)).bpm, Some(120));
        assert_eq!(estimator.assess(121.5, &beat_intervals(120.0, 4)).bpm, Some(122));
    }

    #[test]
    fn test_assess_on_tracked_beats() {
        let track = BeatTrack {
            global_bpm: 120.185,
            frames: (0..12).map(|i| 10 + 43 * i).collect(),
            frame_rate: 44100.0 / 512.0,
        };

        let reading = TempoEstimator::default().assess(track.global_bpm, &track.intervals());
        assert_eq!(reading.bpm, Some(120));
        assert_eq!(reading.note, TempoNote::Ok);
    }

    #[test]
    fn test_fewer_than_two_beats() {
        let estimator = TempoEstimator::default();

        assert_eq!(estimator.assess(120.0, &[]), TempoReading::no_beats());
        assert_eq!(estimator.assess(120.0, &beat_intervals(120.0, 1)), TempoReading::no_beats());
    }

    #[test]
    fn test_silence_reports_no_beats() {
        let estimator = TempoEstimator::default();
        let audio = AudioData::from_mono(vec![0.0; 44100 * 3], 44100);

        let reading = estimator.calc_bpm(&audio).unwrap();
        assert_eq!(reading.bpm, None);
        assert_eq!(reading.note, TempoNote::NoBeats);
    }

    #[test]
    fn test_click_track_tempo() {
        // 22016 samples is exactly 43 hops of 512, i.e. 120.19 BPM
        let samples = click_track(22016, 8.0, 44100);
        let audio = AudioData::from_mono(samples, 44100);

        let reading = TempoEstimator::default().calc_bpm(&audio).unwrap();
        assert_eq!(reading.bpm, Some(120));
        assert_eq!(reading.note, TempoNote::Ok);
    }
}
