use std::fs::File;
use std::path::Path;

use rubato::{FftFixedInOut, Resampler};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::types::AudioData;
use crate::error::{AudioError, Result};

/// Chunk size handed to the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Audio file loader. The download layer always produces WAV; other formats
/// are accepted for local files.
pub struct AudioLoader;

impl AudioLoader {
    /// Load an audio file and return raw audio data
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AudioData> {
        let path = path.as_ref();
        let extension = Self::detect_format(path).unwrap_or_default();

        match extension.as_str() {
            "wav" => Self::load_wav(path),
            "mp3" | "flac" | "ogg" | "m4a" | "aac" => Self::load_with_symphonia(path),
            _ => Err(AudioError::UnsupportedFormat { format: extension }.into()),
        }
    }

    /// Load WAV files using the hound crate
    fn load_wav(path: &Path) -> Result<AudioData> {
        let load_failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };

        let reader = hound::WavReader::open(path).map_err(|_| load_failed())?;

        let spec = reader.spec();
        let sample_rate = spec.sample_rate;
        let channels = spec.channels;

        if sample_rate == 0 || channels == 0 {
            return Err(AudioError::InvalidParameters {
                details: format!("{} Hz / {} channels", sample_rate, channels),
            }
            .into());
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| load_failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| load_failed())?
                    .into_iter()
                    .map(|sample| Self::int_to_float(sample, bit_depth))
                    .collect()
            }
        };

        let duration = samples.len() as f64 / (sample_rate * channels as u32) as f64;

        tracing::debug!(
            "Loaded WAV {:?}: {} Hz, {} channels, {:.1}s",
            path,
            sample_rate,
            channels,
            duration
        );

        Ok(AudioData {
            samples,
            sample_rate,
            channels,
            duration,
        })
    }

    /// Load compressed formats using Symphonia
    fn load_with_symphonia(path: &Path) -> Result<AudioData> {
        let load_failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };

        let file = File::open(path).map_err(|_| load_failed())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|_| load_failed())?;

        let mut format = probed.format;

        // First audio track with a decodable codec
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(load_failed)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| AudioError::InvalidParameters {
                details: "No sample rate found".to_string(),
            })?;

        let channels = codec_params
            .channels
            .ok_or_else(|| AudioError::InvalidParameters {
                details: "No channel information found".to_string(),
            })?
            .count() as u16;

        let dec_opts: DecoderOptions = Default::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &dec_opts)
            .map_err(|_| load_failed())?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                // End of stream
                Err(_) => break,
            };

            while !format.metadata().is_latest() {
                format.metadata().pop();
            }

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => Self::convert_audio_buffer_to_f32(&decoded, &mut samples),
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(_) => break,
            }
        }

        if samples.is_empty() {
            return Err(load_failed().into());
        }

        let duration = samples.len() as f64 / (sample_rate * channels as u32) as f64;

        Ok(AudioData {
            samples,
            sample_rate,
            channels,
            duration,
        })
    }

    /// Resample a mono signal with an FFT resampler
    pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
        if from_rate == to_rate || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let resample_failed = |e: String| AudioError::ResampleFailed { reason: e };

        let mut resampler =
            FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 1)
                .map_err(|e| resample_failed(e.to_string()))?;

        let chunk_size = resampler.input_frames_next();
        let expected = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
        let mut output = Vec::with_capacity(expected + chunk_size);

        let mut pos = 0;
        while pos + chunk_size <= samples.len() {
            let resampled = resampler
                .process(&[&samples[pos..pos + chunk_size]], None)
                .map_err(|e| resample_failed(e.to_string()))?;
            output.extend_from_slice(&resampled[0]);
            pos += chunk_size;
        }

        // Zero-pad the tail and keep only its proportional share of output
        if pos < samples.len() {
            let mut tail = samples[pos..].to_vec();
            tail.resize(chunk_size, 0.0);
            let resampled = resampler
                .process(&[tail.as_slice()], None)
                .map_err(|e| resample_failed(e.to_string()))?;
            let keep = expected.saturating_sub(output.len()).min(resampled[0].len());
            output.extend_from_slice(&resampled[0][..keep]);
        }

        Ok(output)
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => sample as f32 / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }

    /// Interleave a Symphonia buffer into f32 samples
    fn convert_audio_buffer_to_f32(buffer: &AudioBufferRef, output: &mut Vec<f32>) {
        macro_rules! interleave {
            ($buf:expr, $convert:expr) => {{
                let channels = $buf.spec().channels.count();
                for frame_idx in 0..$buf.frames() {
                    for ch in 0..channels {
                        output.push($convert($buf.chan(ch)[frame_idx]));
                    }
                }
            }};
        }

        match buffer {
            AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
            AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
            AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / 2147483648.0),
            AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / 32768.0),
            _ => {
                tracing::warn!("Unsupported audio buffer format, skipping packet");
            }
        }
    }

    /// Detect audio format from file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }
}
