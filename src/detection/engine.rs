use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    audio::{AnalysisResponse, AnalysisResult, AudioAnalyzer, AudioLoader},
    config::Config,
    detection::ScratchSpace,
    error::{AudioError, DetectorError, Result, SourceError},
    source::{MediaSource, YtDlpSource},
};

/// Orchestrates one detection request from link to response
///
/// The engine follows a fixed pipeline:
/// 1. Classification - refuse links that do not point at music
/// 2. Download - fetch the audio into a per-request scratch namespace
/// 3. Analysis - tempo then key, on a blocking worker thread
/// 4. Title lookup - best effort
///
/// Scratch files are removed on every exit path. At most
/// `server.max_concurrent_analyses` analyses run at once.
#[derive(Clone)]
pub struct DetectionEngine {
    config: Arc<Config>,
    source: Arc<dyn MediaSource>,
    analyzer: Arc<AudioAnalyzer>,
    permits: Arc<Semaphore>,
}

impl DetectionEngine {
    /// Create an engine with an explicit media source
    pub fn new(config: Config, source: Arc<dyn MediaSource>) -> Result<Self> {
        let analyzer = AudioAnalyzer::with_config(config.tempo.clone(), config.key.clone())?;
        let permits = Arc::new(Semaphore::new(config.server.max_concurrent_analyses));

        Ok(Self {
            config: Arc::new(config),
            source,
            analyzer: Arc::new(analyzer),
            permits,
        })
    }

    /// Create an engine that downloads through yt-dlp
    pub fn with_ytdlp(config: Config) -> Result<Self> {
        let source = Arc::new(YtDlpSource::new(config.source.clone()));
        Self::new(config, source)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full pipeline for a link
    pub async fn analyze(&self, url: &str) -> Result<AnalysisResponse> {
        info!("🎵 Detecting BPM and key for {}", url);

        // Pipeline Step 1: Classification
        self.ensure_music(url).await?;

        // Pipeline Steps 2-3: Download and analysis inside a scratch namespace
        let scratch = ScratchSpace::create(&self.config.source.scratch_dir).map_err(|e| {
            SourceError::DownloadFailed {
                reason: format!(
                    "cannot use scratch directory {}: {}",
                    self.config.source.scratch_dir.display(),
                    e
                ),
            }
        })?;
        debug!("Scratch prefix: {:?}", scratch.prefix());

        let outcome = self.download_and_analyze(url, &scratch).await;
        release_scratch(scratch).await;
        let result = outcome?;

        // Pipeline Step 4: Title
        let title = self.source.title(url).await;

        info!("✅ Detection complete for {}", url);
        Ok(AnalysisResponse { title, result })
    }

    /// Analyze a local audio file. The title is the file stem.
    pub async fn analyze_file<P: AsRef<Path>>(&self, path: P) -> Result<AnalysisResponse> {
        let path = path.as_ref();
        info!("🎵 Detecting BPM and key for {:?}", path);

        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        let result = self.analyze_wav(path.to_path_buf()).await?;

        Ok(AnalysisResponse { title, result })
    }

    async fn ensure_music(&self, url: &str) -> Result<()> {
        match self.source.is_music(url).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!("Rejected non-music link: {}", url);
                Err(SourceError::NotMusic { url: url.to_string() }.into())
            }
            Err(e) => {
                warn!("Could not classify {}, treating as non-music: {}", url, e);
                Err(SourceError::NotMusic { url: url.to_string() }.into())
            }
        }
    }

    async fn download_and_analyze(
        &self,
        url: &str,
        scratch: &ScratchSpace,
    ) -> Result<AnalysisResult> {
        let wav_path = self.download(url, scratch).await?;
        self.analyze_wav(wav_path).await
    }

    async fn download(&self, url: &str, scratch: &ScratchSpace) -> Result<PathBuf> {
        let wav_path = self
            .source
            .download(url, &scratch.prefix())
            .await
            .map_err(|e| match e {
                DetectorError::Source(_) => e,
                other => SourceError::DownloadFailed {
                    reason: other.to_string(),
                }
                .into(),
            })
            .map_err(|e| {
                warn!("Download failed for {}: {}", url, e);
                e
            })?;

        debug!("Downloaded audio to {:?}", wav_path);
        Ok(wav_path)
    }

    async fn analyze_wav(&self, wav_path: PathBuf) -> Result<AnalysisResult> {
        let analyzer = Arc::clone(&self.analyzer);

        let outcome = self
            .run_blocking(move || {
                let audio_data = AudioLoader::load(&wav_path)?;
                info!(
                    "   Loaded: {:.1}s, {} Hz, {} channels",
                    audio_data.duration, audio_data.sample_rate, audio_data.channels
                );
                analyzer.analyze(&audio_data)
            })
            .await;

        outcome.map_err(|e| match e {
            DetectorError::Audio(_) => e,
            other => AudioError::AnalysisFailed {
                reason: other.to_string(),
            }
            .into(),
        })
        .map_err(|e| {
            warn!("Analysis failed: {}", e);
            e
        })
    }

    /// Run CPU-bound work on the blocking pool under an analysis permit.
    /// The permit travels with the task, so it stays held even if the
    /// caller stops waiting. A panic becomes an analysis failure.
    async fn run_blocking<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| DetectorError::generic(format!("analysis queue closed: {}", e)))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .map_err(|e| AudioError::AnalysisFailed {
            reason: format!("analysis task did not complete: {}", e),
        })?
    }
}

/// Remove the request's scratch files on the blocking pool
async fn release_scratch(scratch: ScratchSpace) {
    let id = scratch.id().to_string();

    match tokio::task::spawn_blocking(move || scratch.close()).await {
        Ok(Ok(removed)) => debug!("Released scratch space {} ({} entries)", id, removed),
        Ok(Err(e)) => warn!("Failed to clean scratch files for {}: {}", id, e),
        Err(e) => warn!("Scratch cleanup for {} did not complete: {}", id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TempoNote;
    use crate::error::FailureKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    #[derive(Clone, Copy)]
    enum Download {
        ClickTrack,
        Corrupt,
        Fail,
    }

    struct FakeSource {
        music: std::result::Result<bool, ()>,
        download: Download,
        downloads: AtomicUsize,
    }

    impl FakeSource {
        fn new(music: std::result::Result<bool, ()>, download: Download) -> Arc<Self> {
            Arc::new(Self {
                music,
                download,
                downloads: AtomicUsize::new(0),
            })
        }
    }

    fn write_click_track(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();

        // 22016 samples = 43 hops of 512 at 44.1 kHz
        let period = 22016;
        let burst = 882;
        for i in 0..44100 * 8 {
            let offset = (i as i64 - 11025).rem_euclid(period);
            let sample = if i >= 11025 && offset < burst {
                let t = offset as f32 / 44100.0;
                0.8 * (-t * 200.0).exp() * (2.0 * std::f32::consts::PI * 1000.0 * t).sin()
            } else {
                0.0
            };
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[async_trait]
    impl MediaSource for FakeSource {
        async fn is_music(&self, url: &str) -> Result<bool> {
            self.music.map_err(|_| {
                SourceError::MetadataFailed {
                    reason: format!("no metadata for {}", url),
                }
                .into()
            })
        }

        async fn download(&self, _url: &str, prefix: &Path) -> Result<PathBuf> {
            self.downloads.fetch_add(1, Ordering::SeqCst);

            // Leftover from the extractor, must be cleaned up too
            let mut partial = prefix.as_os_str().to_owned();
            partial.push(".webm.part");
            std::fs::write(PathBuf::from(partial), b"partial")?;

            let mut wav = prefix.as_os_str().to_owned();
            wav.push(".wav");
            let wav = PathBuf::from(wav);

            match self.download {
                Download::ClickTrack => write_click_track(&wav),
                Download::Corrupt => std::fs::write(&wav, b"RIFF-not-really")?,
                Download::Fail => {
                    return Err(SourceError::DownloadFailed {
                        reason: "HTTP Error 403: Forbidden".to_string(),
                    }
                    .into())
                }
            }

            Ok(wav)
        }

        async fn title(&self, _url: &str) -> Option<String> {
            Some("Test Song".to_string())
        }
    }

    fn engine(source: Arc<FakeSource>) -> (DetectionEngine, TempDir) {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.source.scratch_dir = dir.path().join("scratch");

        (DetectionEngine::new(config, source).unwrap(), dir)
    }

    fn scratch_is_empty(dir: &TempDir) -> bool {
        match std::fs::read_dir(dir.path().join("scratch")) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_non_music_skips_download() {
        let source = FakeSource::new(Ok(false), Download::ClickTrack);
        let (engine, dir) = engine(source.clone());

        let err = engine.analyze("https://example.com/podcast").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidContent);
        assert_eq!(source.downloads.load(Ordering::SeqCst), 0);
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_classification_error_is_non_music() {
        let source = FakeSource::new(Err(()), Download::ClickTrack);
        let (engine, _dir) = engine(source.clone());

        let err = engine.analyze("https://example.com/gone").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidContent);
        assert_eq!(source.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_detection_cleans_up() {
        let source = FakeSource::new(Ok(true), Download::ClickTrack);
        let (engine, dir) = engine(source.clone());

        let response = engine.analyze("https://example.com/song").await.unwrap();
        assert_eq!(response.title.as_deref(), Some("Test Song"));
        assert_eq!(response.result.bpm, Some(120));
        assert_eq!(response.result.note, TempoNote::Ok);
        assert_eq!(source.downloads.load(Ordering::SeqCst), 1);
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_download_failure_cleans_up() {
        let source = FakeSource::new(Ok(true), Download::Fail);
        let (engine, dir) = engine(source);

        let err = engine.analyze("https://example.com/song").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::DownloadFailure);
        assert_eq!(
            err.user_message(),
            "Error downloading audio: HTTP Error 403: Forbidden"
        );
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_analysis_failure_cleans_up() {
        let source = FakeSource::new(Ok(true), Download::Corrupt);
        let (engine, dir) = engine(source);

        let err = engine.analyze("https://example.com/song").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::AnalysisFailure);
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_analyze_local_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clicks.wav");
        write_click_track(&path);

        let source = FakeSource::new(Ok(true), Download::ClickTrack);
        let (engine, _scratch) = engine(source.clone());

        let response = engine.analyze_file(&path).await.unwrap();
        assert_eq!(response.title.as_deref(), Some("clicks"));
        assert_eq!(response.result.bpm, Some(120));
        assert_eq!(source.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_analysis_is_analysis_failure() {
        let (engine, _dir) = engine(FakeSource::new(Ok(true), Download::ClickTrack));

        let err = engine
            .run_blocking(|| -> Result<()> { panic!("chroma worker crashed") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::AnalysisFailure);

        // The permit is returned after the panic
        assert_eq!(
            engine.permits.available_permits(),
            engine.config().server.max_concurrent_analyses
        );
    }

    #[tokio::test]
    async fn test_abandoned_analysis_keeps_its_permit() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.source.scratch_dir = dir.path().join("scratch");
        config.server.max_concurrent_analyses = 1;
        let source = FakeSource::new(Ok(true), Download::ClickTrack);
        let engine = DetectionEngine::new(config, source).unwrap();

        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let mut pending = Box::pin(engine.run_blocking(move || {
            let _ = release_rx.recv();
            Ok(())
        }));

        // Poll once so the task is handed to the blocking pool, then walk away
        tokio::select! {
            biased;
            _ = &mut pending => panic!("task finished before it was released"),
            _ = std::future::ready(()) => {}
        }
        drop(pending);

        assert_eq!(engine.permits.available_permits(), 0);

        release_tx.send(()).unwrap();
        let permit = engine.permits.acquire().await.unwrap();
        drop(permit);
        assert_eq!(engine.permits.available_permits(), 1);
    }
}
