use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::SourceConfig;
use crate::error::{Result, SourceError};
use crate::source::{looks_like_music, MediaInfo, MediaSource};

/// Media source backed by the `yt-dlp` command line tool
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    config: SourceConfig,
}

impl YtDlpSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Fetch the metadata dump for a link without downloading anything
    pub async fn metadata(&self, url: &str) -> Result<MediaInfo> {
        let args: Vec<OsString> = vec![
            "--dump-single-json".into(),
            "--skip-download".into(),
            "--flat-playlist".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            url.into(),
        ];

        let stdout = self
            .run(args)
            .await
            .map_err(|reason| SourceError::MetadataFailed { reason })?;

        let info = MediaInfo::from_json(&stdout).map_err(|e| SourceError::MetadataFailed {
            reason: format!("unreadable metadata: {}", e),
        })?;

        Ok(info)
    }

    fn download_args(&self, url: &str, prefix: &Path) -> Vec<OsString> {
        let mut template = prefix.as_os_str().to_owned();
        template.push(".%(ext)s");

        vec![
            "-f".into(),
            self.config.format.as_str().into(),
            "-x".into(),
            "--audio-format".into(),
            "wav".into(),
            "--audio-quality".into(),
            self.config.audio_quality.as_str().into(),
            "--no-playlist".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            "-o".into(),
            template,
            url.into(),
        ]
    }

    /// Run the tool and return its stdout. Failures carry stderr or the
    /// launch error; a missing binary is reported separately.
    async fn run(&self, args: Vec<OsString>) -> std::result::Result<String, String> {
        tracing::debug!("Running {} {:?}", self.config.ytdlp_path.display(), args);

        let output = Command::new(&self.config.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to execute {}: {}", self.config.ytdlp_path.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{} ({})", stderr.trim(), output.status));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn ensure_tool(&self) -> Result<()> {
        let status = Command::new(&self.config.ytdlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(_) => Ok(()),
            Err(e) => Err(SourceError::ToolUnavailable {
                tool: self.config.ytdlp_path.display().to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn is_music(&self, url: &str) -> Result<bool> {
        let info = self.metadata(url).await?;
        let verdict = looks_like_music(&info, &self.config.music_keywords);

        tracing::debug!(
            "Classified {} as {}: categories {:?}",
            url,
            if verdict { "music" } else { "not music" },
            info.categories
        );

        Ok(verdict)
    }

    async fn download(&self, url: &str, prefix: &Path) -> Result<PathBuf> {
        self.ensure_tool().await?;

        tracing::info!("Downloading audio from {}", url);
        self.run(self.download_args(url, prefix))
            .await
            .map_err(|reason| SourceError::DownloadFailed { reason })?;

        let mut wav = prefix.as_os_str().to_owned();
        wav.push(".wav");
        let wav = PathBuf::from(wav);

        if !tokio::fs::try_exists(&wav).await.unwrap_or(false) {
            return Err(SourceError::DownloadFailed {
                reason: format!("expected output {} was not produced", wav.display()),
            }
            .into());
        }

        Ok(wav)
    }

    async fn title(&self, url: &str) -> Option<String> {
        match self.metadata(url).await {
            Ok(info) => info.title,
            Err(e) => {
                tracing::warn!("Title lookup failed for {}: {}", url, e);
                None
            }
        }
    }
}
