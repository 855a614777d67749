//! # Media Sources
//!
//! Everything that touches the outside world before analysis: deciding
//! whether a link points at music, fetching its audio as a WAV file and
//! looking up its title.

pub mod classify;
pub mod ytdlp;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::Result;

pub use classify::looks_like_music;
pub use ytdlp::YtDlpSource;

/// A provider of remote audio
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Whether the link points at music. Errors mean the metadata could not
    /// be fetched at all.
    async fn is_music(&self, url: &str) -> Result<bool>;

    /// Download the audio and transcode it to `<prefix>.wav`, returning that path
    async fn download(&self, url: &str, prefix: &Path) -> Result<PathBuf>;

    /// Best-effort title lookup
    async fn title(&self, url: &str) -> Option<String>;
}

/// Subset of the metadata dump used for classification and titles
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub categories: Vec<String>,

    #[serde(default)]
    pub category: Option<String>,
}

impl MediaInfo {
    /// Parse the JSON printed by `yt-dlp --dump-single-json`
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
