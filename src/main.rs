use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bpm_detector::{config::Config, detection::DetectionEngine};

#[derive(Parser)]
#[command(
    name = "bpm-detector",
    version,
    about = "Detect the tempo and key of a song from a video link",
    long_about = "bpm-detector downloads the audio behind a video link, tracks its beats and estimates its musical key. It runs as an HTTP service or as a one-shot command."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    #[cfg(feature = "server")]
    Serve {
        /// Address to listen on, overrides the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Download and analyze one link, printing JSON
    Analyze {
        /// Video link
        url: String,
    },

    /// Analyze a local audio file, printing JSON
    File {
        /// Audio file path (WAV, MP3, FLAC, OGG)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for results
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting bpm-detector v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.validate()?;

    match cli.command {
        #[cfg(feature = "server")]
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let engine = DetectionEngine::with_ytdlp(config)?;
            bpm_detector::server::serve(engine, &bind).await?;
        }
        Command::Analyze { url } => {
            let engine = DetectionEngine::with_ytdlp(config)?;
            let response = engine
                .analyze(&url)
                .await
                .with_context(|| format!("Detection failed for {}", url))?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::File { path } => {
            let engine = DetectionEngine::with_ytdlp(config)?;
            let response = engine
                .analyze_file(&path)
                .await
                .with_context(|| format!("Analysis failed for {:?}", path))?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
