//! # playlist-dl CLI
//!
//! Command-line interface for the playlist-dl library.
//! Resolves playlists, downloads their songs and batch-converts `.ncm` files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{error, info};
use playlist_dl::{
    Config, ConvertOptions, Converter, DownloadRequest, Error, FilenameFormat, HttpTransport, PlaylistDownloader,
    ProviderFailure, Resolver, Transfer, Transport, NO_USABLE_ITEMS, PROBE_LIST_ID,
};
use tokio_util::sync::CancellationToken;

mod cli;

/// Command-line interface for playlist-dl
#[derive(Parser, Debug)]
#[command(name = "playlist-dl")]
#[command(about = "Playlist downloader with provider fallback and NCM conversion")]
#[command(long_about = "Resolves a playlist through the providers in the config file and downloads its songs:
  playlist-dl download 3778678               # Download into ./downloads
  playlist-dl download 3778678 -q lossless   # Pick a quality level
  playlist-dl resolve 3778678                # List songs without downloading
  playlist-dl convert ./ncm -o ./mp3 --flip  # Convert .ncm files, 'A - B' becomes 'B - A'
  playlist-dl check                          # Check that providers still answer")]
#[command(version = env!("PLAYLIST_DL_VERSION"))]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every song of a playlist
    Download {
        list_id: String,

        /// Target directory
        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,

        /// Quality level; defaults to the configured one
        #[arg(short, long)]
        quality: Option<String>,

        /// Per-song speed cap in KiB/s, 0 for unlimited
        #[arg(long, default_value_t = 0)]
        rate_limit: u64,

        /// Download songs even when the file already exists
        #[arg(long)]
        no_skip_existing: bool,

        /// Name files "artist - title" instead of "title - artist"
        #[arg(long)]
        artist_first: bool,
    },

    /// Print the songs of a playlist without downloading
    Resolve { list_id: String },

    /// Convert every .ncm file in a directory
    Convert {
        source_dir: PathBuf,

        /// Target directory; defaults to the source directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Convert even when the target file already exists
        #[arg(long)]
        no_skip_existing: bool,

        /// Swap "A - B" file names to "B - A"
        #[arg(long)]
        flip: bool,

        /// Path to the ncmdump executable
        #[arg(long)]
        tool: Option<PathBuf>,
    },

    /// Persist a new spacing between location requests
    SetInterval {
        /// Interval in milliseconds
        ms: u64,
    },

    /// Check that the providers can still resolve a known playlist
    Check,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!("🎵 playlist-dl v{} starting...", env!("PLAYLIST_DL_VERSION"));
    }

    match cli.command {
        Command::Download {
            list_id,
            output,
            quality,
            rate_limit,
            no_skip_existing,
            artist_first,
        } => {
            let config = load_config(&cli.config)?;
            if let Some(quality) = &quality {
                if !config.is_valid_quality(quality) {
                    bail!(cli::unknown_quality_message(quality, config.quality_options()));
                }
            }
            let request = DownloadRequest {
                directory: output,
                quality,
                rate_limit_kib: rate_limit,
                skip_if_exists: !no_skip_existing,
                format: if artist_first {
                    FilenameFormat::ArtistTitle
                } else {
                    FilenameFormat::TitleArtist
                },
            };
            download(&config, &list_id, &request).await
        }
        Command::Resolve { list_id } => {
            let config = load_config(&cli.config)?;
            let items = playlist_dl::resolve(&config, &list_id).await?;
            for (i, item) in items.iter().enumerate() {
                println!("{:>4}. {} [{}]", i + 1, item.label(), item.id);
            }
            eprintln!("✅ {} songs", items.len());
            Ok(())
        }
        Command::Convert {
            source_dir,
            output,
            no_skip_existing,
            flip,
            tool,
        } => {
            let target_dir = output.unwrap_or_else(|| source_dir.clone());
            let options = ConvertOptions {
                skip_if_exists: !no_skip_existing,
                flip_name_order: flip,
            };
            convert(&source_dir, &target_dir, options, tool.as_deref()).await
        }
        Command::SetInterval { ms } => {
            let mut config = load_config(&cli.config)?;
            config
                .set_request_interval(&cli.config, ms)
                .with_context(|| format!("updating {}", cli.config.display()))?;
            eprintln!("✅ Request interval set to {ms} ms");
            Ok(())
        }
        Command::Check => {
            let config = load_config(&cli.config)?;
            check(&config).await
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Cancellation token fired by Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⏹️  Stopping after the current item...");
            trigger.cancel();
        }
    });
    cancel
}

async fn download(config: &Config, list_id: &str, request: &DownloadRequest) -> anyhow::Result<()> {
    eprintln!("📁 Saving to: {}", request.directory.display());

    let progress = cli::ProgressManager::new(&format!("🌐 Downloading playlist {list_id}"));
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.retry_policy()));
    let downloader = PlaylistDownloader::new(
        Resolver::from_config(config, Arc::clone(&transport)),
        Transfer::from_config(config, transport).with_progress(progress.byte_callback()),
    );

    let events = progress.event_callback();
    let summary = downloader
        .run(list_id, request, &ctrl_c_token(), Some(&events))
        .await?;

    info!(
        "{list_id}: {} downloaded, {} skipped, {} failed",
        summary.success, summary.skipped, summary.failed
    );
    if summary.cancelled {
        eprintln!("⏹️  Cancelled after {} of the playlist's songs", summary.items.len());
    }
    if summary.failed > 0 {
        bail!("{} of {} songs failed", summary.failed, summary.items.len());
    }
    Ok(())
}

async fn convert(
    source_dir: &Path,
    target_dir: &Path,
    options: ConvertOptions,
    tool: Option<&Path>,
) -> anyhow::Result<()> {
    let converter = Converter::locate(tool)?;
    let progress = cli::ProgressManager::new(&format!("🔄 Converting {}", source_dir.display()));
    let events = progress.event_callback();

    let report = converter
        .convert_batch(source_dir, target_dir, options, &ctrl_c_token(), Some(&events))
        .await?;

    for (source, outcome) in &report.outcomes {
        if let playlist_dl::ConversionOutcome::Converted {
            warning: Some(warning), ..
        } = outcome
        {
            eprintln!("⚠️  {}: {warning}", source.display());
        }
    }
    if report.failed > 0 {
        bail!("{} of {} files failed to convert", report.failed, report.outcomes.len());
    }
    Ok(())
}

async fn check(config: &Config) -> anyhow::Result<()> {
    match playlist_dl::check_providers(config).await {
        Ok(count) => {
            eprintln!("✅ Providers reachable: list {PROBE_LIST_ID} has {count} songs");
            Ok(())
        }
        Err(Error::AllProvidersExhausted { failures, .. }) if came_back_empty(&failures) => {
            bail!("providers answered but list {PROBE_LIST_ID} came back empty")
        }
        Err(e) => Err(e.into()),
    }
}

/// Every provider answered, but none had a usable item
fn came_back_empty(failures: &[ProviderFailure]) -> bool {
    !failures.is_empty() && failures.iter().all(|f| f.detail == NO_USABLE_ITEMS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_download_defaults() {
        let cli = Cli::try_parse_from(["playlist-dl", "download", "3778678"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.json"));
        match cli.command {
            Command::Download {
                list_id,
                output,
                quality,
                rate_limit,
                no_skip_existing,
                artist_first,
            } => {
                assert_eq!(list_id, "3778678");
                assert_eq!(output, PathBuf::from("downloads"));
                assert_eq!(quality, None);
                assert_eq!(rate_limit, 0);
                assert!(!no_skip_existing);
                assert!(!artist_first);
            }
            other => panic!("Expected download, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["playlist-dl", "convert", "./ncm", "--flip", "-v", "--config", "alt.json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("alt.json"));
        assert!(matches!(cli.command, Command::Convert { flip: true, output: None, .. }));
    }

    #[test]
    fn test_empty_playlist_is_told_apart_from_outages() {
        let empty = |provider: &str| ProviderFailure {
            provider: provider.to_string(),
            detail: NO_USABLE_ITEMS.to_string(),
        };
        let down = ProviderFailure {
            provider: "mirror".to_string(),
            detail: "HTTP error: 502 Bad Gateway from https://two.example".to_string(),
        };

        assert!(came_back_empty(&[empty("primary"), empty("mirror")]));
        assert!(!came_back_empty(&[empty("primary"), down]));
        assert!(!came_back_empty(&[]));
    }

    #[test]
    fn test_set_interval_requires_number() {
        assert!(Cli::try_parse_from(["playlist-dl", "set-interval", "fast"]).is_err());
        let cli = Cli::try_parse_from(["playlist-dl", "set-interval", "1500"]).unwrap();
        assert!(matches!(cli.command, Command::SetInterval { ms: 1500 }));
    }
}
