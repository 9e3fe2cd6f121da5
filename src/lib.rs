//! # playlist-dl Library
//!
//! Resolves music playlists through a chain of configurable JSON providers,
//! downloads every song with request spacing and an optional speed cap, and
//! batch-converts `.ncm` files through the external `ncmdump` tool.
//!
//! ## Features
//!
//! - **Provider fallback**: providers are tried in order until one yields items
//! - **Retrying transport**: transient HTTP failures are retried at a fixed interval
//! - **Polite downloads**: location lookups are spaced, byte rate can be capped
//! - **Run events**: progress and outcomes are reported through a callback
//! - **Cancellation**: runs stop between items when their token is cancelled
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use playlist_dl::{Config, DownloadRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.json")?;
//!
//!     // Print what the playlist contains
//!     for item in playlist_dl::resolve(&config, "3778678").await? {
//!         println!("{}", item.label());
//!     }
//!
//!     // Download it into ./music
//!     let summary = playlist_dl::download(&config, "3778678", &DownloadRequest::new("music")).await?;
//!     println!("{} downloaded, {} failed", summary.success, summary.failed);
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

// Re-export core types that users might need
pub use crate::core::config::{
    Config, FieldPaths, LocationResponseType, LocationSource, ProviderDescriptor, ResponseShape,
};
pub use crate::core::convert::{
    BatchReport, ConversionJob, ConversionOutcome, ConvertOptions, Converter, ProcessOutput, ProcessRunner,
    SystemProcessRunner,
};
pub use crate::core::error::{Error, ProviderFailure, Result};
pub use crate::core::location::LocationFetcher;
pub use crate::core::naming::{
    canonical_converted_name, flip_name_order, resolve_output_filename, sanitize_filename, FilenameFormat,
};
pub use crate::core::playlist::{DownloadRequest, ItemReport, PlaylistDownloader, RunSummary};
pub use crate::core::resolver::{extract_id, ResolvedItem, Resolver, NO_USABLE_ITEMS};
pub use crate::core::stream::{EventCallback, ProgressCallback, RunEvent, TransferPolicy};
pub use crate::core::transfer::{Transfer, TransferOutcome, TransferTarget};
pub use crate::core::transport::{HttpTransport, RetryPolicy, Transport};

// Internal modules
mod core;

/// Playlist id used to check that the configured providers still answer
pub const PROBE_LIST_ID: &str = "3778678";

fn http_transport(config: &Config) -> Arc<dyn Transport> {
    Arc::new(HttpTransport::new(config.retry_policy()))
}

/// Resolve a playlist into its items using the configured providers
pub async fn resolve(config: &Config, list_id: &str) -> Result<Vec<ResolvedItem>> {
    Resolver::from_config(config, http_transport(config))
        .resolve(list_id, &CancellationToken::new())
        .await
}

/// Download every item of a playlist
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = playlist_dl::Config::load("config.json")?;
/// let mut request = playlist_dl::DownloadRequest::new("music");
/// request.rate_limit_kib = 512;
/// playlist_dl::download(&config, "3778678", &request).await?;
/// # Ok(())
/// # }
/// ```
pub async fn download(config: &Config, list_id: &str, request: &DownloadRequest) -> Result<RunSummary> {
    PlaylistDownloader::from_config(config, http_transport(config))
        .run(list_id, request, &CancellationToken::new(), None)
        .await
}

/// Convert every `.ncm` file in `source_dir` into `target_dir`
///
/// The tool is searched next to the executable, in the working directory
/// and on `PATH`.
pub async fn convert(source_dir: &Path, target_dir: &Path, options: ConvertOptions) -> Result<BatchReport> {
    Converter::locate(None)?
        .convert_batch(source_dir, target_dir, options, &CancellationToken::new(), None)
        .await
}

/// Check whether the providers can still resolve a well-known playlist
///
/// Returns the number of items found; an empty playlist surfaces as
/// [`Error::AllProvidersExhausted`].
pub async fn check_providers(config: &Config) -> Result<usize> {
    resolve(config, PROBE_LIST_ID).await.map(|items| items.len())
}
