//! Playlist run driver for playlist-dl
//!
//! Resolves a playlist and transfers its items one after another, reporting
//! progress through [`RunEvent`]s.

use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::naming::FilenameFormat;
use crate::core::resolver::{ResolvedItem, Resolver};
use crate::core::stream::{emit, EventCallback, RunEvent};
use crate::core::transfer::{Transfer, TransferOutcome, TransferTarget};
use crate::core::transport::Transport;

/// Options for one playlist download run
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub directory: PathBuf,
    /// Quality level; `None` uses the configured default
    pub quality: Option<String>,
    /// Per-item speed cap in KiB/s; 0 disables throttling
    pub rate_limit_kib: u64,
    pub skip_if_exists: bool,
    pub format: FilenameFormat,
}

impl DownloadRequest {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            quality: None,
            rate_limit_kib: 0,
            skip_if_exists: true,
            format: FilenameFormat::default(),
        }
    }

    fn target_for(&self, item: &ResolvedItem) -> TransferTarget {
        TransferTarget::for_item(
            item,
            &self.directory,
            self.format,
            self.rate_limit_kib.saturating_mul(1024),
            self.skip_if_exists,
        )
    }
}

/// One processed item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub item: ResolvedItem,
    pub outcome: TransferOutcome,
}

/// Result of a playlist run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSummary {
    pub items: Vec<ItemReport>,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn complete_event(&self) -> RunEvent {
        RunEvent::RunComplete {
            success: self.success,
            failed: self.failed,
            skipped: self.skipped,
        }
    }
}

/// Resolver and transfer engine driven together
pub struct PlaylistDownloader {
    resolver: Resolver,
    transfer: Transfer,
}

impl PlaylistDownloader {
    pub fn new(resolver: Resolver, transfer: Transfer) -> Self {
        Self { resolver, transfer }
    }

    /// Build both halves from the loaded configuration over one transport
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            Resolver::from_config(config, Arc::clone(&transport)),
            Transfer::from_config(config, transport),
        )
    }

    /// Resolve `list_id` and transfer every item in order
    ///
    /// Resolution failures are reported as [`RunEvent::RunError`] and
    /// returned. Per-item failures never abort the run.
    pub async fn run(
        &self,
        list_id: &str,
        request: &DownloadRequest,
        cancel: &CancellationToken,
        events: Option<&EventCallback>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let items = match self.resolver.resolve(list_id, cancel).await {
            Ok(items) => items,
            Err(Error::Cancelled) => {
                info!("Run for {list_id} cancelled before any item");
                summary.cancelled = true;
                emit(events, summary.complete_event());
                return Ok(summary);
            }
            Err(e) => {
                emit(events, RunEvent::RunError(e.to_string()));
                return Err(e);
            }
        };

        let total = items.len();
        info!("Downloading {total} items from list {list_id}");

        for (i, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Run cancelled after {i} of {total} items");
                summary.cancelled = true;
                break;
            }

            let index = i + 1;
            emit(
                events,
                RunEvent::Progress {
                    index,
                    total,
                    label: item.label(),
                },
            );

            let target = request.target_for(&item);
            let outcome = self
                .transfer
                .transfer(&item, &target, request.quality.as_deref())
                .await;

            match &outcome {
                TransferOutcome::Downloaded(_) => summary.success += 1,
                TransferOutcome::Skipped(_) => summary.skipped += 1,
                TransferOutcome::Failed(message) => {
                    warn!("[{index}/{total}] {}: {message}", item.label());
                    summary.failed += 1;
                }
            }
            emit(
                events,
                RunEvent::ItemOutcome {
                    index,
                    success: outcome.is_success(),
                    detail: outcome.detail(),
                },
            );
            summary.items.push(ItemReport { item, outcome });
        }

        info!(
            "Run finished: {} downloaded, {} skipped, {} failed, {total} total",
            summary.success, summary.skipped, summary.failed
        );
        emit(events, summary.complete_event());
        Ok(summary)
    }
}
