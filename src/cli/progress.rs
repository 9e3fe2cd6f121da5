//! CLI-specific progress handling for playlist-dl
//!
//! Renders run events and byte progress with indicatif.

use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use playlist_dl::{EventCallback, ProgressCallback, RunEvent};

/// Creates a byte progress bar for the song currently downloading
pub fn create_progress_bar(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA: {eta}")
            .expect("Failed to create progress style")
            .progress_chars("#>-"),
    );
    pb
}

/// Creates the per-item bar for a whole run
pub fn create_items_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.green/white}] {pos}/{len} {msg}")
            .expect("Failed to create progress style")
            .progress_chars("=> "),
    );
    pb
}

/// Two stacked bars: items in the run, bytes of the current item
pub struct ProgressManager {
    pub items: ProgressBar,
    pub bytes: ProgressBar,
    _multi: MultiProgress,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(message: &str) -> Self {
        eprintln!("{message}");

        let multi = MultiProgress::new();
        let items = multi.add(create_items_bar(0));
        let bytes = multi.add(create_progress_bar(0));
        Self {
            items,
            bytes,
            _multi: multi,
        }
    }

    /// Callback rendering run events on the item bar
    pub fn event_callback(&self) -> EventCallback {
        let items = self.items.clone();
        let bytes = self.bytes.clone();
        Arc::new(move |event| match event {
            RunEvent::Progress { index, total, label } => {
                items.set_length(total as u64);
                items.set_position(index.saturating_sub(1) as u64);
                items.set_message(label);
                bytes.reset();
                bytes.set_length(0);
            }
            RunEvent::ItemOutcome { success, detail, .. } => {
                items.inc(1);
                if !success {
                    items.println(format!("❌ {detail}"));
                }
            }
            RunEvent::RunComplete {
                success,
                failed,
                skipped,
            } => {
                bytes.finish_and_clear();
                items.finish_with_message(format!(
                    "✅ {success} done, {skipped} skipped, {failed} failed"
                ));
            }
            RunEvent::RunError(message) => {
                bytes.finish_and_clear();
                items.abandon_with_message(format!("❌ {message}"));
            }
        })
    }

    /// Callback feeding the byte bar
    pub fn byte_callback(&self) -> ProgressCallback {
        let pb = self.bytes.clone();
        Arc::new(move |downloaded, total| {
            if total > 0 && pb.length().unwrap_or(0) != total {
                pb.set_length(total);
            }
            pb.set_position(downloaded);
        })
    }
}
