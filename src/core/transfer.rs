//! Throttled song transfer for playlist-dl
//!
//! Looks up an item's location, then streams it to disk. Location lookups
//! are spaced by the configured request interval across calls; the byte
//! rate inside one transfer can be capped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::location::LocationFetcher;
use crate::core::naming::{resolve_output_filename, FilenameFormat};
use crate::core::resolver::ResolvedItem;
use crate::core::stream::{create_http_stream, ProgressCallback, TransferPolicy};
use crate::core::transport::{Transport, GLOBAL_CLIENT};

/// Where and how one item lands on disk
#[derive(Debug, Clone, PartialEq)]
pub struct TransferTarget {
    pub directory: PathBuf,
    pub filename: String,
    /// Sustained byte rate cap; 0 disables throttling
    pub max_rate_bytes_per_sec: u64,
    pub skip_if_exists: bool,
}

impl TransferTarget {
    /// Target for `item` with its canonical, sanitized filename
    pub fn for_item(
        item: &ResolvedItem,
        directory: impl Into<PathBuf>,
        format: FilenameFormat,
        max_rate_bytes_per_sec: u64,
        skip_if_exists: bool,
    ) -> Self {
        Self {
            directory: directory.into(),
            filename: resolve_output_filename(item, format),
            max_rate_bytes_per_sec,
            skip_if_exists,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    fn partial_path(&self) -> PathBuf {
        self.directory.join(format!("{}.part", self.filename))
    }
}

/// Result of one item transfer
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Content written to this path
    Downloaded(PathBuf),
    /// Target already existed; nothing was fetched
    Skipped(PathBuf),
    /// All attempts failed
    Failed(String),
}

impl TransferOutcome {
    /// Downloaded and skipped both count as success
    pub fn is_success(&self) -> bool {
        !matches!(self, TransferOutcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TransferOutcome::Skipped(_))
    }

    /// Human-readable detail: the path, or the failure message
    pub fn detail(&self) -> String {
        match self {
            TransferOutcome::Downloaded(path) => path.display().to_string(),
            TransferOutcome::Skipped(path) => format!("Skipped: {} (already exists)", path.display()),
            TransferOutcome::Failed(message) => message.clone(),
        }
    }
}

/// How long to pause so that `downloaded` bytes took at least `downloaded / max_rate` seconds
pub fn throttle_delay(elapsed: Duration, downloaded: u64, max_rate_bytes_per_sec: u64) -> Option<Duration> {
    if max_rate_bytes_per_sec == 0 {
        return None;
    }
    let expected = Duration::from_secs_f64(downloaded as f64 / max_rate_bytes_per_sec as f64);
    expected.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Song transfer engine
///
/// One instance owns one request-spacing clock. Concurrent callers sharing
/// an instance are serialized around the location lookup.
pub struct Transfer {
    fetcher: LocationFetcher,
    client: Client,
    request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    policy: TransferPolicy,
    progress: Option<ProgressCallback>,
}

impl Transfer {
    pub fn new(fetcher: LocationFetcher, request_interval: Duration) -> Self {
        Self {
            fetcher,
            client: GLOBAL_CLIENT.clone(),
            request_interval,
            last_request: Mutex::new(None),
            policy: TransferPolicy::default(),
            progress: None,
        }
    }

    /// Build a transfer engine from the loaded configuration
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            LocationFetcher::from_config(config, transport),
            config.request_interval(),
        )
    }

    pub fn with_policy(mut self, policy: TransferPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Transfer one item; never returns an error, failures become [`TransferOutcome::Failed`]
    pub async fn transfer(
        &self,
        item: &ResolvedItem,
        target: &TransferTarget,
        quality: Option<&str>,
    ) -> TransferOutcome {
        let path = target.path();

        if target.skip_if_exists && path.exists() {
            info!("Skipping existing file: {}", path.display());
            return TransferOutcome::Skipped(path);
        }

        if let Err(e) = tokio::fs::create_dir_all(&target.directory).await {
            return TransferOutcome::Failed(format!(
                "Cannot create {}: {e}",
                target.directory.display()
            ));
        }

        let attempts = self.policy.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(item, target, quality).await {
                Ok(bytes) => {
                    debug!("Wrote {bytes} bytes to {}", path.display());
                    return TransferOutcome::Downloaded(path);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        warn!(
                            "⚠️  Transfer attempt {attempt} failed for '{}': {e}. Retrying in {}s...",
                            item.title,
                            self.policy.retry_delay.as_secs_f32()
                        );
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        TransferOutcome::Failed(format!("Failed after {attempts} attempts: {last_error}"))
    }

    async fn attempt(
        &self,
        item: &ResolvedItem,
        target: &TransferTarget,
        quality: Option<&str>,
    ) -> Result<u64> {
        let location = self.spaced_location(item, quality).await?;
        if location.is_empty() {
            return Err(Error::LocationUnavailable(format!(
                "no location for '{}' (id {})",
                item.title, item.id
            )));
        }

        let partial = target.partial_path();
        match self
            .stream_to_file(&location, &partial, target.max_rate_bytes_per_sec)
            .await
        {
            Ok(bytes) => {
                tokio::fs::rename(&partial, target.path()).await?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    /// Location lookup spaced by at least the request interval
    async fn spaced_location(&self, item: &ResolvedItem, quality: Option<&str>) -> Result<String> {
        let mut last_request = self.last_request.lock().await;

        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.request_interval {
                tokio::time::sleep(self.request_interval - elapsed).await;
            }
        }

        let result = self.fetcher.fetch_location(&item.id, quality).await;
        *last_request = Some(Instant::now());
        result
    }

    /// Stream `url` into `file_path`, honoring the byte-rate cap
    async fn stream_to_file(&self, url: &str, file_path: &Path, max_rate: u64) -> Result<u64> {
        let response = tokio::time::timeout(self.policy.stall_timeout, self.client.get(url).send())
            .await
            .map_err(|_| {
                Error::NetworkError(format!(
                    "No response from {url} within {}s",
                    self.policy.stall_timeout.as_secs_f32()
                ))
            })??;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("Failed to download: {status}")));
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut stream = create_http_stream(response);
        let mut file = tokio::fs::File::create(file_path).await?;
        let mut buffer = vec![0u8; self.policy.chunk_size.max(1)];

        let start = Instant::now();
        let mut downloaded = 0u64;

        loop {
            let bytes_read = tokio::time::timeout(self.policy.stall_timeout, stream.read(&mut buffer))
                .await
                .map_err(|_| {
                    Error::NetworkError(format!(
                        "Stream stalled for {}s at {downloaded} bytes",
                        self.policy.stall_timeout.as_secs_f32()
                    ))
                })?
                .map_err(|e| Error::NetworkError(format!("Stream read error: {e}")))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(&buffer[..bytes_read]).await?;
            downloaded += bytes_read as u64;

            if let Some(ref progress) = self.progress {
                progress(downloaded, total_size);
            }

            if let Some(pause) = throttle_delay(start.elapsed(), downloaded, max_rate) {
                tokio::time::sleep(pause).await;
            }
        }

        file.flush().await?;
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::SAMPLE;
    use crate::core::transport::fake::FakeTransport;
    use tempfile::tempdir;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const LOCATION_URL: &str = "https://three.example/url?id=42&level=standard";

    fn song() -> ResolvedItem {
        ResolvedItem {
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            id: "42".to_string(),
        }
    }

    fn fast_policy() -> TransferPolicy {
        TransferPolicy {
            attempts: 3,
            retry_delay: Duration::from_millis(10),
            chunk_size: 1024,
            stall_timeout: Duration::from_secs(5),
        }
    }

    fn engine(transport: Arc<FakeTransport>, interval: Duration) -> Transfer {
        let config = Config::from_json(SAMPLE).unwrap();
        let fetcher = LocationFetcher::from_config(&config, transport);
        Transfer::new(fetcher, interval).with_policy(fast_policy())
    }

    async fn content_server(body: Vec<u8>) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "audio/mpeg"))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[test]
    fn test_throttle_delay() {
        assert_eq!(throttle_delay(Duration::ZERO, 1000, 0), None);
        assert_eq!(
            throttle_delay(Duration::from_millis(250), 1000, 1000),
            Some(Duration::from_millis(750))
        );
        assert_eq!(throttle_delay(Duration::from_secs(2), 1000, 1000), None);
    }

    #[test]
    fn test_outcome_details() {
        let skipped = TransferOutcome::Skipped(PathBuf::from("/music/a.mp3"));
        assert!(skipped.is_success());
        assert!(skipped.is_skipped());
        assert!(skipped.detail().starts_with("Skipped"));

        let failed = TransferOutcome::Failed("Failed after 3 attempts: boom".to_string());
        assert!(!failed.is_success());
        assert_eq!(failed.detail(), "Failed after 3 attempts: boom");
    }

    #[tokio::test]
    async fn test_skip_existing_makes_no_request() {
        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::TitleArtist, 0, true);
        std::fs::write(target.path(), b"already here").unwrap();

        let transport = Arc::new(FakeTransport::new());
        let transfer = engine(Arc::clone(&transport), Duration::ZERO);

        let outcome = transfer.transfer(&song(), &target, None).await;

        assert_eq!(outcome, TransferOutcome::Skipped(target.path()));
        assert!(transport.calls().is_empty());
        assert_eq!(std::fs::read(target.path()).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_existing_file_overwritten_without_skip() {
        let test_data = b"B".repeat(2048);
        let mock_server = content_server(test_data.clone()).await;
        let transport = Arc::new(
            FakeTransport::new().respond(LOCATION_URL, &format!("{}/song.mp3", mock_server.uri())),
        );

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::ArtistTitle, 0, false);
        std::fs::write(target.path(), b"stale").unwrap();

        let outcome = engine(transport, Duration::ZERO).transfer(&song(), &target, None).await;

        assert_eq!(outcome, TransferOutcome::Downloaded(dir.path().join("Artist - Song.mp3")));
        assert_eq!(std::fs::read(target.path()).unwrap(), test_data);
    }

    #[tokio::test]
    async fn test_download_writes_file_and_reports_progress() {
        let test_data = b"A".repeat(4096);
        let mock_server = content_server(test_data.clone()).await;
        let transport = Arc::new(
            FakeTransport::new().respond(LOCATION_URL, &format!("{}/song.mp3", mock_server.uri())),
        );

        let seen = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let seen_clone = Arc::clone(&seen);
        let transfer = engine(transport, Duration::ZERO).with_progress(Arc::new(move |done, _| {
            seen_clone.store(done, std::sync::atomic::Ordering::SeqCst);
        }));

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path().join("nested"), FilenameFormat::TitleArtist, 0, true);
        let outcome = transfer.transfer(&song(), &target, None).await;

        assert_eq!(outcome, TransferOutcome::Downloaded(target.path()));
        assert_eq!(std::fs::read(target.path()).unwrap(), test_data);
        assert!(!target.partial_path().exists());
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 4096);
    }

    #[tokio::test]
    async fn test_empty_location_retried_then_fails() {
        let transport = Arc::new(FakeTransport::new().respond(LOCATION_URL, "   "));
        let transfer = engine(Arc::clone(&transport), Duration::ZERO);

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::TitleArtist, 0, false);
        let outcome = transfer.transfer(&song(), &target, None).await;

        match outcome {
            TransferOutcome::Failed(message) => {
                assert!(message.starts_with("Failed after 3 attempts"), "{message}");
                assert!(message.contains("no location for 'Song'"), "{message}");
            }
            other => panic!("Expected failure, got {other:?}"),
        }
        assert_eq!(transport.calls().len(), 3);
        assert!(!target.path().exists());
    }

    #[tokio::test]
    async fn test_content_error_reports_last_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        let transport = Arc::new(
            FakeTransport::new().respond(LOCATION_URL, &format!("{}/song.mp3", mock_server.uri())),
        );

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::TitleArtist, 0, false);
        let outcome = engine(transport, Duration::ZERO).transfer(&song(), &target, None).await;

        assert!(!outcome.is_success());
        assert!(outcome.detail().contains("404"), "{}", outcome.detail());
        assert!(!target.partial_path().exists());
    }

    #[tokio::test]
    async fn test_location_requests_are_spaced() {
        let mock_server = content_server(b"x".repeat(16)).await;
        let transport = Arc::new(
            FakeTransport::new().respond(LOCATION_URL, &format!("{}/song.mp3", mock_server.uri())),
        );
        let interval = Duration::from_millis(200);
        let transfer = engine(Arc::clone(&transport), interval);

        let dir = tempdir().unwrap();
        for n in 0..4 {
            let target = TransferTarget {
                directory: dir.path().to_path_buf(),
                filename: format!("song-{n}.mp3"),
                max_rate_bytes_per_sec: 0,
                skip_if_exists: false,
            };
            assert!(transfer.transfer(&song(), &target, None).await.is_success());
        }

        let times = transport.call_times();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= interval - Duration::from_millis(5), "gap {gap:?} below interval");
        }
    }

    #[tokio::test]
    async fn test_byte_rate_cap() {
        let mock_server = content_server(b"z".repeat(4096)).await;
        let transport = Arc::new(
            FakeTransport::new().respond(LOCATION_URL, &format!("{}/song.mp3", mock_server.uri())),
        );

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::TitleArtist, 8192, false);

        let start = Instant::now();
        let outcome = engine(transport, Duration::ZERO).transfer(&song(), &target, None).await;

        assert!(outcome.is_success());
        // 4096 bytes at 8192 B/s cannot finish in under half a second
        assert!(start.elapsed() >= Duration::from_millis(450), "{:?}", start.elapsed());
    }

    fn policy_with(attempts: u32, stall_timeout: Duration) -> TransferPolicy {
        TransferPolicy {
            attempts,
            stall_timeout,
            ..fast_policy()
        }
    }

    /// Answers 500 to the first request and the body afterwards
    struct FailsOnce {
        hits: AtomicUsize,
        body: Vec<u8>,
    }

    impl Respond for FailsOnce {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            if self.hits.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200).set_body_bytes(self.body.clone())
            }
        }
    }

    /// Sends headers and a few body bytes, then holds the connection open
    async fn stalling_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        format!("http://{addr}/song.mp3")
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failed_attempt() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(FailsOnce {
                hits: AtomicUsize::new(0),
                body: b"second time lucky".to_vec(),
            })
            .mount(&mock_server)
            .await;
        let transport = Arc::new(
            FakeTransport::new().respond(LOCATION_URL, &format!("{}/song.mp3", mock_server.uri())),
        );

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::TitleArtist, 0, false);
        let outcome = engine(Arc::clone(&transport), Duration::ZERO)
            .transfer(&song(), &target, None)
            .await;

        assert_eq!(outcome, TransferOutcome::Downloaded(target.path()));
        assert_eq!(std::fs::read(target.path()).unwrap(), b"second time lucky");
        // each attempt looks the location up again
        assert_eq!(transport.calls().len(), 2);
        assert!(!target.partial_path().exists());
    }

    #[tokio::test]
    async fn test_stalled_body_fails_and_removes_partial() {
        let url = stalling_server().await;
        let transport = Arc::new(FakeTransport::new().respond(LOCATION_URL, &url));

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::TitleArtist, 0, false);
        let outcome = engine(transport, Duration::ZERO)
            .with_policy(policy_with(1, Duration::from_millis(200)))
            .transfer(&song(), &target, None)
            .await;

        match outcome {
            TransferOutcome::Failed(message) => assert!(message.contains("stalled"), "{message}"),
            other => panic!("Expected Failed, got {other:?}"),
        }
        assert!(!target.partial_path().exists());
        assert!(!target.path().exists());
    }

    #[tokio::test]
    async fn test_slow_response_headers_time_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
            .mount(&mock_server)
            .await;
        let transport = Arc::new(
            FakeTransport::new().respond(LOCATION_URL, &format!("{}/song.mp3", mock_server.uri())),
        );

        let dir = tempdir().unwrap();
        let target = TransferTarget::for_item(&song(), dir.path(), FilenameFormat::TitleArtist, 0, false);
        let engine = engine(transport, Duration::ZERO).with_policy(policy_with(1, Duration::from_millis(200)));

        let outcome = tokio::time::timeout(Duration::from_secs(10), engine.transfer(&song(), &target, None))
            .await
            .expect("transfer should give up on a silent server");

        match outcome {
            TransferOutcome::Failed(message) => assert!(message.contains("No response"), "{message}"),
            other => panic!("Expected Failed, got {other:?}"),
        }
        assert!(!target.partial_path().exists());
    }
}
