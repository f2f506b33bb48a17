//! Streaming photo downloads with progress reporting and bounded retry.
//!
//! Bytes are consumed incrementally off the response stream; fractional
//! progress (received/expected) is reported at a throttled cadence so UI
//! callbacks stay cheap. Retries cover transport-class failures only:
//! a bad status or undecodable image is deterministic and terminal.

use std::time::Duration;

use futures::StreamExt;
use image::DynamicImage;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Default number of download attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Report progress at most once per this many received bytes.
const PROGRESS_GRANULARITY_BYTES: u64 = 1024;

/// Base delay for linear backoff: attempt_index x this.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum FetchError {
    /// Non-200 status. Deterministic - never retried.
    #[error("Invalid response: HTTP {0}")]
    InvalidResponse(u16),

    /// Downloaded bytes are not a decodable image. Never retried.
    #[error("Invalid image data")]
    InvalidImageData,

    /// Transport-level failure - the only retryable class.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// All attempts exhausted without capturing a concrete error.
    #[error("Download failed")]
    DownloadFailed,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

/// Throttles fractional progress reports.
///
/// With an unknown expected length no reports are emitted at all - no
/// division by zero, no spurious 100%.
struct ProgressTracker {
    expected: Option<u64>,
    received: u64,
    last_reported: u64,
}

impl ProgressTracker {
    fn new(expected: Option<u64>) -> Self {
        Self {
            expected: expected.filter(|&len| len > 0),
            received: 0,
            last_reported: 0,
        }
    }

    /// Record a chunk; returns the fraction to report, if any.
    fn update(&mut self, chunk_len: usize) -> Option<f64> {
        self.received += chunk_len as u64;
        let expected = self.expected?;
        let done = self.received >= expected;
        if !done && self.received - self.last_reported < PROGRESS_GRANULARITY_BYTES {
            return None;
        }
        self.last_reported = self.received;
        Some((self.received as f64 / expected as f64).min(1.0))
    }
}

#[derive(Clone)]
pub struct ProgressiveFetcher {
    client: Client,
}

impl ProgressiveFetcher {
    /// Build on an existing reqwest client (shares pool and timeouts with
    /// the API client).
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Stream a photo's bytes and decode them, reporting throttled
    /// fractional progress along the way.
    pub async fn load_image(
        &self,
        url: &str,
        mut on_progress: impl FnMut(f64),
    ) -> Result<DynamicImage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Network)?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::InvalidResponse(response.status().as_u16()));
        }

        let mut tracker = ProgressTracker::new(response.content_length());
        let mut buf = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(FetchError::Network)?;
            buf.extend_from_slice(&chunk);
            if let Some(fraction) = tracker.update(chunk.len()) {
                on_progress(fraction);
            }
        }

        debug!(url, bytes = buf.len(), "Download complete, decoding");
        image::load_from_memory(&buf).map_err(|_| FetchError::InvalidImageData)
    }

    /// `load_image` with bounded retry: transport failures back off
    /// linearly (attempt_index x 1s) and retry up to `max_attempts`;
    /// deterministic failures surface immediately.
    pub async fn load_image_with_retry(
        &self,
        url: &str,
        max_attempts: u32,
        mut on_progress: impl FnMut(f64),
    ) -> Result<DynamicImage, FetchError> {
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                warn!(url, attempt, "Retrying photo download");
                tokio::time::sleep(BACKOFF_BASE * attempt).await;
            }
            match self.load_image(url, &mut on_progress).await {
                Ok(image) => return Ok(image),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(FetchError::DownloadFailed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one scripted response per connection; `None` slams the
    /// connection shut without replying, simulating a transport failure.
    async fn spawn_server(responses: Vec<Option<Vec<u8>>>) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("http://{}/photo.jpg", listener.local_addr().expect("addr"));
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut req = [0u8; 1024];
                let _ = stream.read(&mut req).await;
                if let Some(body) = response {
                    let _ = stream.write_all(&body).await;
                }
            }
        });

        (url, hits)
    }

    fn http_response(status: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::new_rgba8(2, 2)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode");
        buf
    }

    fn fetcher() -> ProgressiveFetcher {
        ProgressiveFetcher::new(Client::new())
    }

    #[test]
    fn test_error_classification() {
        assert!(!FetchError::InvalidResponse(404).is_retryable());
        assert!(!FetchError::InvalidImageData.is_retryable());
        assert!(!FetchError::DownloadFailed.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_status_is_not_retried() {
        let (url, hits) = spawn_server(vec![Some(http_response("404 Not Found", b""))]).await;

        let result = fetcher().load_image_with_retry(&url, 3, |_| {}).await;

        assert!(matches!(result, Err(FetchError::InvalidResponse(404))));
        assert_eq!(hits.load(Ordering::SeqCst), 1, "exactly one attempt");
    }

    #[tokio::test]
    async fn test_undecodable_body_is_not_retried() {
        let (url, hits) =
            spawn_server(vec![Some(http_response("200 OK", b"definitely not a jpeg"))]).await;

        let result = fetcher().load_image_with_retry(&url, 3, |_| {}).await;

        assert!(matches!(result, Err(FetchError::InvalidImageData)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_retried_until_success() {
        // First connection is dropped mid-request, second serves the image.
        let (url, hits) =
            spawn_server(vec![None, Some(http_response("200 OK", &png_bytes()))]).await;

        let image = fetcher()
            .load_image_with_retry(&url, 3, |_| {})
            .await
            .expect("second attempt succeeds");

        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_last_transport_error() {
        let (url, hits) = spawn_server(vec![None, None]).await;

        let result = fetcher().load_image_with_retry(&url, 2, |_| {}).await;

        assert!(matches!(result, Err(FetchError::Network(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 2, "all attempts used");
    }

    #[tokio::test]
    async fn test_successful_download_reports_completion() {
        let (url, _) = spawn_server(vec![Some(http_response("200 OK", &png_bytes()))]).await;

        let mut last = None;
        fetcher()
            .load_image(&url, |fraction| last = Some(fraction))
            .await
            .expect("download");

        let last = last.expect("at least one progress report");
        assert!((last - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_skipped_without_content_length() {
        let mut tracker = ProgressTracker::new(None);
        assert!(tracker.update(10_000).is_none());
        assert!(tracker.update(10_000).is_none());
    }

    #[test]
    fn test_progress_throttled_to_1k_granularity() {
        let mut tracker = ProgressTracker::new(Some(10_240));

        // Sub-1KiB chunks accumulate silently until the threshold.
        assert!(tracker.update(512).is_none());
        let report = tracker.update(512).expect("1 KiB boundary reports");
        assert!((report - 0.1).abs() < 1e-9);

        assert!(tracker.update(100).is_none(), "throttled after a report");
    }

    #[test]
    fn test_progress_reports_completion() {
        let mut tracker = ProgressTracker::new(Some(2_000));
        assert!(tracker.update(1_024).is_some());
        let last = tracker.update(976).expect("final chunk always reports");
        assert!((last - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_clamps_overshoot() {
        let mut tracker = ProgressTracker::new(Some(1_000));
        let report = tracker.update(1_500).expect("report");
        assert!(report <= 1.0);
    }

    #[test]
    fn test_zero_content_length_reports_nothing() {
        let mut tracker = ProgressTracker::new(Some(0));
        assert!(tracker.update(100).is_none());
    }
}
