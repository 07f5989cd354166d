//! YouTube Data API v3 resumable uploads
//!
//! The session is opened with a metadata POST; the returned `Location` is
//! the session URI. The file is then sent in chunks with `Content-Range`.
//! `308 Resume Incomplete` acknowledges a chunk and reports the stored
//! range; `200`/`201` carries the finished video resource.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use super::{UploadJob, UploadOutcome, UploadTransport};
use crate::auth::AccessTokenProvider;
use crate::context::AppContext;
use crate::error::{is_retriable_status, is_transient_http, Result, UploaderError};
use crate::retry::RetryPolicy;

const RESUME_INCOMPLETE: u16 = 308;
/// Resumable chunks must be multiples of this size
const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// What a single chunked transfer ended with
enum Transfer {
    Complete(String),
    /// Chunk retries used up
    Abandoned,
}

/// Upload transport speaking the resumable protocol
pub struct YouTubeTransport {
    http: Client,
    tokens: Arc<dyn AccessTokenProvider>,
    upload_endpoint: String,
    api_base: String,
    chunk_size: u64,
    max_file_size: u64,
    retry: RetryPolicy,
}

impl YouTubeTransport {
    pub fn new(
        tokens: Arc<dyn AccessTokenProvider>,
        upload_endpoint: impl Into<String>,
        api_base: impl Into<String>,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            tokens,
            upload_endpoint: upload_endpoint.into(),
            api_base: api_base.into(),
            chunk_size: 8 * 1024 * 1024,
            max_file_size: u64::MAX,
            retry,
        })
    }

    pub fn from_context(ctx: &AppContext, tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        let config = &ctx.config;
        let transport = Self::new(
            tokens,
            config.upload.upload_endpoint.clone(),
            config.upload.api_base.clone(),
            Duration::from_secs(config.upload.request_timeout_seconds),
            RetryPolicy::from_config(&config.retry),
        )?
        .with_chunk_size(config.chunk_size_bytes())
        .with_max_file_size((config.processing.max_file_size_gb * 1024.0 * 1024.0 * 1024.0) as u64);

        Ok(transport)
    }

    /// Chunk size in bytes, rounded down to the 256 KiB protocol granularity
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = (bytes / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY;
        self
    }

    /// Chunk size in bytes, without rounding
    #[cfg(test)]
    fn with_raw_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Files above this size are uploaded with a warning
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    async fn bearer(&self) -> Result<String> {
        let token = self.tokens.access_token().await.map_err(|e| match e {
            e @ UploaderError::Authentication(_) => e,
            other => UploaderError::Authentication(other.to_string()),
        })?;
        Ok(format!("Bearer {}", token))
    }

    /// Metadata for an uploaded video, used by the `info` command
    pub async fn video_info(&self, video_id: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/videos", self.api_base))
            .query(&[("part", "snippet,status,statistics"), ("id", video_id)])
            .header(AUTHORIZATION, self.bearer().await?)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: Value = response.json().await?;

        body["items"]
            .as_array()
            .and_then(|items| items.first())
            .cloned()
            .ok_or_else(|| UploaderError::Upload(format!("Video not found: {}", video_id)))
    }

    /// One full attempt: fresh session, then the chunked transfer
    async fn attempt(&self, job: &UploadJob, total: u64) -> Result<Transfer> {
        let bearer = self.bearer().await?;
        let session = self.start_session(job, total, &bearer).await?;
        debug!("Resumable session opened for {}", job.title);
        self.transfer(job, &session, total, &bearer).await
    }

    async fn start_session(&self, job: &UploadJob, total: u64, bearer: &str) -> Result<String> {
        let metadata = json!({
            "snippet": {
                "title": job.title,
                "description": job.description,
                "tags": job.tags,
                "categoryId": job.category,
            },
            "status": {
                "privacyStatus": job.privacy.as_str(),
            },
        });

        let response = self
            .http
            .post(&self.upload_endpoint)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header(AUTHORIZATION, bearer)
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", total.to_string())
            .json(&metadata)
            .send()
            .await?;

        let response = check_status(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                UploaderError::Upload("Resumable session response has no Location header".to_string())
            })
    }

    async fn transfer(
        &self,
        job: &UploadJob,
        session: &str,
        total: u64,
        bearer: &str,
    ) -> Result<Transfer> {
        let mut file = File::open(&job.file_path).await?;
        let mut offset = 0u64;
        let mut failures = 0u32;

        loop {
            // once every byte is stored only a status query can finalize the session
            let request = if offset < total {
                let end = (offset + self.chunk_size).min(total);
                let mut chunk = vec![0u8; (end - offset) as usize];
                file.seek(SeekFrom::Start(offset)).await?;
                file.read_exact(&mut chunk).await?;

                self.http
                    .put(session)
                    .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end - 1, total))
                    .body(chunk)
            } else {
                self.http
                    .put(session)
                    .header(CONTENT_RANGE, format!("bytes */{}", total))
                    .body(Vec::new())
            };

            let sent = request.header(AUTHORIZATION, bearer).send().await;

            let failure = match sent {
                Ok(response) => match response.status() {
                    StatusCode::OK | StatusCode::CREATED => {
                        return Ok(Transfer::Complete(video_id(response).await?));
                    }
                    status if status.as_u16() == RESUME_INCOMPLETE => {
                        let stored = stored_bytes(response.headers(), total);
                        let advanced = stored > offset;
                        offset = stored;
                        debug!("{} / {} bytes stored", offset, total);
                        if advanced {
                            continue;
                        }
                        UploaderError::RetriableUpload(format!(
                            "session made no progress past byte {}",
                            stored
                        ))
                    }
                    status if is_retriable_status(status) => {
                        let body = response.text().await.unwrap_or_default();
                        UploaderError::from_status(status, &body)
                    }
                    _ => {
                        return Err(check_status(response).await.err().unwrap_or_else(|| {
                            UploaderError::Upload("Unexpected chunk response".to_string())
                        }));
                    }
                },
                Err(e) if is_transient_http(&e) => {
                    UploaderError::RetriableUpload(format!("chunk transfer interrupted: {}", e))
                }
                Err(e) => return Err(e.into()),
            };

            warn!("Chunk upload failed for {}: {}", job.title, failure);
            if !self.retry.should_retry(failures) {
                warn!("Giving up on {} after {} chunk failures", job.title, failures + 1);
                return Ok(Transfer::Abandoned);
            }
            self.retry.wait(failures).await;
            failures += 1;

            match self.query_progress(session, total, bearer).await {
                Ok(Progress::Complete(id)) => return Ok(Transfer::Complete(id)),
                Ok(Progress::Stored(stored)) => offset = stored,
                Err(e) => debug!("Status query failed, resending from {}: {}", offset, e),
            }
        }
    }

    /// Ask how much of the file the session already holds
    async fn query_progress(&self, session: &str, total: u64, bearer: &str) -> Result<Progress> {
        let response = self
            .http
            .put(session)
            .header(AUTHORIZATION, bearer)
            .header(CONTENT_RANGE, format!("bytes */{}", total))
            .body(Vec::new())
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(Progress::Complete(video_id(response).await?)),
            status if status.as_u16() == RESUME_INCOMPLETE => {
                Ok(Progress::Stored(stored_bytes(response.headers(), total)))
            }
            _ => Err(check_status(response).await.err().unwrap_or_else(|| {
                UploaderError::Upload("Unexpected status query response".to_string())
            })),
        }
    }
}

enum Progress {
    Complete(String),
    Stored(u64),
}

/// Bytes the session holds, from a `Range: bytes=0-N` header, never more than `total`
fn stored_bytes(headers: &HeaderMap, total: u64) -> u64 {
    let stored = headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|range| range.rsplit('-').next())
        .and_then(|last| last.trim().parse::<u64>().ok())
        .map(|last| last.saturating_add(1))
        .unwrap_or(0);

    if stored > total {
        warn!("Server reports {} stored bytes of a {} byte file", stored, total);
    }
    stored.min(total)
}

async fn video_id(response: Response) -> Result<String> {
    let body: Value = response.json().await?;
    body["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| UploaderError::Upload("Upload response has no video id".to_string()))
}

/// Pass successful responses through, classify the rest
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(UploaderError::Authentication(format!(
            "Access token rejected: {}",
            body
        )));
    }
    Err(UploaderError::from_status(status, &body))
}

#[async_trait]
impl UploadTransport for YouTubeTransport {
    async fn upload(&self, job: &UploadJob) -> UploadOutcome {
        let total = match tokio::fs::metadata(&job.file_path).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => {
                return UploadOutcome::Failed(UploaderError::Upload(format!(
                    "File is empty: {}",
                    job.file_path.display()
                )))
            }
            Err(e) => {
                return UploadOutcome::Failed(UploaderError::Upload(format!(
                    "Cannot read {}: {}",
                    job.file_path.display(),
                    e
                )))
            }
        };

        if total > self.max_file_size {
            warn!(
                "⚠️ {} is {:.2} GB, above the configured limit",
                job.file_path.display(),
                total as f64 / 1024.0 / 1024.0 / 1024.0
            );
        }

        info!("🚀 Uploading to YouTube: {} ({} bytes)", job.title, total);

        for attempt in 0..self.retry.max_attempts() {
            match self.attempt(job, total).await {
                Ok(Transfer::Complete(id)) => {
                    info!("✅ Upload complete: {} (https://youtu.be/{})", job.title, id);
                    return UploadOutcome::Uploaded(id);
                }
                Ok(Transfer::Abandoned) => return UploadOutcome::Declined,
                Err(e @ UploaderError::Authentication(_)) => return UploadOutcome::Failed(e),
                Err(e) if e.is_retriable() => {
                    warn!(
                        "Retriable error on attempt {}/{} for {}: {}",
                        attempt + 1,
                        self.retry.max_attempts(),
                        job.title,
                        e
                    );
                    if self.retry.should_retry(attempt) {
                        self.retry.wait(attempt).await;
                    }
                }
                Err(e) => return UploadOutcome::Failed(e),
            }
        }

        warn!("Retries exhausted for {}", job.title);
        UploadOutcome::Declined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken(Option<&'static str>);

    #[async_trait]
    impl AccessTokenProvider for StaticToken {
        async fn access_token(&self) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| UploaderError::Authentication("no credentials".to_string()))
        }
    }

    fn transport(server: &MockServer, token: Option<&'static str>) -> YouTubeTransport {
        YouTubeTransport::new(
            Arc::new(StaticToken(token)),
            format!("{}/upload/youtube/v3/videos", server.uri()),
            format!("{}/youtube/v3", server.uri()),
            Duration::from_secs(5),
            RetryPolicy::immediate(3),
        )
        .unwrap()
    }

    fn job(dir: &TempDir, contents: &[u8]) -> UploadJob {
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, contents).unwrap();
        UploadJob::new(file, "Alice arena win", "00:00  Alice", &UploadConfig::default())
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .and(query_param("uploadType", "resumable"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Location", format!("{}/session/1", server.uri()).as_str()),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_stored_bytes() {
        let mut headers = HeaderMap::new();
        assert_eq!(stored_bytes(&headers, 1_000_000), 0);
        headers.insert(RANGE, "bytes=0-524287".parse().unwrap());
        assert_eq!(stored_bytes(&headers, 1_000_000), 524288);
        assert_eq!(stored_bytes(&headers, 10), 10);
    }

    #[test]
    fn test_chunk_size_granularity() {
        let server_uri = "http://127.0.0.1:9";
        let transport = YouTubeTransport::new(
            Arc::new(StaticToken(None)),
            server_uri,
            server_uri,
            Duration::from_secs(1),
            RetryPolicy::immediate(1),
        )
        .unwrap();

        assert_eq!(transport.with_chunk_size(300 * 1024).chunk_size, CHUNK_GRANULARITY);
    }

    #[tokio::test]
    async fn test_single_chunk_upload() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_session(&server).await;
        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("content-range", "bytes 0-9/10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vid123"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = transport(&server, Some("test-token")).upload(&job(&dir, b"0123456789")).await;

        assert_eq!(outcome.video_id(), Some("vid123"));
    }

    #[tokio::test]
    async fn test_multi_chunk_upload_follows_range() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_session(&server).await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 0-3/10"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-3"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 4-7/10"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-7"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 8-9/10"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "vid456"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = transport(&server, Some("test-token"))
            .with_raw_chunk_size(4)
            .upload(&job(&dir, b"0123456789"))
            .await;

        assert_eq!(outcome.video_id(), Some("vid456"));
    }

    #[tokio::test]
    async fn test_chunk_failures_are_resumed_then_declined() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_session(&server).await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 0-9/10"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes */10"))
            .respond_with(ResponseTemplate::new(308))
            .expect(2)
            .mount(&server)
            .await;

        let outcome = transport(&server, Some("test-token")).upload(&job(&dir, b"0123456789")).await;

        assert!(matches!(outcome, UploadOutcome::Declined));
    }

    #[tokio::test]
    async fn test_status_query_can_finish_upload() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_session(&server).await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 0-9/10"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes */10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "late"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = transport(&server, Some("test-token")).upload(&job(&dir, b"0123456789")).await;

        assert_eq!(outcome.video_id(), Some("late"));
    }

    #[tokio::test]
    async fn test_stalled_session_is_declined_after_retries() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_session(&server).await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 0-3/10"))
            .respond_with(ResponseTemplate::new(308))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes */10"))
            .respond_with(ResponseTemplate::new(308))
            .expect(2)
            .mount(&server)
            .await;

        let uploader = transport(&server, Some("test-token")).with_raw_chunk_size(4);
        let upload_job = job(&dir, b"0123456789");
        let upload = uploader.upload(&upload_job);
        let outcome = tokio::time::timeout(Duration::from_secs(5), upload).await.unwrap();

        assert!(matches!(outcome, UploadOutcome::Declined));
    }

    #[tokio::test]
    async fn test_range_past_end_of_file_is_clamped() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_session(&server).await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 0-3/10"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-19"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes */10"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-19"))
            .expect(5)
            .mount(&server)
            .await;

        let uploader = transport(&server, Some("test-token")).with_raw_chunk_size(4);
        let upload_job = job(&dir, b"0123456789");
        let upload = uploader.upload(&upload_job);
        let outcome = tokio::time::timeout(Duration::from_secs(5), upload).await.unwrap();

        assert!(matches!(outcome, UploadOutcome::Declined));
    }

    #[tokio::test]
    async fn test_fully_stored_session_is_finalized_by_status_query() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_session(&server).await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes 0-9/10"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-9"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(header("content-range", "bytes */10"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "final"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = transport(&server, Some("test-token")).upload(&job(&dir, b"0123456789")).await;

        assert_eq!(outcome.video_id(), Some("final"));
    }

    #[tokio::test]
    async fn test_session_server_errors_decline_after_retries() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let outcome = transport(&server, Some("test-token")).upload(&job(&dir, b"0123456789")).await;

        assert!(matches!(outcome, UploadOutcome::Declined));
    }

    #[tokio::test]
    async fn test_quota_error_fails_without_retry() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = transport(&server, Some("test-token")).upload(&job(&dir, b"0123456789")).await;

        assert!(matches!(outcome, UploadOutcome::Failed(UploaderError::Upload(_))));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_as_authentication() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let outcome = transport(&server, None).upload(&job(&dir, b"0123456789")).await;

        assert!(matches!(outcome, UploadOutcome::Failed(UploaderError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_empty_or_missing_file_fails() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let transport = transport(&server, Some("test-token"));

        let outcome = transport.upload(&job(&dir, b"")).await;
        assert!(matches!(outcome, UploadOutcome::Failed(UploaderError::Upload(_))));

        let mut missing = job(&dir, b"x");
        missing.file_path = PathBuf::from("/nonexistent/clip.mp4");
        let outcome = transport.upload(&missing).await;
        assert!(matches!(outcome, UploadOutcome::Failed(UploaderError::Upload(_))));
    }

    #[tokio::test]
    async fn test_video_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .and(query_param("id", "vid123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "vid123", "snippet": {"title": "Arenas 01-03-2024"}}]
            })))
            .mount(&server)
            .await;

        let transport = transport(&server, Some("test-token"));
        let info = transport.video_info("vid123").await.unwrap();
        assert_eq!(info["snippet"]["title"], "Arenas 01-03-2024");

        let missing = transport.video_info("other").await;
        assert!(missing.is_err());
    }
}
