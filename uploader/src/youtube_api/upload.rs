//! Resumable media upload for `videos.insert`.
//!
//! The protocol has two phases. Negotiation sends the video metadata together with the size and
//! type of the media, and the server answers with a session URL. Streaming then `PUT`s the file
//! to that URL in byte ranges; each range is acknowledged either with `308 Resume Incomplete`
//! (and a `Range` header naming what the server durably holds) or with the created resource.
//!
//! ```text
//! Idle -> Negotiating -> Streaming -> Completed
//!              |             |
//!              +-> Failed <--+
//! ```
//!
//! A session never goes back to negotiating: if its URL stops working, the upload fails.
//!
//! See: <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>

use crate::error::{BoxError, UploadError};
use crate::progress::ProgressTracker;
use crate::retry::RetryPolicy;
use crate::youtube_api::client::YouTubeClient;
use crate::youtube_api::videos::{UploadedVideo, VideoInsert};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use http::{Method, StatusCode};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

/// MIME type declared for the media when none is known more precisely.
pub const DEFAULT_CONTENT_TYPE: &str = "video/*";

/// Where a resumable session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Negotiating,
    Streaming,
    Completed,
    Failed,
}

/// One resumable upload session, alive for the duration of one upload call.
#[derive(Debug)]
pub struct UploadSession {
    endpoint: String,
    total_bytes: u64,
    bytes_sent: u64,
    chunk_size: u64,
    status: SessionStatus,
}

impl UploadSession {
    fn new(total_bytes: u64, chunk_size: u64) -> Self {
        Self {
            endpoint: String::new(),
            total_bytes,
            bytes_sent: 0,
            chunk_size: chunk_size.max(1),
            status: SessionStatus::Idle,
        }
    }

    /// The session-specific URL chunks are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes the server has acknowledged as durably received.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    fn transition(&mut self, to: SessionStatus) {
        tracing::trace!(from = ?self.status, ?to, "upload session transition");
        self.status = to;
    }

    /// Length of the chunk that starts at `offset`.
    fn chunk_len_at(&self, offset: u64) -> u64 {
        self.chunk_size.min(self.total_bytes.saturating_sub(offset))
    }
}

/// How the server answered a chunk (or a status query).
#[derive(Debug, PartialEq, Eq)]
enum ChunkAck {
    /// More bytes are expected, starting at this offset.
    Incomplete { next_offset: u64 },
    /// The upload finished and created this video.
    Complete { video_id: String },
}

/// Why a chunk request did not produce an acknowledgement.
#[derive(Debug)]
enum ChunkFailure {
    /// Worth retrying: network trouble or a 5xx.
    Transient(BoxError),
    /// Retrying cannot help.
    Fatal(UploadError),
}

impl YouTubeClient {
    /// Uploads a video file through a new resumable session.
    ///
    /// `on_progress` receives whole-number percentages, each strictly greater than the last.
    ///
    /// # Returns
    ///
    /// The ID of the created video.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.upload`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/videos/insert>
    #[instrument(skip(self, metadata, retry, on_progress))]
    pub async fn upload_video(
        &self,
        path: &Path,
        metadata: &VideoInsert,
        chunk_size: u64,
        retry: &RetryPolicy,
        on_progress: impl FnMut(u8),
    ) -> Result<String, UploadError> {
        let mut file = File::open(path).await.map_err(|e| UploadError::Io {
            context: format!("open {}", path.display()),
            source: e,
        })?;
        let total_bytes = file
            .metadata()
            .await
            .map_err(|e| UploadError::Io {
                context: format!("stat {}", path.display()),
                source: e,
            })?
            .len();
        if total_bytes == 0 {
            return Err(UploadError::Validation(format!(
                "file is empty: {}",
                path.display()
            )));
        }

        let mut session = UploadSession::new(total_bytes, chunk_size);
        let result = match self
            .negotiate(&mut session, metadata, DEFAULT_CONTENT_TYPE)
            .await
        {
            Ok(()) => {
                self.stream(&mut session, &mut file, retry, on_progress)
                    .await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(video_id) => {
                session.transition(SessionStatus::Completed);
                tracing::info!(%video_id, total_bytes, "resumable upload complete");
            }
            Err(e) => {
                session.transition(SessionStatus::Failed);
                tracing::error!(
                    error = %e,
                    bytes_sent = session.bytes_sent,
                    total_bytes,
                    "resumable upload failed"
                );
            }
        }
        result
    }

    /// Creates the upload session. Not retried: failure here ends the upload.
    async fn negotiate(
        &self,
        session: &mut UploadSession,
        metadata: &VideoInsert,
        content_type: &str,
    ) -> Result<(), UploadError> {
        session.transition(SessionStatus::Negotiating);
        let url = format!("{}/videos", self.endpoints().upload_base);

        let response = self
            .authorized(Method::POST, &url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Length", session.total_bytes)
            .header("X-Upload-Content-Type", content_type)
            .json(metadata)
            .send()
            .await
            .map_err(|e| UploadError::Negotiation {
                message: format!("send POST request to {url}"),
                source: Some(e.into()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(UploadError::negotiation(format!(
                "server answered {status}: {body}"
            )));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UploadError::negotiation("no session URL in response"))?;
        // Google sends an absolute URL, but resolve relative ones against the request.
        let endpoint = response
            .url()
            .join(location)
            .map_err(|e| UploadError::Negotiation {
                message: format!("invalid session URL {location:?}"),
                source: Some(e.into()),
            })?;

        session.endpoint = endpoint.to_string();
        session.transition(SessionStatus::Streaming);
        tracing::debug!(total_bytes = session.total_bytes, "resumable upload session created");
        Ok(())
    }

    /// Sends the file chunk by chunk until the server returns the created video.
    async fn stream(
        &self,
        session: &mut UploadSession,
        file: &mut File,
        retry: &RetryPolicy,
        on_progress: impl FnMut(u8),
    ) -> Result<String, UploadError> {
        let mut progress = ProgressTracker::new(session.total_bytes, on_progress);
        let mut budget = retry.budget();
        let mut offset = 0;

        loop {
            let len = session.chunk_len_at(offset);
            let chunk = read_chunk(file, offset, len).await?;
            tracing::trace!(offset, len, "sending chunk");

            let failure = match self.put_chunk(session, offset, chunk).await {
                Ok(ChunkAck::Complete { video_id }) => {
                    session.bytes_sent = session.total_bytes;
                    progress.update(session.total_bytes);
                    return Ok(video_id);
                }
                Ok(ChunkAck::Incomplete { next_offset }) => {
                    if next_offset > offset + len {
                        return Err(UploadError::Protocol(format!(
                            "server acknowledged {next_offset} bytes, but only {} were sent",
                            offset + len
                        )));
                    }
                    if next_offset >= session.total_bytes {
                        return Err(UploadError::Protocol(
                            "server holds every byte but did not return the video".to_string(),
                        ));
                    }
                    session.bytes_sent = next_offset;
                    progress.update(next_offset);
                    if next_offset > offset {
                        budget.reset();
                        offset = next_offset;
                        continue;
                    }
                    // The server kept nothing of this chunk, which is as good as a failure.
                    offset = next_offset;
                    BoxError::from(format!("server made no progress at offset {offset}"))
                }
                Err(ChunkFailure::Fatal(e)) => return Err(e),
                Err(ChunkFailure::Transient(e)) => e,
            };

            let Some(delay) = budget.record_failure() else {
                return Err(UploadError::TransientChunk {
                    attempts: budget.attempts(),
                    offset,
                    source: failure,
                });
            };
            tracing::warn!(
                error = %failure,
                offset,
                attempt = budget.attempts(),
                ?delay,
                "chunk upload failed, retrying"
            );
            tokio::time::sleep(delay).await;

            // Ask the server what it actually holds before resending anything.
            match self.query_offset(session).await {
                Ok(ChunkAck::Complete { video_id }) => {
                    session.bytes_sent = session.total_bytes;
                    progress.update(session.total_bytes);
                    return Ok(video_id);
                }
                Ok(ChunkAck::Incomplete { next_offset }) => {
                    if next_offset > session.total_bytes {
                        return Err(UploadError::Protocol(format!(
                            "server claims {next_offset} bytes of a {} byte upload",
                            session.total_bytes
                        )));
                    }
                    if next_offset == session.total_bytes {
                        return Err(UploadError::Protocol(
                            "server holds every byte but did not return the video".to_string(),
                        ));
                    }
                    tracing::debug!(offset = next_offset, "resuming upload");
                    if next_offset > offset {
                        budget.reset();
                    }
                    session.bytes_sent = next_offset;
                    progress.update(next_offset);
                    offset = next_offset;
                }
                Err(ChunkFailure::Fatal(e)) => return Err(e),
                Err(ChunkFailure::Transient(e)) => {
                    // Resend from where we were; the next failure counts against the budget.
                    tracing::debug!(error = %e, "upload status query failed");
                }
            }
        }
    }

    /// Sends bytes `[offset, offset + chunk.len())` of the file.
    async fn put_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        chunk: Bytes,
    ) -> Result<ChunkAck, ChunkFailure> {
        let len = chunk.len() as u64;
        let content_range = format!(
            "bytes {}-{}/{}",
            offset,
            offset + len - 1,
            session.total_bytes
        );
        let response = self
            .authorized(Method::PUT, &session.endpoint)
            .header(CONTENT_RANGE, content_range)
            .header(CONTENT_LENGTH, len)
            .header(CONTENT_TYPE, DEFAULT_CONTENT_TYPE)
            .timeout(self.media_timeout())
            .body(chunk)
            .send()
            .await
            .map_err(|e| ChunkFailure::Transient(e.into()))?;
        interpret_ack(response).await
    }

    /// Asks the session how many bytes it durably holds.
    async fn query_offset(&self, session: &UploadSession) -> Result<ChunkAck, ChunkFailure> {
        let response = self
            .authorized(Method::PUT, &session.endpoint)
            .header(CONTENT_RANGE, format!("bytes */{}", session.total_bytes))
            .header(CONTENT_LENGTH, 0)
            .timeout(self.media_timeout())
            .send()
            .await
            .map_err(|e| ChunkFailure::Transient(e.into()))?;
        interpret_ack(response).await
    }
}

/// Classifies a response from the session URL.
async fn interpret_ack(response: reqwest::Response) -> Result<ChunkAck, ChunkFailure> {
    let status = response.status();
    if status == StatusCode::PERMANENT_REDIRECT {
        let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
        let next_offset = match range {
            Some(range) => parse_range_end(range).ok_or_else(|| {
                ChunkFailure::Fatal(UploadError::Protocol(format!(
                    "malformed Range header {range:?}"
                )))
            })?,
            // no Range header means nothing has been received yet
            None => 0,
        };
        return Ok(ChunkAck::Incomplete { next_offset });
    }

    if status.is_success() {
        let body = response
            .bytes()
            .await
            .map_err(|e| ChunkFailure::Transient(e.into()))?;
        let video: UploadedVideo = serde_json::from_slice(&body).map_err(|e| {
            ChunkFailure::Fatal(UploadError::Protocol(format!(
                "terminal response is not a video resource: {e}"
            )))
        })?;
        return match video.id.filter(|id| !id.is_empty()) {
            Some(video_id) => Ok(ChunkAck::Complete { video_id }),
            None => Err(ChunkFailure::Fatal(UploadError::Protocol(format!(
                "terminal response has no video id: {}",
                String::from_utf8_lossy(&body)
            )))),
        };
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    if status.is_server_error() {
        Err(ChunkFailure::Transient(
            format!("server answered {status}: {body}").into(),
        ))
    } else {
        Err(ChunkFailure::Fatal(UploadError::ChunkRejected {
            status: status.as_u16(),
            body,
        }))
    }
}

/// Parses `bytes=0-N` into the next offset to send, `N + 1`.
fn parse_range_end(range: &str) -> Option<u64> {
    let (start, end) = range.trim().strip_prefix("bytes=")?.split_once('-')?;
    if start.trim() != "0" {
        return None;
    }
    end.trim().parse::<u64>().ok()?.checked_add(1)
}

/// Reads exactly `len` bytes starting at `offset`.
async fn read_chunk(file: &mut File, offset: u64, len: u64) -> Result<Bytes, UploadError> {
    let io_error = |source| UploadError::Io {
        context: format!("read {len} bytes at offset {offset} of the video file"),
        source,
    };
    file.seek(SeekFrom::Start(offset)).await.map_err(io_error)?;
    let mut buf = vec![0; len as usize];
    file.read_exact(&mut buf).await.map_err(io_error)?;
    Ok(Bytes::from(buf))
}
