//! Failure taxonomy for a single video upload.
//!
//! Every fatal failure surfaces to the caller of [`crate::Uploader::upload_video`] as one
//! [`UploadError`] carrying its kind and cause. The only failure that is handled internally is a
//! rejected credential refresh, which falls through to interactive authorization.

use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a video upload did not produce a video ID.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The OAuth client registration is missing or unusable. Requires operator setup.
    #[error("OAuth client configuration unavailable: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// No valid credential could be obtained, even after refresh and re-authorization.
    #[error("could not obtain a valid YouTube credential")]
    Auth(#[source] BoxError),

    /// A local precondition failed before any network call was made.
    #[error("invalid upload request: {0}")]
    Validation(String),

    /// The resumable upload session could not be created.
    #[error("resumable upload session could not be negotiated: {message}")]
    Negotiation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A chunk kept failing with transient errors until the retry budget ran out.
    #[error("chunk upload failed after {attempts} attempts at byte offset {offset}")]
    TransientChunk {
        attempts: u32,
        offset: u64,
        #[source]
        source: BoxError,
    },

    /// The session URL rejected a chunk outright, for example because it expired.
    #[error("upload session rejected chunk with status {status}: {body}")]
    ChunkRejected { status: u16, body: String },

    /// The server response broke the resumable upload protocol.
    #[error("unexpected upload response: {0}")]
    Protocol(String),

    /// The video was uploaded, but a follow-up call failed. The video is not rolled back.
    #[error("{step} failed for uploaded video {video_id}")]
    PostProcessing {
        step: PostStep,
        video_id: String,
        #[source]
        source: BoxError,
    },

    /// The media file could not be read while streaming.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fieldless mirror of [`UploadError`] variants, for matching and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Auth,
    Validation,
    Negotiation,
    TransientChunk,
    ChunkRejected,
    Protocol,
    PostProcessing,
    Io,
}

/// Follow-up calls made after the video itself has been uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStep {
    Thumbnail,
    Playlist,
}

impl fmt::Display for PostStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostStep::Thumbnail => f.write_str("setting the thumbnail"),
            PostStep::Playlist => f.write_str("adding the video to the playlist"),
        }
    }
}

impl UploadError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn auth(report: eyre::Report) -> Self {
        Self::Auth(report.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Config { .. } => ErrorKind::Config,
            UploadError::Auth(_) => ErrorKind::Auth,
            UploadError::Validation(_) => ErrorKind::Validation,
            UploadError::Negotiation { .. } => ErrorKind::Negotiation,
            UploadError::TransientChunk { .. } => ErrorKind::TransientChunk,
            UploadError::ChunkRejected { .. } => ErrorKind::ChunkRejected,
            UploadError::Protocol(_) => ErrorKind::Protocol,
            UploadError::PostProcessing { .. } => ErrorKind::PostProcessing,
            UploadError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Process exit code for the CLI: 2 for local validation failures, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Validation => 2,
            _ => 1,
        }
    }
}
