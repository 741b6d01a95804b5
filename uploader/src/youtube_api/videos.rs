//! YouTube Videos API types for `videos.insert`.

use crate::request::{PrivacyStatus, UploadRequest};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Metadata sent when negotiating a resumable `videos.insert` session.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInsert {
    pub snippet: VideoSnippet,
    pub status: VideoStatus,
}

/// The `snippet` part of a video: what viewers see.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#snippet>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSnippet {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(rename = "categoryId")]
    pub category_id: String,
}

/// The `status` part of a video: visibility and audience.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStatus {
    #[serde(rename = "privacyStatus")]
    pub privacy_status: PrivacyStatus,
    /// When a private video becomes public. Only valid when `privacy_status` is private.
    #[serde(rename = "publishAt", skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<Timestamp>,
    #[serde(rename = "madeForKids", skip_serializing_if = "Option::is_none")]
    pub made_for_kids: Option<bool>,
}

impl From<&UploadRequest> for VideoInsert {
    fn from(request: &UploadRequest) -> Self {
        let mut privacy_status = request.privacy_status();
        // UploadRequest already upholds this, but the wire body is what YouTube checks.
        if request.publish_at().is_some() {
            privacy_status = PrivacyStatus::Private;
        }
        Self {
            snippet: VideoSnippet {
                title: request.title().to_string(),
                description: request.description().to_string(),
                tags: request.tags().to_vec(),
                category_id: request.category_id().to_string(),
            },
            status: VideoStatus {
                privacy_status,
                publish_at: request.publish_at(),
                made_for_kids: request.made_for_kids(),
            },
        }
    }
}

/// The terminal response of a resumable upload: the created `video` resource.
///
/// Only the ID matters to us. It is optional here so that a success response without one can be
/// told apart from a transport failure and reported as a protocol error.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedVideo {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: Option<String>,
    /// Identifies the API resource's type. The value will be `youtube#video`.
    pub kind: Option<String>,
}
