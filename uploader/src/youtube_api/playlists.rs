//! YouTube PlaylistItems API types.

use serde::{Deserialize, Serialize};

/// Request body for `playlistItems.insert`.
///
/// See: <https://developers.google.com/youtube/v3/docs/playlistItems/insert>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistItemInsert {
    pub snippet: PlaylistItemSnippet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistItemSnippet {
    #[serde(rename = "playlistId")]
    pub playlist_id: String,
    #[serde(rename = "resourceId")]
    pub resource_id: ResourceId,
}

/// Identifies the resource added to the playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceId {
    /// The value will be `youtube#video`.
    pub kind: String,
    #[serde(rename = "videoId")]
    pub video_id: String,
}

impl PlaylistItemInsert {
    pub fn video(playlist_id: &str, video_id: &str) -> Self {
        Self {
            snippet: PlaylistItemSnippet {
                playlist_id: playlist_id.to_string(),
                resource_id: ResourceId {
                    kind: "youtube#video".to_string(),
                    video_id: video_id.to_string(),
                },
            },
        }
    }
}

/// The `playlistItem` resource returned by a successful insert.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
}
