//! The slice of the YouTube Data API v3 needed to publish a video.
//!
//! [`client::YouTubeClient`] carries an access token and the API base URLs. The resumable
//! `videos.insert` upload lives in [`upload`], and the follow-up calls that decorate an uploaded
//! video (`thumbnails.set` and `playlistItems.insert`) live on the client itself.

pub mod client;
pub mod playlists;
pub mod upload;
pub mod videos;

pub use client::YouTubeClient;
pub use upload::{SessionStatus, UploadSession};
pub use videos::{UploadedVideo, VideoInsert};
