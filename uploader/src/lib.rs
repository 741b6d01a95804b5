//! Resumable YouTube video uploads with a self-maintaining OAuth credential.
//!
//! The entry point is [`Uploader::upload_video`]. It checks the media file, gets a valid
//! credential from a [`CredentialProvider`] (refreshing it, or running the interactive consent
//! flow, as needed), streams the file through a resumable upload session, and then optionally
//! sets a thumbnail and adds the video to a playlist.
//!
//! ```no_run
//! # async fn run() -> Result<(), youtube_upload::UploadError> {
//! use youtube_upload::{AuthConfig, CredentialProvider, OAuthManager, UploadError};
//! use youtube_upload::{UploadRequest, UploadSettings, Uploader};
//!
//! let config = AuthConfig::default();
//! let oauth = OAuthManager::new(config.loopback_timeout)
//!     .map_err(|e| UploadError::Auth(e.into()))?;
//! let provider = CredentialProvider::new(config, oauth);
//! let uploader = Uploader::new(provider, UploadSettings::default())?;
//!
//! let request = UploadRequest::new("talk.mp4", "My talk").with_tags(["rust"]);
//! let video_id = uploader.upload_video(&request, |pct| eprintln!("{pct}%")).await?;
//! println!("https://youtu.be/{video_id}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod oauth;
pub mod progress;
pub mod provider;
pub mod request;
pub mod retry;
pub mod store;
pub mod uploader;
pub mod youtube_api;

pub use config::{AuthConfig, ClientSecrets, Endpoints, UploadSettings};
pub use credential::{Credential, CredentialState};
pub use error::{ErrorKind, PostStep, UploadError};
pub use oauth::{AuthorizationServer, OAuthManager, RefreshOutcome};
pub use provider::CredentialProvider;
pub use request::{PrivacyStatus, RequestLayer, UploadRequest};
pub use retry::RetryPolicy;
pub use store::CredentialStore;
pub use uploader::Uploader;
