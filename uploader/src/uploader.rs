//! Publishes one video: validate, authorize, upload, then decorate.

use crate::config::UploadSettings;
use crate::error::{PostStep, UploadError};
use crate::oauth::AuthorizationServer;
use crate::provider::CredentialProvider;
use crate::request::UploadRequest;
use crate::youtube_api::client::YouTubeClient;
use crate::youtube_api::videos::VideoInsert;
use std::path::Path;

/// Uploads videos on behalf of the account behind a [`CredentialProvider`].
///
/// Each call to [`Uploader::upload_video`] asks the provider for a credential exactly once and
/// uses its access token for every request of that upload.
#[derive(Debug)]
pub struct Uploader<A> {
    provider: CredentialProvider<A>,
    settings: UploadSettings,
    http: reqwest::Client,
}

impl<A> Uploader<A>
where
    A: AuthorizationServer,
{
    pub fn new(
        provider: CredentialProvider<A>,
        settings: UploadSettings,
    ) -> Result<Self, UploadError> {
        let http = YouTubeClient::http_client().map_err(|e| UploadError::Config {
            message: "HTTP client unavailable".to_string(),
            source: Some(e.into()),
        })?;
        Ok(Self {
            provider,
            settings,
            http,
        })
    }

    pub fn provider(&self) -> &CredentialProvider<A> {
        &self.provider
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Uploads `request`'s file with its metadata, then sets its thumbnail and adds it to its
    /// playlist when asked to.
    ///
    /// Returns the new video's ID. If a follow-up step fails, the video stays uploaded and the
    /// error names it in [`UploadError::PostProcessing`].
    #[tracing::instrument(skip_all, fields(file = %request.file_path().display()))]
    pub async fn upload_video(
        &self,
        request: &UploadRequest,
        on_progress: impl FnMut(u8),
    ) -> Result<String, UploadError> {
        check_media_file(request.file_path()).await?;

        let credential = self.provider.valid_credential().await?;
        let client = YouTubeClient::new(
            &credential,
            self.settings.endpoints.clone(),
            self.settings.chunk_timeout,
            self.http.clone(),
        );

        let metadata = VideoInsert::from(request);
        tracing::info!(
            title = request.title(),
            privacy = %metadata.status.privacy_status,
            "uploading video"
        );
        let video_id = client
            .upload_video(
                request.file_path(),
                &metadata,
                self.settings.chunk_size,
                &self.settings.retry,
                on_progress,
            )
            .await?;

        if let Some(thumbnail) = request.thumbnail_path() {
            if tokio::fs::try_exists(thumbnail).await.unwrap_or(false) {
                client
                    .set_thumbnail(&video_id, thumbnail)
                    .await
                    .map_err(|e| UploadError::PostProcessing {
                        step: PostStep::Thumbnail,
                        video_id: video_id.clone(),
                        source: e.into(),
                    })?;
            } else {
                tracing::warn!(
                    path = %thumbnail.display(),
                    "thumbnail not found, leaving the default thumbnail"
                );
            }
        }

        if let Some(playlist_id) = request.playlist_id() {
            client
                .insert_playlist_item(playlist_id, &video_id)
                .await
                .map_err(|e| UploadError::PostProcessing {
                    step: PostStep::Playlist,
                    video_id: video_id.clone(),
                    source: e.into(),
                })?;
        }

        Ok(video_id)
    }
}

/// The media file must be a non-empty regular file. Checked before anything touches the network.
async fn check_media_file(path: &Path) -> Result<(), UploadError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UploadError::Validation(format!(
                "file not found: {}",
                path.display()
            )));
        }
        Err(e) => {
            return Err(UploadError::Io {
                context: format!("stat {}", path.display()),
                source: e,
            });
        }
    };
    if !metadata.is_file() {
        return Err(UploadError::Validation(format!(
            "not a regular file: {}",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(UploadError::Validation(format!(
            "file is empty: {}",
            path.display()
        )));
    }
    Ok(())
}
