//! Core YouTube API client functionality.

use crate::config::Endpoints;
use crate::credential::Credential;
use crate::youtube_api::playlists::{PlaylistItem, PlaylistItemInsert};
use eyre::Context;
use http::Method;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Client for interacting with the YouTube Data API v3 on behalf of one credential.
///
/// The access token is taken as-is; making sure it is fresh is the job of
/// [`crate::provider::CredentialProvider`], which is consulted once per upload.
#[derive(Clone)]
pub struct YouTubeClient {
    access_token: String,
    endpoints: Endpoints,
    /// Upper bound on a single request carrying media bytes.
    media_timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for YouTubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeClient")
            .field("endpoints", &self.endpoints)
            .field("media_timeout", &self.media_timeout)
            .finish_non_exhaustive()
    }
}

impl YouTubeClient {
    /// Creates a client that authenticates with `credential`'s access token.
    ///
    /// `client` should not follow redirects: the resumable upload protocol answers with
    /// `308 Resume Incomplete`, which is not a redirect.
    pub fn new(
        credential: &Credential,
        endpoints: Endpoints,
        media_timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            access_token: credential.access_token.clone(),
            endpoints,
            media_timeout,
            client,
        }
    }

    /// Builds the HTTP client the API calls expect.
    pub fn http_client() -> eyre::Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build YouTube HTTP client")
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) fn media_timeout(&self) -> Duration {
        self.media_timeout
    }

    /// Starts a request with the authorization header set.
    pub(crate) fn authorized(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    /// Makes an authenticated HTTP request to the YouTube API with common error handling.
    ///
    /// Adds query parameters and a JSON body when given, and turns any non-success status into
    /// an error carrying the response body.
    ///
    /// # Returns
    ///
    /// The raw [`reqwest::Response`] for method-specific JSON parsing.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        url: &str,
        query_params: Option<&[(&str, &str)]>,
        json_body: Option<&impl Serialize>,
    ) -> eyre::Result<reqwest::Response> {
        let mut request = self.authorized(method.clone(), url);

        if let Some(params) = query_params {
            request = request.query(params);
        }

        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to YouTube API: {}", method, url))?;

        error_for_status(response, &method).await
    }

    /// Sets a custom thumbnail for a video.
    ///
    /// Uses the `thumbnails.set` API with a simple media upload of the image file.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.upload`, or
    /// * `https://www.googleapis.com/auth/youtube`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/thumbnails/set>
    #[instrument(skip(self))]
    pub async fn set_thumbnail(&self, video_id: &str, image: &Path) -> eyre::Result<()> {
        let url = format!("{}/thumbnails/set", self.endpoints.upload_base);
        let bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("read thumbnail {}", image.display()))?;

        let response = self
            .authorized(Method::POST, &url)
            .query(&[("videoId", video_id), ("uploadType", "media")])
            .header(http::header::CONTENT_TYPE, thumbnail_content_type(image))
            .timeout(self.media_timeout)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("send POST request to YouTube API: {url}"))?;
        error_for_status(response, &Method::POST).await?;

        tracing::info!(video_id, "set video thumbnail");
        Ok(())
    }

    /// Adds a video to the end of a playlist.
    ///
    /// Uses the `playlistItems.insert` API.
    ///
    /// # Returns
    ///
    /// The ID of the created playlist item.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/insert>
    #[instrument(skip(self))]
    pub async fn insert_playlist_item(
        &self,
        playlist_id: &str,
        video_id: &str,
    ) -> eyre::Result<String> {
        let url = format!("{}/playlistItems", self.endpoints.api_base);
        let body = PlaylistItemInsert::video(playlist_id, video_id);

        let response = self
            .make_authenticated_request(
                Method::POST,
                &url,
                Some(&[("part", "snippet")]),
                Some(&body),
            )
            .await?;

        let item: PlaylistItem = response
            .json()
            .await
            .context("parse YouTube playlistItems.insert response as JSON")?;

        tracing::info!(playlist_id, video_id, item_id = %item.id, "added video to playlist");
        Ok(item.id)
    }
}

/// Turns a non-success response into an error that carries the response body.
async fn error_for_status(
    response: reqwest::Response,
    method: &Method,
) -> eyre::Result<reqwest::Response> {
    let status_code = response.status();
    if !status_code.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(eyre::eyre!(
            "YouTube API {} request failed with status {}: {}",
            method,
            status_code,
            error_text
        ));
    }
    Ok(response)
}

/// Picks the image MIME type YouTube expects from the file extension.
fn thumbnail_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
