//! Explicit configuration handed to the credential provider, store and uploader.

use crate::retry::RetryPolicy;
use eyre::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default resumable chunk size (8 MiB). Must be a multiple of 256 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Every chunk but the last must be a multiple of this many bytes.
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes needed to upload a video and then place it in a playlist.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube",
];

/// Where credentials come from and where they are kept.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client registration downloaded from the Google Cloud Console.
    pub client_secrets: PathBuf,
    /// Credential store location.
    pub token_file: PathBuf,
    pub scopes: Vec<String>,
    /// How long to wait for the browser to hit the loopback redirect before giving up on it.
    pub loopback_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_secrets: PathBuf::from("client_secret.json"),
            token_file: PathBuf::from("token_youtube_upload.json"),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            loopback_timeout: Duration::from_secs(300),
        }
    }
}

/// Base URLs of the YouTube Data API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Metadata endpoints, e.g. `playlistItems`.
    pub api_base: String,
    /// Media endpoints, e.g. `videos` and `thumbnails/set`.
    pub upload_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/youtube/v3".to_string(),
        }
    }
}

impl Endpoints {
    /// Points both bases at a single host, as a local test server would serve them.
    pub fn with_host(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            api_base: format!("{host}/youtube/v3"),
            upload_base: format!("{host}/upload/youtube/v3"),
        }
    }
}

/// Tuning for the resumable upload itself.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub endpoints: Endpoints,
    pub chunk_size: u64,
    /// Upper bound on a single chunk request, including the response.
    pub chunk_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

/// An OAuth client registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    // As per <https://developers.google.com/identity/protocols/oauth2#installed>, installed
    // applications are not expected to keep this confidential, but we still don't log it.
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

/// The file downloaded from the Cloud Console wraps the registration in an application-type key.
#[derive(Deserialize)]
enum ClientSecretsFile {
    #[serde(rename = "installed")]
    Installed(ClientSecrets),
    #[serde(rename = "web")]
    Web(ClientSecrets),
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("parse OAuth client secrets JSON")?;
        let (ClientSecretsFile::Installed(secrets) | ClientSecretsFile::Web(secrets)) = file;
        if secrets.client_id.is_empty() {
            eyre::bail!("OAuth client secrets have an empty client_id");
        }
        Ok(secrets)
    }

    /// Reads a client registration, returning `Ok(None)` if the file does not exist.
    pub async fn load(path: &Path) -> eyre::Result<Option<Self>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", path.display()));
            }
        };
        Self::from_json(&json)
            .with_context(|| format!("load {}", path.display()))
            .map(Some)
    }
}
