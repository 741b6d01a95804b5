//! What to upload, and how the pieces of a request are resolved from their sources.
//!
//! A request can be described in three layers: built-in defaults, command-line flags, and a
//! metadata file. [`resolve`] merges them with a fixed precedence (metadata file over flags over
//! defaults) and validates the result into an [`UploadRequest`].

use crate::error::UploadError;
use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CATEGORY_ID: &str = "22";

/// Who can see an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    #[default]
    Unlisted,
    Private,
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        })
    }
}

impl FromStr for PrivacyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(PrivacyStatus::Public),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            "private" => Ok(PrivacyStatus::Private),
            other => Err(format!(
                "unknown privacy status {other:?} (expected public, unlisted or private)"
            )),
        }
    }
}

/// A fully validated upload.
///
/// Fields are only reachable through accessors so the scheduling invariant holds for the
/// lifetime of the value: whenever `publish_at` is set, `privacy_status` is
/// [`PrivacyStatus::Private`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    file_path: PathBuf,
    title: String,
    description: String,
    tags: Vec<String>,
    category_id: String,
    privacy_status: PrivacyStatus,
    thumbnail_path: Option<PathBuf>,
    playlist_id: Option<String>,
    publish_at: Option<Timestamp>,
    made_for_kids: Option<bool>,
}

impl UploadRequest {
    /// Starts a request for `file_path` with the default description, category and privacy.
    pub fn new(file_path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            category_id: DEFAULT_CATEGORY_ID.to_string(),
            privacy_status: PrivacyStatus::default(),
            thumbnail_path: None,
            playlist_id: None,
            publish_at: None,
            made_for_kids: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category_id(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = category_id.into();
        self
    }

    pub fn with_privacy_status(mut self, privacy_status: PrivacyStatus) -> Self {
        self.privacy_status = privacy_status;
        self.enforce_schedule_privacy();
        self
    }

    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail_path = Some(path.into());
        self
    }

    pub fn with_playlist(mut self, playlist_id: impl Into<String>) -> Self {
        self.playlist_id = Some(playlist_id.into());
        self
    }

    /// Schedules the video. A scheduled video must stay private until it is published.
    pub fn with_publish_at(mut self, publish_at: Timestamp) -> Self {
        self.publish_at = Some(publish_at);
        self.enforce_schedule_privacy();
        self
    }

    pub fn with_made_for_kids(mut self, made_for_kids: bool) -> Self {
        self.made_for_kids = Some(made_for_kids);
        self
    }

    fn enforce_schedule_privacy(&mut self) {
        if self.publish_at.is_some() && self.privacy_status != PrivacyStatus::Private {
            tracing::debug!(
                requested = %self.privacy_status,
                "scheduled videos must be private until published"
            );
            self.privacy_status = PrivacyStatus::Private;
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    pub fn privacy_status(&self) -> PrivacyStatus {
        self.privacy_status
    }

    pub fn thumbnail_path(&self) -> Option<&Path> {
        self.thumbnail_path.as_deref()
    }

    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.as_deref()
    }

    pub fn publish_at(&self) -> Option<Timestamp> {
        self.publish_at
    }

    pub fn made_for_kids(&self) -> Option<bool> {
        self.made_for_kids
    }
}

/// Tags as written by a human: either a list, or a single string holding a JSON array or a
/// comma-separated list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagInput {
    List(Vec<String>),
    Text(String),
}

impl TagInput {
    pub fn into_tags(self) -> Vec<String> {
        match self {
            TagInput::List(tags) => tags,
            TagInput::Text(text) => parse_tags(&text),
        }
    }
}

/// Category IDs are strings on the wire, but metadata files often write them as numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CategoryInput {
    Text(String),
    Number(u64),
}

impl fmt::Display for CategoryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryInput::Text(s) => f.write_str(s),
            CategoryInput::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One layer of request fields, any of which may be left unset.
///
/// This is also the schema of a JSON metadata file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestLayer {
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<TagInput>,
    pub category_id: Option<CategoryInput>,
    pub privacy: Option<PrivacyStatus>,
    pub thumbnail: Option<PathBuf>,
    pub playlist_id: Option<String>,
    pub publish_at: Option<String>,
    pub made_for_kids: Option<bool>,
}

impl RequestLayer {
    /// The values used when neither flags nor a metadata file say otherwise.
    pub fn defaults() -> Self {
        Self {
            description: Some(String::new()),
            category_id: Some(CategoryInput::Text(DEFAULT_CATEGORY_ID.to_string())),
            privacy: Some(PrivacyStatus::default()),
            made_for_kids: Some(false),
            ..Self::default()
        }
    }

    /// Parses a JSON metadata file's contents.
    pub fn from_json(json: &str) -> Result<Self, UploadError> {
        serde_json::from_str(json)
            .map_err(|e| UploadError::Validation(format!("malformed metadata file: {e}")))
    }

    /// Fills every unset field of `self` from `lower`.
    fn over(self, lower: RequestLayer) -> RequestLayer {
        RequestLayer {
            file: self.file.or(lower.file),
            title: self.title.or(lower.title),
            description: self.description.or(lower.description),
            tags: self.tags.or(lower.tags),
            category_id: self.category_id.or(lower.category_id),
            privacy: self.privacy.or(lower.privacy),
            thumbnail: self.thumbnail.or(lower.thumbnail),
            playlist_id: self.playlist_id.or(lower.playlist_id),
            publish_at: self.publish_at.or(lower.publish_at),
            made_for_kids: self.made_for_kids.or(lower.made_for_kids),
        }
    }
}

/// Merges request layers and validates the result.
///
/// Precedence, highest first: `file_overrides`, then `flag_overrides`, then `defaults`. A field
/// set in a higher layer replaces the lower layers' value entirely; lists are not concatenated.
/// Blank strings count as unset for `file`, `title`, `thumbnail`, `playlist_id` and `publish_at`.
pub fn resolve(
    defaults: RequestLayer,
    file_overrides: RequestLayer,
    flag_overrides: RequestLayer,
) -> Result<UploadRequest, UploadError> {
    let merged = file_overrides.over(flag_overrides).over(defaults);

    let file = merged.file.filter(|p| !p.as_os_str().is_empty());
    let title = merged.title.filter(|t| !t.trim().is_empty());
    let (Some(file), Some(title)) = (file, title) else {
        return Err(UploadError::Validation(
            "missing required --file and --title (or provide them via --metadata)".to_string(),
        ));
    };

    let mut request = UploadRequest::new(file, title)
        .with_description(merged.description.unwrap_or_default())
        .with_tags(merged.tags.map(TagInput::into_tags).unwrap_or_default())
        .with_category_id(
            merged
                .category_id
                .map(|c| c.to_string())
                .unwrap_or_else(|| DEFAULT_CATEGORY_ID.to_string()),
        )
        .with_privacy_status(merged.privacy.unwrap_or_default());
    if let Some(thumbnail) = merged.thumbnail.filter(|p| !p.as_os_str().is_empty()) {
        request = request.with_thumbnail(thumbnail);
    }
    if let Some(playlist_id) = merged.playlist_id.filter(|p| !p.trim().is_empty()) {
        request = request.with_playlist(playlist_id.trim());
    }
    if let Some(publish_at) = merged.publish_at.filter(|p| !p.trim().is_empty()) {
        request = request.with_publish_at(parse_publish_at(&publish_at, &TimeZone::system())?);
    }
    if let Some(made_for_kids) = merged.made_for_kids {
        request = request.with_made_for_kids(made_for_kids);
    }
    Ok(request)
}

/// Splits tag input: a JSON array of values, or otherwise a comma-separated list.
pub fn parse_tags(input: &str) -> Vec<String> {
    let input = input.trim();
    if input.is_empty() {
        return Vec::new();
    }
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(input) {
        return items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
    }
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses a publish time into UTC.
///
/// Accepts RFC 3339 with an offset or `Z`, or a civil date-time such as `2025-01-31 14:30` or
/// `2025-01-31T14:30:00`, which is interpreted in `local`.
pub fn parse_publish_at(input: &str, local: &TimeZone) -> Result<Timestamp, UploadError> {
    let input = input.trim();
    if let Ok(ts) = input.parse::<Timestamp>() {
        return Ok(ts);
    }
    let invalid = || {
        UploadError::Validation(format!(
            "publish_at {input:?} is invalid; use 'YYYY-MM-DD HH:MM' (local), \
            'YYYY-MM-DDTHH:MM:SS' with an offset, or RFC 3339 '...Z'"
        ))
    };
    let civil: DateTime = input.parse().map_err(|_| invalid())?;
    civil
        .to_zoned(local.clone())
        .map(|zoned| zoned.timestamp())
        .map_err(|_| invalid())
}
