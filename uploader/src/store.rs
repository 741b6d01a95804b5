//! File-backed storage for the single reusable credential.

use crate::credential::Credential;
use eyre::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Holds at most one [`Credential`] as JSON in a file.
///
/// Writes go to a sibling temp file that is then renamed over the store, so readers never observe
/// a torn credential. Writes through the same `CredentialStore` are also serialized.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored credential, or `None` if nothing has been stored yet.
    pub async fn load(&self) -> eyre::Result<Option<Credential>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no stored credential");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.path.display()));
            }
        };
        let credential = serde_json::from_str(&json)
            .with_context(|| format!("parse stored credential in {}", self.path.display()))?;
        Ok(Some(credential))
    }

    /// Replaces the stored credential.
    ///
    /// Each write goes to its own uniquely named temp file, so concurrent writers, even through
    /// different `CredentialStore`s, can race only on the final rename.
    pub async fn save(&self, credential: &Credential) -> eyre::Result<()> {
        let _guard = self.write_lock.lock().await;

        let json = serde_json::to_vec_pretty(credential).context("serialize credential")?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &json))
            .await
            .context("join credential writer")??;

        tracing::debug!(path = %self.path.display(), "stored credential");
        Ok(())
    }
}

/// Writes `contents` to a fresh temp file next to `path` and renames it over `path`.
///
/// The temp file is created with mode 0600 on unix, and is removed if anything fails before the
/// rename.
fn replace_file(path: &Path, contents: &[u8]) -> eyre::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".credential")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
