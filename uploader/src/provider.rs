//! Hands out a currently-valid credential, refreshing or re-authorizing as needed.

use crate::config::{AuthConfig, ClientSecrets};
use crate::credential::{Credential, CredentialState};
use crate::error::UploadError;
use crate::oauth::{AuthorizationServer, RefreshOutcome};
use crate::store::CredentialStore;
use jiff::Timestamp;

/// Produces valid credentials backed by a [`CredentialStore`].
///
/// Every call reads the store once and writes it at most once: after a successful refresh, or
/// after a successful interactive authorization. A rejected refresh falls through to interactive
/// authorization exactly once; it never loops.
#[derive(Debug)]
pub struct CredentialProvider<A> {
    config: AuthConfig,
    store: CredentialStore,
    authority: A,
}

impl<A> CredentialProvider<A>
where
    A: AuthorizationServer,
{
    pub fn new(config: AuthConfig, authority: A) -> Self {
        let store = CredentialStore::new(config.token_file.clone());
        Self {
            config,
            store,
            authority,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Returns a credential that is not expired as of now.
    #[tracing::instrument(skip(self))]
    pub async fn valid_credential(&self) -> Result<Credential, UploadError> {
        let stored = self.store.load().await.map_err(UploadError::auth)?;

        match CredentialState::classify(stored, Timestamp::now()) {
            CredentialState::Valid(credential) => {
                tracing::debug!(expiry = %credential.expiry, "stored credential is still valid");
                return Ok(credential);
            }
            CredentialState::Refreshable(credential) => {
                let client = self.client_secrets().await?;
                match self.authority.refresh(&client, &credential).await {
                    RefreshOutcome::Refreshed(refreshed) => {
                        self.store.save(&refreshed).await.map_err(UploadError::auth)?;
                        tracing::info!(expiry = %refreshed.expiry, "refreshed stored credential");
                        return Ok(refreshed);
                    }
                    RefreshOutcome::Failed(reason) => {
                        tracing::warn!(%reason, "credential refresh failed, re-authorizing");
                    }
                }
            }
            CredentialState::Absent => {
                tracing::debug!("no usable stored credential");
            }
        }

        let client = self.client_secrets().await?;
        tracing::info!("authorizing with YouTube");
        let credential = self
            .authority
            .authorize(&client, &self.config.scopes)
            .await
            .map_err(UploadError::auth)?;
        self.store
            .save(&credential)
            .await
            .map_err(UploadError::auth)?;
        Ok(credential)
    }

    /// Loads the OAuth client registration. Missing configuration is never retried.
    async fn client_secrets(&self) -> Result<ClientSecrets, UploadError> {
        let path = &self.config.client_secrets;
        match ClientSecrets::load(path).await {
            Ok(Some(secrets)) => Ok(secrets),
            Ok(None) => Err(UploadError::config(format!(
                "missing {}; download your OAuth client JSON from the Google Cloud Console \
                (YouTube Data API v3 enabled)",
                path.display()
            ))),
            Err(e) => Err(UploadError::Config {
                message: format!("unusable {}", path.display()),
                source: Some(e.into()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// An authorization server that answers from a script and counts calls.
    #[derive(Default)]
    struct ScriptedAuthority {
        refresh_with: Mutex<Option<RefreshOutcome>>,
        refreshes: AtomicUsize,
        authorizations: AtomicUsize,
    }

    impl AuthorizationServer for ScriptedAuthority {
        async fn refresh(&self, _: &ClientSecrets, _: &Credential) -> RefreshOutcome {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.refresh_with
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| RefreshOutcome::Failed("invalid_grant".into()))
        }

        async fn authorize(&self, _: &ClientSecrets, _: &[String]) -> eyre::Result<Credential> {
            self.authorizations.fetch_add(1, Ordering::SeqCst);
            Ok(credential("from-consent", "2999-01-01T00:00:00Z", Some("1//new")))
        }
    }

    fn credential(access: &str, expiry: &str, refresh: Option<&str>) -> Credential {
        Credential {
            access_token: access.into(),
            refresh_token: refresh.map(str::to_string),
            expiry: expiry.parse().unwrap(),
            scopes: BTreeSet::new(),
        }
    }

    fn config(dir: &Path, with_client_secrets: bool) -> AuthConfig {
        let client_secrets = dir.join("client_secret.json");
        if with_client_secrets {
            std::fs::write(
                &client_secrets,
                r#"{"installed":{"client_id":"id","client_secret":"secret"}}"#,
            )
            .unwrap();
        }
        AuthConfig {
            client_secrets,
            token_file: dir.join("token.json"),
            ..AuthConfig::default()
        }
    }

    async fn provider_with(
        dir: &Path,
        stored: Option<Credential>,
        with_client_secrets: bool,
        authority: ScriptedAuthority,
    ) -> CredentialProvider<ScriptedAuthority> {
        let provider = CredentialProvider::new(config(dir, with_client_secrets), authority);
        if let Some(stored) = stored {
            provider.store().save(&stored).await.unwrap();
        }
        provider
    }

    #[tokio::test]
    async fn valid_credential_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let stored = credential("still-good", "2999-01-01T00:00:00Z", Some("1//r"));
        let provider =
            provider_with(dir.path(), Some(stored.clone()), false, Default::default()).await;

        assert_eq!(provider.valid_credential().await.unwrap(), stored);
        assert_eq!(provider.authority().refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(provider.authority().authorizations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let stored = credential("stale", "2000-01-01T00:00:00Z", Some("1//r"));
        let refreshed = credential("fresh", "2999-01-01T00:00:00Z", Some("1//r"));
        let authority = ScriptedAuthority {
            refresh_with: Mutex::new(Some(RefreshOutcome::Refreshed(refreshed.clone()))),
            ..Default::default()
        };
        let provider = provider_with(dir.path(), Some(stored), true, authority).await;

        assert_eq!(provider.valid_credential().await.unwrap(), refreshed);
        assert_eq!(provider.store().load().await.unwrap(), Some(refreshed));
        assert_eq!(provider.authority().refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(provider.authority().authorizations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back_to_consent_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let stored = credential("stale", "2000-01-01T00:00:00Z", Some("1//revoked"));
        let provider = provider_with(dir.path(), Some(stored), true, Default::default()).await;

        let credential = provider.valid_credential().await.unwrap();
        assert_eq!(credential.access_token, "from-consent");
        assert_eq!(provider.authority().refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(provider.authority().authorizations.load(Ordering::SeqCst), 1);
        assert_eq!(provider.store().load().await.unwrap(), Some(credential));
    }

    #[tokio::test]
    async fn expired_credential_without_refresh_token_goes_straight_to_consent() {
        let dir = tempfile::tempdir().unwrap();
        let stored = credential("stale", "2000-01-01T00:00:00Z", None);
        let provider = provider_with(dir.path(), Some(stored), true, Default::default()).await;

        provider.valid_credential().await.unwrap();
        assert_eq!(provider.authority().refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(provider.authority().authorizations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_client_configuration_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_with(dir.path(), None, false, Default::default()).await;

        let err = provider.valid_credential().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(provider.authority().refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(provider.authority().authorizations.load(Ordering::SeqCst), 0);
        assert_eq!(provider.store().load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_client_configuration_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_with(dir.path(), None, false, Default::default()).await;
        std::fs::write(dir.path().join("client_secret.json"), "{}").unwrap();

        let err = provider.valid_credential().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn corrupt_store_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_with(dir.path(), None, true, Default::default()).await;
        std::fs::write(dir.path().join("token.json"), "garbage").unwrap();

        let err = provider.valid_credential().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(provider.authority().authorizations.load(Ordering::SeqCst), 0);
    }
}
