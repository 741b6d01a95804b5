//! OAuth 2.0 flows against Google's authorization server.
//!
//! This module covers the two ways a [`Credential`] is minted: refreshing an existing one, and
//! asking the user for consent. Consent is attempted through a loopback redirect first (a
//! temporary local HTTP server receives the callback from the user's browser). When that cannot
//! complete, for example because there is no browser to open, the user is asked to paste the
//! authorization code into the terminal instead.

use crate::config::ClientSecrets;
use crate::credential::Credential;
use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use jiff::Timestamp;
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenUrl,
};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Redirect target for the console flow. Nothing listens there; the user copies the code (or the
/// whole URL) out of the browser's address bar after the redirect fails to load.
const CONSOLE_REDIRECT_URL: &str = "http://localhost";

const OAUTH_DONE: &str = include_str!("../oauth_success.html");

/// Result of asking the authorization server to refresh a credential.
///
/// A failed refresh is an expected outcome (revoked grant, expired refresh token, flaky network),
/// and callers are meant to fall back to interactive authorization rather than abort.
#[derive(Debug)]
pub enum RefreshOutcome {
    Refreshed(Credential),
    Failed(String),
}

/// The authorization server, as the credential provider needs it.
pub trait AuthorizationServer {
    /// Exchanges `credential`'s refresh token for a new access token.
    fn refresh(
        &self,
        client: &ClientSecrets,
        credential: &Credential,
    ) -> impl Future<Output = RefreshOutcome> + Send;

    /// Obtains a brand new credential through user consent.
    fn authorize(
        &self,
        client: &ClientSecrets,
        scopes: &[String],
    ) -> impl Future<Output = eyre::Result<Credential>> + Send;
}

/// Talks to a real OAuth 2.0 authorization server over HTTP.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    http: oauth2::reqwest::Client,
    loopback_timeout: Duration,
    open_browser: bool,
}

impl OAuthManager {
    pub fn new(loopback_timeout: Duration) -> eyre::Result<Self> {
        let http = oauth2::reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")?;
        Ok(Self {
            http,
            loopback_timeout,
            open_browser: true,
        })
    }

    /// Skips the loopback flow and goes straight to pasting a code, for headless machines.
    pub fn console_only(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Exchanges an authorization code, keeping the PKCE verifier paired with its challenge.
    async fn exchange_code(
        &self,
        client: &ClientSecrets,
        redirect_url: RedirectUrl,
        code: AuthorizationCode,
        pkce_verifier: PkceCodeVerifier,
        scopes: &[String],
    ) -> eyre::Result<Credential> {
        let oauth = BasicClient::new(ClientId::new(client.client_id.clone()))
            .set_client_secret(ClientSecret::new(client.client_secret.clone()))
            .set_token_uri(TokenUrl::new(client.token_uri.clone()).context("parse token URL")?)
            .set_redirect_uri(redirect_url);
        let token: BasicTokenResponse = oauth
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("exchange authorization code for access token")?;
        Ok(Credential::from_token_response(&token, scopes, Timestamp::now()))
    }

    /// Builds the consent URL the user has to visit.
    fn consent_url(
        client: &ClientSecrets,
        redirect_url: RedirectUrl,
        csrf: CsrfToken,
        pkce_challenge: PkceCodeChallenge,
        scopes: &[String],
    ) -> eyre::Result<oauth2::url::Url> {
        let oauth = BasicClient::new(ClientId::new(client.client_id.clone()))
            .set_auth_uri(AuthUrl::new(client.auth_uri.clone()).context("parse auth URL")?)
            .set_redirect_uri(redirect_url);
        let (url, _csrf) = oauth
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            // Without these Google only issues a refresh token on the very first consent.
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();
        Ok(url)
    }

    /// Runs the loopback-redirect flow: open the browser, wait for the local callback.
    async fn authorize_loopback(
        &self,
        client: &ClientSecrets,
        scopes: &[String],
    ) -> eyre::Result<Credential> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let auth_url =
            Self::consent_url(client, redirect_url.clone(), csrf, pkce_challenge, scopes)?;

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow in browser");
        webbrowser::open(auth_url.as_str()).context("open user's browser")?;

        let authorization_code =
            tokio::time::timeout(self.loopback_timeout, eventually_authorization_code)
                .await
                .context("timed out waiting for browser authorization")?
                .context("await user authorization code")?;

        self.exchange_code(client, redirect_url, authorization_code, pkce_verifier, scopes)
            .await
    }

    /// Runs the manual flow: print the consent URL, read the code back from stdin.
    async fn authorize_console(
        &self,
        client: &ClientSecrets,
        scopes: &[String],
    ) -> eyre::Result<Credential> {
        let csrf = CsrfToken::new_random();
        let redirect_url = RedirectUrl::new(CONSOLE_REDIRECT_URL.to_string())
            .context("construct console redirect url")?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let auth_url = Self::consent_url(
            client,
            redirect_url.clone(),
            csrf.clone(),
            pkce_challenge,
            scopes,
        )?;

        eprintln!("Please visit this URL to authorize this application:\n\n{auth_url}\n");
        eprintln!(
            "After approving, your browser is sent to a page on localhost that will not load. \
            Paste that page's full address (or just its `code` parameter) here:"
        );

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("read authorization code from stdin")?;
        let code = parse_pasted_code(&line, &csrf)?;

        self.exchange_code(client, redirect_url, code, pkce_verifier, scopes)
            .await
    }
}

impl AuthorizationServer for OAuthManager {
    async fn refresh(&self, client: &ClientSecrets, credential: &Credential) -> RefreshOutcome {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return RefreshOutcome::Failed("no refresh token available".to_string());
        };

        tracing::debug!("attempting to refresh OAuth token");

        let token_url = match TokenUrl::new(client.token_uri.clone()) {
            Ok(url) => url,
            Err(e) => return RefreshOutcome::Failed(format!("invalid token URL: {e}")),
        };
        let oauth = BasicClient::new(ClientId::new(client.client_id.clone()))
            .set_client_secret(ClientSecret::new(client.client_secret.clone()))
            .set_token_uri(token_url);

        let stored_refresh_token = RefreshToken::new(refresh_token.clone());
        match oauth
            .exchange_refresh_token(&stored_refresh_token)
            .request_async(&self.http)
            .await
        {
            Ok(token) => {
                let requested: Vec<String> = credential.scopes.iter().cloned().collect();
                let mut refreshed =
                    Credential::from_token_response(&token, &requested, Timestamp::now());
                // Google normally omits the refresh token on refresh, keep the one we have.
                if refreshed.refresh_token.is_none() {
                    tracing::trace!("new token lacks refresh token, preserving original");
                    refreshed.refresh_token = Some(refresh_token);
                }
                tracing::debug!("successfully refreshed OAuth token");
                RefreshOutcome::Refreshed(refreshed)
            }
            Err(RequestTokenError::ServerResponse(ref sr))
                if matches!(sr.error(), BasicErrorResponseType::InvalidGrant) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant");
                RefreshOutcome::Failed("refresh token rejected (invalid_grant)".to_string())
            }
            Err(e) => RefreshOutcome::Failed(format!("exchange refresh token: {e}")),
        }
    }

    async fn authorize(
        &self,
        client: &ClientSecrets,
        scopes: &[String],
    ) -> eyre::Result<Credential> {
        if self.open_browser {
            match self.authorize_loopback(client, scopes).await {
                Ok(credential) => return Ok(credential),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "browser authorization unavailable, falling back to console"
                    );
                }
            }
        }
        self.authorize_console(client, scopes).await
    }
}

/// Extracts the authorization code from what the user pasted.
///
/// Accepts either the bare code or the full redirect URL. When the URL carries a `state`
/// parameter it must match `csrf`.
fn parse_pasted_code(input: &str, csrf: &CsrfToken) -> eyre::Result<AuthorizationCode> {
    let input = input.trim();
    if input.is_empty() {
        eyre::bail!("no authorization code entered");
    }
    let Some((_, query)) = input.split_once('?') else {
        return Ok(AuthorizationCode::new(input.to_string()));
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        eyre::bail!("authorization was denied: {error}");
    }
    if state.is_some() && state.as_deref() != Some(csrf.secret().as_str()) {
        eyre::bail!("pasted URL has a mismatched state parameter");
    }
    code.map(AuthorizationCode::new)
        .ok_or_else(|| eyre::eyre!("pasted URL has no code parameter"))
}

/// Sets up a local HTTP server to receive the OAuth authorization callback.
///
/// Binds a random local port and returns the redirect URL pointing at it, together with a future
/// that resolves to the authorization code once the browser hits the callback with a matching
/// `state`.
async fn setup_redirect(
    csrf: CsrfToken,
) -> eyre::Result<(
    RedirectUrl,
    impl Future<Output = eyre::Result<AuthorizationCode>>,
)> {
    let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind to localhost")?;
    let addr = socket.local_addr().context("get local address")?;
    let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
        .context("construct redirect url")?;
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let r = async move {
            let (conn, _) = socket.accept().await.context("accept")?;
            let conn = hyper_util::rt::TokioIo::new(conn);
            let (got, mut gotten) = tokio::sync::mpsc::channel(1);
            let service = service_fn(move |req: Request<body::Incoming>| {
                let csrf = csrf.clone();
                let got = got.clone();
                async move {
                    let mut presented_state = None;
                    let mut presented_code = None;
                    let mut presented_error = None;
                    for (k, v) in
                        form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                    {
                        match &*k {
                            "state" => presented_state = Some(v),
                            "code" => presented_code = Some(v),
                            "error" => presented_error = Some(v),
                            _ => {}
                        }
                    }
                    if presented_state.as_deref() != Some(csrf.secret().as_str()) {
                        return Err("invalid csrf token");
                    }
                    if presented_error.is_some() {
                        let _ = got.send(None).await;
                        return Err("user denied authorization");
                    }
                    let Some(code) = presented_code else {
                        return Err("no authorization code found");
                    };
                    let code = AuthorizationCode::new(code.into_owned());
                    let _ = got.send(Some(code)).await;
                    Ok(Response::new(Full::<Bytes>::from(OAUTH_DONE)))
                }
            });
            let mut serve = std::pin::pin!(
                hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
            );

            tokio::select! {
                exit = &mut serve => {
                    if let Err(e) = exit {
                        Err(e).context("redirect server got bad request")
                    } else {
                        eyre::bail!("redirect server exit prematurely");
                    }
                }
                code = gotten.recv() => {
                    serve.as_mut().graceful_shutdown();
                    // let the browser receive the confirmation page
                    let _ = serve.await;
                    match code.flatten() {
                        Some(code) => Ok(code),
                        None => eyre::bail!("user denied authorization"),
                    }
                }
            }
        };
        let _ = tx.send(r.await);
    });
    Ok((url, async move {
        rx.await.context("redirect future dropped prematurely")?
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_code_is_accepted() {
        let csrf = CsrfToken::new("state123".to_string());
        let code = parse_pasted_code("  4/0AbCdEf \n", &csrf).unwrap();
        assert_eq!(code.secret(), "4/0AbCdEf");
    }

    #[test]
    fn code_is_extracted_from_redirect_url() {
        let csrf = CsrfToken::new("state123".to_string());
        let code = parse_pasted_code(
            concat!(
                "http://localhost/?state=state123&code=4%2F0AbCdEf",
                "&scope=https://www.googleapis.com/auth/youtube",
            ),
            &csrf,
        )
        .unwrap();
        assert_eq!(code.secret(), "4/0AbCdEf");
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let csrf = CsrfToken::new("state123".to_string());
        assert!(parse_pasted_code("http://localhost/?state=evil&code=abc", &csrf).is_err());
    }

    #[test]
    fn denied_consent_is_reported() {
        let csrf = CsrfToken::new("state123".to_string());
        let err = parse_pasted_code("http://localhost/?error=access_denied", &csrf).unwrap_err();
        assert!(err.to_string().contains("access_denied"), "{err}");
    }

    #[test]
    fn empty_input_is_rejected() {
        let csrf = CsrfToken::new("state123".to_string());
        assert!(parse_pasted_code("\n", &csrf).is_err());
    }

    #[tokio::test]
    async fn loopback_redirect_delivers_code() {
        let csrf = CsrfToken::new("state123".to_string());
        let (redirect_url, code) = setup_redirect(csrf).await.unwrap();

        let callback = format!("{}/?state=state123&code=4%2Fabc", redirect_url.as_str());
        let response = reqwest::get(&callback).await.unwrap();
        assert!(response.status().is_success());

        let code = code.await.unwrap();
        assert_eq!(code.secret(), "4/abc");
    }

    #[test]
    fn consent_url_requests_offline_access() {
        let client = ClientSecrets {
            client_id: "id".into(),
            client_secret: "secret".into(),
            auth_uri: crate::config::DEFAULT_AUTH_URL.into(),
            token_uri: crate::config::DEFAULT_TOKEN_URL.into(),
        };
        let (challenge, _verifier) = PkceCodeChallenge::new_random_sha256();
        let url = OAuthManager::consent_url(
            &client,
            RedirectUrl::new("http://127.0.0.1:9999".into()).unwrap(),
            CsrfToken::new("state123".into()),
            challenge,
            &["https://www.googleapis.com/auth/youtube.upload".to_string()],
        )
        .unwrap();
        let url = url.as_str();
        assert!(url.contains("access_type=offline"), "{url}");
        assert!(url.contains("prompt=consent"), "{url}");
        assert!(url.contains("state=state123"), "{url}");
        assert!(url.contains("code_challenge_method=S256"), "{url}");
    }

    fn registration(server: &mockito::ServerGuard) -> ClientSecrets {
        ClientSecrets {
            client_id: "id".into(),
            client_secret: "secret".into(),
            auth_uri: crate::config::DEFAULT_AUTH_URL.into(),
            token_uri: format!("{}/token", server.url()),
        }
    }

    fn stored_credential() -> Credential {
        Credential {
            access_token: "ya29.old".into(),
            refresh_token: Some("1//old".into()),
            expiry: "2020-01-01T00:00:00Z".parse().unwrap(),
            scopes: ["https://www.googleapis.com/auth/youtube.upload".to_string()].into(),
        }
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_response_omits_it() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                mockito::Matcher::UrlEncoded("refresh_token".into(), "1//old".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.new","token_type":"Bearer","expires_in":3599}"#)
            .create_async()
            .await;

        let manager = OAuthManager::new(Duration::from_secs(1)).unwrap();
        let outcome = manager
            .refresh(&registration(&server), &stored_credential())
            .await;

        let RefreshOutcome::Refreshed(refreshed) = outcome else {
            panic!("expected a refreshed credential, got {outcome:?}");
        };
        assert_eq!(refreshed.access_token, "ya29.new");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("1//old"));
        assert_eq!(refreshed.scopes, stored_credential().scopes);
        assert!(refreshed.expiry > Timestamp::now());
        token.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_refresh_token_fails_the_refresh() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#)
            .create_async()
            .await;

        let manager = OAuthManager::new(Duration::from_secs(1)).unwrap();
        let outcome = manager
            .refresh(&registration(&server), &stored_credential())
            .await;

        let RefreshOutcome::Failed(reason) = outcome else {
            panic!("expected a failed refresh, got {outcome:?}");
        };
        assert!(reason.contains("invalid_grant"), "{reason}");
        token.assert_async().await;
    }
}
