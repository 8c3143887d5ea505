//! Interactive OAuth2 consent through the system browser and a loopback redirect.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use drivemerge_common::{Error, Result};

use super::auth::{AuthConfig, ConsentFlow, TokenGrant};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

type GoogleClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Authorization-code flow with PKCE, receiving the redirect on localhost.
pub struct LoopbackConsentFlow {
    open_browser: bool,
}

impl LoopbackConsentFlow {
    pub fn new() -> Self {
        Self { open_browser: true }
    }

    /// Only print the authorization URL instead of launching a browser.
    pub fn without_browser() -> Self {
        Self {
            open_browser: false,
        }
    }
}

impl Default for LoopbackConsentFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsentFlow for LoopbackConsentFlow {
    async fn request_token(&self, config: &AuthConfig) -> Result<TokenGrant> {
        let client = oauth_client(config)?;
        let redirect = Url::parse(&config.redirect_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?;
        let listener = TcpListener::bind(loopback_addr(&redirect)?)
            .await
            .map_err(|e| Error::Environment(format!("Cannot listen for OAuth callback: {}", e)))?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(config.scope.clone()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!("Open this URL to grant access: {}", auth_url);
        if self.open_browser {
            launch_browser(auth_url.to_string(), open_url).await;
        }

        let params = receive_callback(&listener, redirect.path()).await?;
        let code = params.into_code(csrf_token.secret())?;

        let http_client = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        Ok(TokenGrant {
            access_token: token.access_token().secret().clone(),
            expires_in: token.expires_in().map(|d| d.as_secs()),
            scope: token.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
        })
    }
}

fn oauth_client(config: &AuthConfig) -> Result<GoogleClient> {
    let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_auth_uri(
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
        )
        .set_token_uri(
            TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
        )
        .set_redirect_uri(
            RedirectUrl::new(config.redirect_url.clone())
                .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
        );

    if let Some(secret) = &config.client_secret {
        client = client.set_client_secret(ClientSecret::new(secret.clone()));
    }

    Ok(client)
}

/// Socket address to listen on for a loopback redirect URL.
fn loopback_addr(redirect: &Url) -> Result<SocketAddr> {
    let ip = match redirect.host_str() {
        Some("localhost") | Some("127.0.0.1") => Ipv4Addr::LOCALHOST,
        other => {
            return Err(Error::InvalidInput(format!(
                "Redirect URL must point at the loopback interface, got {:?}",
                other
            )))
        }
    };
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| Error::InvalidInput("Redirect URL has no port".to_string()))?;

    Ok(SocketAddr::from((ip, port)))
}

/// Query parameters delivered to the redirect URL.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Validate the callback and extract the authorization code.
    fn into_code(self, expected_state: &str) -> Result<String> {
        if let Some(error) = self.error {
            return Err(Error::Authentication(format!("Consent denied: {}", error)));
        }
        if self.state.as_deref() != Some(expected_state) {
            return Err(Error::Authentication(
                "OAuth state mismatch in callback".to_string(),
            ));
        }
        self.code
            .ok_or_else(|| Error::Authentication("No authorization code in callback".to_string()))
    }
}

fn open_url(url: &str) -> std::io::Result<()> {
    open::that(url)
}

/// Hand the URL to `opener` on the blocking pool. Failure only warns, the
/// URL has already been logged for manual use.
async fn launch_browser(url: String, opener: fn(&str) -> std::io::Result<()>) {
    match tokio::task::spawn_blocking(move || opener(&url)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Could not launch a browser: {}", e),
        Err(e) => tracing::warn!("Browser launcher did not finish: {}", e),
    }
}

/// Read the request line and drain the headers.
async fn read_request_line(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    // Drain the headers so closing the socket does not reset it.
    let mut header = String::new();
    while reader.read_line(&mut header).await? > 0 && !header.trim_end().is_empty() {
        header.clear();
    }
    Ok(line)
}

/// Accept connections until the browser hits the redirect path.
///
/// Unreadable requests and other paths are dropped; only a failing
/// listener ends the wait.
async fn receive_callback(listener: &TcpListener, path: &str) -> Result<CallbackParams> {
    loop {
        let (mut stream, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::Environment(format!("OAuth callback failed: {}", e)))?;
        tracing::debug!("Callback connection from {}", peer);

        let request_line = match read_request_line(&mut stream).await {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("Ignoring unreadable request from {}: {}", peer, e);
                continue;
            }
        };

        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let url = match Url::parse("http://127.0.0.1").and_then(|base| base.join(target)) {
            Ok(url) if url.path() == path => url,
            _ => {
                if let Err(e) = respond(&mut stream, "404 Not Found", "Not found").await {
                    tracing::debug!("Could not answer {}: {}", peer, e);
                }
                continue;
            }
        };

        let params = CallbackParams::from_url(&url);
        let body = if params.error.is_some() {
            "Access was not granted. You can close this window."
        } else {
            "Authentication complete. You can close this window."
        };
        if let Err(e) = respond(&mut stream, "200 OK", body).await {
            tracing::warn!("Could not confirm sign-in to the browser: {}", e);
        }

        return Ok(params);
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let html = format!("<html><body><p>{}</p></body></html>", body);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        html.len(),
        html
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_loopback_addr() {
        let url = Url::parse("http://127.0.0.1:8085/callback").unwrap();
        assert_eq!(loopback_addr(&url).unwrap().port(), 8085);

        let url = Url::parse("http://localhost:9000/cb").unwrap();
        assert!(loopback_addr(&url).unwrap().ip().is_loopback());

        let url = Url::parse("https://example.com/callback").unwrap();
        assert!(loopback_addr(&url).is_err());
    }

    #[test]
    fn test_callback_params_accepts_matching_state() {
        let url = Url::parse("http://127.0.0.1:8085/callback?state=xyz&code=4%2F0Ab").unwrap();
        let params = CallbackParams::from_url(&url);

        assert_eq!(params.into_code("xyz").unwrap(), "4/0Ab");
    }

    #[test]
    fn test_callback_params_rejects_state_mismatch() {
        let url = Url::parse("http://127.0.0.1:8085/callback?state=other&code=abc").unwrap();
        let result = CallbackParams::from_url(&url).into_code("xyz");

        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_callback_params_surfaces_denial() {
        let url = Url::parse("http://127.0.0.1:8085/callback?error=access_denied&state=xyz").unwrap();
        let err = CallbackParams::from_url(&url).into_code("xyz").unwrap_err();

        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_oauth_client_builds_authorization_url() {
        let config = AuthConfig {
            client_id: "test_id".to_string(),
            ..AuthConfig::default()
        };
        let client = oauth_client(&config).unwrap();
        let (url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(config.scope.clone()))
            .url();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert!(url.as_str().contains("client_id=test_id"));
        assert!(url.as_str().contains("drive.readonly"));
        assert!(!csrf_token.secret().is_empty());
    }

    #[tokio::test]
    async fn test_receive_callback_skips_unrelated_paths() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut favicon = TcpStream::connect(addr).await.unwrap();
            favicon
                .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            favicon.read_to_string(&mut reply).await.unwrap();
            assert!(reply.starts_with("HTTP/1.1 404"));

            let mut callback = TcpStream::connect(addr).await.unwrap();
            callback
                .write_all(b"GET /callback?code=abc&state=s1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            callback.read_to_string(&mut reply).await.unwrap();
            reply
        });

        let params = receive_callback(&listener, "/callback").await.unwrap();
        let reply = browser.await.unwrap();

        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(params.into_code("s1").unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_receive_callback_survives_unreadable_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            // TLS ClientHello bytes are not valid UTF-8.
            let mut junk = TcpStream::connect(addr).await.unwrap();
            junk.write_all(b"\x16\x03\x01\xff\xfe garbage\r\n\r\n")
                .await
                .unwrap();
            let mut ignored = Vec::new();
            let _ = junk.read_to_end(&mut ignored).await;

            let mut callback = TcpStream::connect(addr).await.unwrap();
            callback
                .write_all(b"GET /callback?code=abc&state=s1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            callback.read_to_string(&mut reply).await.unwrap();
            reply
        });

        let params = receive_callback(&listener, "/callback").await.unwrap();
        let reply = browser.await.unwrap();

        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(params.into_code("s1").unwrap(), "abc");
    }

    static OPENED: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());

    fn recording_opener(url: &str) -> std::io::Result<()> {
        OPENED.lock().unwrap().push(url.to_string());
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no browser"))
    }

    #[tokio::test]
    async fn test_launch_browser_runs_opener_and_tolerates_failure() {
        launch_browser("https://accounts.google.com/x".to_string(), recording_opener).await;

        assert_eq!(
            OPENED.lock().unwrap().as_slice(),
            ["https://accounts.google.com/x".to_string()]
        );
    }
}
