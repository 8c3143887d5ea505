//! OAuth2 consent and credential management for Google Drive.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use drivemerge_common::{Credential, Error, Result};

/// OAuth2 client ID registered for drivemerge.
const GOOGLE_CLIENT_ID: &str = "YOUR_CLIENT_ID.apps.googleusercontent.com";
/// Redirect URL for the loopback flow.
const REDIRECT_URL: &str = "http://127.0.0.1:8085/callback";

/// Read-only access to every file the user can see.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Configuration for OAuth2 authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Client ID (can be overridden from default).
    pub client_id: String,
    /// Client secret. Installed-app clients issued by Google carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Redirect URL for OAuth2 callback. Must point at the loopback interface.
    pub redirect_url: String,
    /// Requested scope.
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    DRIVE_READONLY_SCOPE.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: GOOGLE_CLIENT_ID.to_string(),
            client_secret: None,
            redirect_url: REDIRECT_URL.to_string(),
            scope: default_scope(),
        }
    }
}

/// Successful token response from the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Space separated list of granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Convert the grant into a credential, stamping its expiry.
    pub fn into_credential(self) -> Result<Credential> {
        let mut credential = Credential::new(self.access_token)
            .map_err(|_| Error::Authentication("Provider returned an empty access token".to_string()))?;

        let expires_at = self
            .expires_in
            .and_then(|seconds| i64::try_from(seconds).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        if let Some(expires_at) = expires_at {
            credential = credential.with_expiry(expires_at);
        }
        if let Some(scope) = self.scope {
            credential = credential.with_scope(scope);
        }

        Ok(credential)
    }
}

/// Capability to run the interactive consent flow.
///
/// Production uses [`LoopbackConsentFlow`](super::consent::LoopbackConsentFlow);
/// tests substitute a fake.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    /// Run the consent flow for the given client identity and scope.
    ///
    /// Suspends until the user completes or abandons the provider's page.
    ///
    /// # Errors
    /// - The user or provider denied consent
    /// - The token exchange failed
    async fn request_token(&self, config: &AuthConfig) -> Result<TokenGrant>;
}

/// Holder for the single bearer credential of the process.
///
/// Reads never block. `set` is the only way a credential enters the store.
pub struct CredentialStore {
    slot: watch::Sender<Option<Credential>>,
}

impl CredentialStore {
    /// Create an empty (unauthenticated) store.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Current credential, if any.
    pub fn current(&self) -> Option<Credential> {
        self.slot.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Replace whatever credential is held.
    pub fn set(&self, credential: Credential) {
        self.slot.send_replace(Some(credential));
    }

    /// Forget the held credential.
    pub fn clear(&self) {
        self.slot.send_replace(None);
    }

    /// Receiver notified every time the slot changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.slot.subscribe()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Obtains credentials through a [`ConsentFlow`] and publishes them to a
/// [`CredentialStore`].
pub struct Authenticator {
    config: AuthConfig,
    flow: Arc<dyn ConsentFlow>,
    store: Arc<CredentialStore>,
}

impl Authenticator {
    /// Bind a client identity and scope to a consent flow.
    ///
    /// # Errors
    /// - Empty client ID or scope
    pub fn new(
        config: AuthConfig,
        flow: Arc<dyn ConsentFlow>,
        store: Arc<CredentialStore>,
    ) -> Result<Self> {
        if config.client_id.trim().is_empty() {
            return Err(Error::InvalidInput("Client ID cannot be empty".to_string()));
        }
        if config.scope.trim().is_empty() {
            return Err(Error::InvalidInput("Scope cannot be empty".to_string()));
        }

        Ok(Self {
            config,
            flow,
            store,
        })
    }

    /// Run the consent flow once and store the resulting credential.
    ///
    /// # Postconditions
    /// - On success the store holds the new credential, replacing any prior one
    /// - On failure the store is left untouched
    ///
    /// # Errors
    /// - `Authentication` if consent was denied or the exchange failed
    pub async fn request_token(&self) -> Result<Credential> {
        tracing::info!("Requesting consent for scope {}", self.config.scope);

        let grant = self
            .flow
            .request_token(&self.config)
            .await
            .map_err(|e| match e {
                Error::Authentication(_) => e,
                other => Error::Authentication(other.to_string()),
            })?;

        let credential = grant.into_credential()?;
        self.store.set(credential.clone());

        tracing::info!("Access token received");
        Ok(credential)
    }

    /// Current credential without triggering consent.
    pub fn token(&self) -> Option<Credential> {
        self.store.current()
    }

    /// The store this authenticator publishes to.
    pub fn store(&self) -> Arc<CredentialStore> {
        self.store.clone()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
