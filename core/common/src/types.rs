//! Common types used throughout drivemerge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// MIME type of every document searched, merged and saved.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Bearer token proving the holder may call the storage API.
///
/// The secret is wiped from memory when the credential is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    access_token: String,
    #[zeroize(skip)]
    expires_at: Option<DateTime<Utc>>,
    #[zeroize(skip)]
    scope: Option<String>,
}

impl Credential {
    /// Create a credential without expiry information.
    ///
    /// # Errors
    /// - Returns error if the token is empty
    pub fn new(access_token: impl Into<String>) -> crate::Result<Self> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Access token cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            access_token,
            expires_at: None,
            scope: None,
        })
    }

    /// Attach the expiry reported by the token endpoint.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Attach the scope granted by the provider.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The raw bearer token.
    pub fn secret(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Whether the provider-reported lifetime has run out.
    ///
    /// Credentials without expiry information never expire on their own.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Value for an `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A file located in remote storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRecord {
    /// Provider file ID.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
}

impl RemoteFileRecord {
    /// Check if the record describes a PDF document.
    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME_TYPE
    }
}
