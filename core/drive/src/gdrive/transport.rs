//! HTTP transport seam between the Drive client and the network.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};

use drivemerge_common::{Error, Result};

/// A single authenticated GET against the Drive API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveRequest {
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters, unencoded.
    pub query: Vec<(String, String)>,
    /// Value of the `Authorization` header.
    pub authorization: String,
}

impl DriveRequest {
    /// Look up a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response as seen by the client.
#[derive(Debug, Clone)]
pub struct DriveResponse {
    pub status: u16,
    /// Reason phrase for `status`.
    pub status_text: String,
    pub body: Bytes,
}

impl DriveResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can deliver a [`DriveRequest`].
///
/// Any timeout policy belongs to the implementation.
#[async_trait]
pub trait DriveTransport: Send + Sync {
    /// Send the request and collect the full response body.
    ///
    /// # Errors
    /// - `Transport` if the request could not be delivered or read
    async fn get(&self, request: DriveRequest) -> Result<DriveResponse>;
}

/// Transport backed by a shared reqwest client.
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Create a new transport.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivemerge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl DriveTransport for ReqwestTransport {
    async fn get(&self, request: DriveRequest) -> Result<DriveResponse> {
        tracing::debug!("GET {}", request.url);

        let response = self
            .http
            .get(&request.url)
            .header(header::AUTHORIZATION, request.authorization)
            .query(&request.query)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read response: {}", e)))?;

        Ok(DriveResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            body,
        })
    }
}
