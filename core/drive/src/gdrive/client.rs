//! Google Drive API client.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::sync::Arc;

use drivemerge_common::{Error, RemoteFileRecord, Result, PDF_MIME_TYPE};

use super::auth::CredentialStore;
use super::transport::{DriveRequest, DriveResponse, DriveTransport};

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested for every listed file.
const SEARCH_FIELDS: &str = "files(id,name,mimeType)";

/// Response from listing files.
#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RemoteFileRecord>,
}

/// Google Drive API client.
///
/// Every call reads the credential store first and fails with
/// `Authentication` before touching the transport when it is empty.
pub struct DriveClient {
    transport: Arc<dyn DriveTransport>,
    credentials: Arc<CredentialStore>,
    api_base: String,
}

impl DriveClient {
    /// Create a new Drive client against the public API.
    pub fn new(transport: Arc<dyn DriveTransport>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
            api_base: DRIVE_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Get authorization header.
    fn auth_header(&self) -> Result<String> {
        let credential = self
            .credentials
            .current()
            .ok_or_else(|| Error::Authentication("No access token".to_string()))?;

        if credential.is_expired() {
            return Err(Error::Authentication("Access token expired".to_string()));
        }

        Ok(credential.bearer_header())
    }

    /// Escape a value for use inside a single-quoted Drive query literal.
    pub fn escape_query_value(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            if c == '\\' || c == '\'' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    /// Filter expression for non-trashed PDFs whose name contains `name`.
    pub fn search_query(name: &str) -> String {
        format!(
            "name contains '{}' and mimeType = '{}' and trashed = false",
            Self::escape_query_value(name),
            PDF_MIME_TYPE
        )
    }

    /// Find the first PDF whose name contains `name`, across all drives.
    ///
    /// No ranking is applied: the first file the server returns wins.
    ///
    /// # Errors
    /// - `Authentication` if no usable credential is held
    /// - `InvalidInput` for a blank name
    /// - `Transport` on a non-success response
    /// - `Serialization` if the response body is not a file list
    pub async fn search(&self, name: &str) -> Result<Option<RemoteFileRecord>> {
        let authorization = self.auth_header()?;

        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Search name cannot be empty".to_string()));
        }

        let request = DriveRequest {
            url: format!("{}/files", self.api_base),
            query: vec![
                ("q".to_string(), Self::search_query(name)),
                ("fields".to_string(), SEARCH_FIELDS.to_string()),
                ("supportsAllDrives".to_string(), "true".to_string()),
                ("includeItemsFromAllDrives".to_string(), "true".to_string()),
            ],
            authorization,
        };

        let response = self.transport.get(request).await?;
        let response = check_status(response, "Drive API error")?;

        let list: FileListResponse = serde_json::from_slice(&response.body)?;
        if list.files.len() > 1 {
            tracing::debug!(
                "{} files match '{}', taking the first",
                list.files.len(),
                name
            );
        }

        Ok(list.files.into_iter().next())
    }

    /// Download file content.
    ///
    /// # Errors
    /// - `Authentication` if no usable credential is held
    /// - `Transport` on a non-success response
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let authorization = self.auth_header()?;

        if file_id.is_empty() {
            return Err(Error::InvalidInput("File ID cannot be empty".to_string()));
        }

        let request = DriveRequest {
            url: format!(
                "{}/files/{}",
                self.api_base,
                utf8_percent_encode(file_id, NON_ALPHANUMERIC)
            ),
            query: vec![
                ("alt".to_string(), "media".to_string()),
                ("supportsAllDrives".to_string(), "true".to_string()),
            ],
            authorization,
        };

        let response = self.transport.get(request).await?;
        let response = check_status(response, "Download error")?;

        tracing::debug!("Downloaded {} ({} bytes)", file_id, response.body.len());
        Ok(response.body.to_vec())
    }
}

/// Turn a non-success response into a `Transport` error.
fn check_status(response: DriveResponse, context: &str) -> Result<DriveResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(Error::Transport(format!(
            "{}: {} {}",
            context, response.status, response.status_text
        )))
    }
}
