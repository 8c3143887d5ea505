//! In-memory Drive transport for testing.

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::sync::Mutex;

use drivemerge_common::{RemoteFileRecord, Result};

use super::client::DriveClient;
use super::transport::{DriveRequest, DriveResponse, DriveTransport};

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    status_text: String,
    body: Bytes,
}

impl Reply {
    fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
        }
    }

    fn status(status: u16, status_text: &str) -> Self {
        Self {
            status,
            status_text: status_text.to_string(),
            body: Bytes::from_static(b"{\"error\":{}}"),
        }
    }

    fn into_response(self) -> DriveResponse {
        DriveResponse {
            status: self.status,
            status_text: self.status_text,
            body: self.body,
        }
    }
}

/// Scripted stand-in for the Drive REST API.
///
/// Search replies are keyed by the searched name, downloads by file ID.
/// Unscripted searches match nothing and unscripted downloads answer
/// `404 Not Found`. Every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    searches: Mutex<HashMap<String, Reply>>,
    files: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<DriveRequest>>,
}

impl MockTransport {
    /// Create a transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer a search for `name` with the given records.
    pub fn with_search(self, name: &str, records: Vec<RemoteFileRecord>) -> Self {
        let body = serde_json::json!({ "files": records }).to_string();
        self.searches
            .lock()
            .unwrap()
            .insert(DriveClient::search_query(name), Reply::ok(body));
        self
    }

    /// Fail a search for `name` with the given status.
    pub fn with_search_failure(self, name: &str, status: u16, status_text: &str) -> Self {
        self.searches
            .lock()
            .unwrap()
            .insert(DriveClient::search_query(name), Reply::status(status, status_text));
        self
    }

    /// Serve `data` as the content of `file_id`.
    pub fn with_file(self, file_id: &str, data: impl Into<Bytes>) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), Reply::ok(data));
        self
    }

    /// Fail downloads of `file_id` with the given status.
    pub fn with_file_failure(self, file_id: &str, status: u16, status_text: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), Reply::status(status, status_text));
        self
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Copy of every request received so far.
    pub fn requests(&self) -> Vec<DriveRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn route(&self, request: &DriveRequest) -> Reply {
        let not_found = || Reply::status(404, "Not Found");

        if request.url.ends_with("/files") {
            let query = request.query_param("q").unwrap_or_default();
            return self
                .searches
                .lock()
                .unwrap()
                .get(query)
                .cloned()
                .unwrap_or_else(|| Reply::ok(r#"{"files":[]}"#));
        }

        match request.url.rsplit_once("/files/") {
            Some((_, encoded_id)) if request.query_param("alt") == Some("media") => {
                let file_id = percent_decode_str(encoded_id).decode_utf8_lossy();
                self.files
                    .lock()
                    .unwrap()
                    .get(file_id.as_ref())
                    .cloned()
                    .unwrap_or_else(not_found)
            }
            _ => not_found(),
        }
    }
}

#[async_trait]
impl DriveTransport for MockTransport {
    async fn get(&self, request: DriveRequest) -> Result<DriveResponse> {
        let reply = self.route(&request);
        self.requests.lock().unwrap().push(request);
        Ok(reply.into_response())
    }
}
