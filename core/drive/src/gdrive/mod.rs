//! Google Drive access for drivemerge.
//!
//! This module provides:
//! - OAuth2 consent through a loopback redirect, behind the `ConsentFlow` seam
//! - A process-wide credential holder passed explicitly to the client
//! - PDF search across all drives and media download
//! - A scripted transport for tests

pub mod auth;
pub mod client;
pub mod consent;
pub mod mock;
pub mod transport;

pub use auth::{AuthConfig, Authenticator, ConsentFlow, CredentialStore, TokenGrant, DRIVE_READONLY_SCOPE};
pub use client::{DriveClient, DRIVE_API_BASE};
pub use consent::LoopbackConsentFlow;
pub use mock::MockTransport;
pub use transport::{DriveRequest, DriveResponse, DriveTransport, ReqwestTransport};
