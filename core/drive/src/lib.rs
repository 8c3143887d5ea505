//! Remote file access for drivemerge.
//!
//! Locates and fetches PDF documents in Google Drive on behalf of an
//! authenticated user.
//!
//! # Design Principles
//! - Explicit credentials: the token holder is passed in, never ambient
//! - Injectable seams: consent and HTTP transport are traits with fakes
//! - Fail fast: no retries, errors surface to the immediate caller

pub mod gdrive;

pub use gdrive::{
    AuthConfig, Authenticator, ConsentFlow, CredentialStore, DriveClient, DriveTransport,
    LoopbackConsentFlow, MockTransport, ReqwestTransport, TokenGrant,
};
