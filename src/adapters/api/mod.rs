//! Remote Data Service Adapter
//!
//! Implements the HTTP client for the action-addressed data service the
//! persistence gateway and the settlement backend talk to.
//!
//! Sub-modules:
//! - `auth`: HMAC-SHA256 request signing
//! - `client`: HTTP client with rate limiting, retries and error classification
//! - `types`: Request/response type definitions

pub mod auth;
pub mod client;
pub mod types;

pub use client::{RemoteClient, RemoteClientConfig};
