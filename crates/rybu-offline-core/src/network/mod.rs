//! Network access for the cache manager.
//!
//! The `Network` trait is the seam between the manager and the transport.
//! `HttpNetwork` is the reqwest-backed implementation used by the host
//! harness; tests substitute a scripted network.

pub mod client;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::http::{Request, Response};

pub use client::HttpNetwork;

#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Any HTTP status is `Ok`; `Err` means the
    /// transport failed (no connectivity, DNS, TLS, reset).
    async fn fetch(&self, request: &Request) -> CacheResult<Response>;
}
