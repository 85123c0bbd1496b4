//! rybu-offline core - offline cache manager for the RybuHome site.
//!
//! The manager owns one versioned cache bucket. On install it stores every
//! manifest asset as one all-or-nothing batch, on activate it deletes all
//! other buckets, and on fetch it serves cache-first with network fallback
//! plus offline substitutes for pages and images.
//!
//! Storage and network sit behind the `CacheStorage` and `Network` traits
//! so the same manager runs against disk and reqwest in the host harness
//! and against in-memory fakes in tests.

pub mod error;
pub mod http;
pub mod manifest;
pub mod network;
pub mod storage;
pub mod worker;

pub use error::{CacheError, CacheResult};
pub use http::{Destination, Headers, Request, Response, ResponseType, Scope};
pub use manifest::AssetManifest;
pub use reqwest::Url;
pub use network::{HttpNetwork, Network};
pub use storage::{CacheStorage, DiskStorage, EntryInfo, MemoryStorage};
pub use worker::{
    ActivationReport, CacheManager, ClientRegistry, Dispatcher, FetchOutcome, Message, RegisterOutcome,
    Registration, ResponseSource, UpdateReply, WorkerConfig, WorkerEvent, WorkerState,
};
