//! The offline cache worker.
//!
//! - `manager`: install/activate/fetch/message behaviour of one worker
//! - `lifecycle`: the worker state machine
//! - `dispatch`: event table the host delivers events through
//! - `registration`: platform side, sequencing install, waiting and activation
//! - `clients`: open pages and who controls them
//! - `message`: page-to-worker message API

pub mod clients;
pub mod dispatch;
pub mod lifecycle;
pub mod manager;
pub mod message;
pub mod registration;

pub use clients::{ClientId, ClientRegistry};
pub use dispatch::{Dispatcher, EventKind, EventOutcome, WorkerEvent};
pub use lifecycle::WorkerState;
pub use manager::{ActivationReport, CacheManager, FetchOutcome, ResponseSource, WorkerConfig, DEFAULT_VERSION};
pub use message::{Message, ReplyPort, UpdateReply};
pub use registration::{RegisterOutcome, Registration};
