//! Event dispatch table.
//!
//! The host delivers lifecycle, fetch and message events through a
//! `Dispatcher`, which looks up the handler registered for the event kind
//! and returns its task for the host to await.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::error::CacheResult;
use crate::http::Request;

use super::manager::{ActivationReport, CacheManager, FetchOutcome};
use super::message::{Message, ReplyPort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message {
        message: Message,
        reply: Option<ReplyPort>,
    },
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Message { .. } => EventKind::Message,
        }
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    Activated(ActivationReport),
    Fetch(FetchOutcome),
    Handled,
}

type Handler = Box<dyn Fn(Arc<CacheManager>, WorkerEvent) -> BoxFuture<'static, CacheResult<EventOutcome>> + Send + Sync>;

pub struct Dispatcher {
    manager: Arc<CacheManager>,
    handlers: HashMap<EventKind, Handler>,
}

impl Dispatcher {
    /// Dispatcher with no handlers registered
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self {
            manager,
            handlers: HashMap::new(),
        }
    }

    /// Dispatcher routing all four event kinds to the manager
    pub fn with_default_handlers(manager: Arc<CacheManager>) -> Self {
        let mut dispatcher = Self::new(manager);
        dispatcher
            .on(EventKind::Install, |manager, _| async move {
                manager.install().await.map(|()| EventOutcome::Installed)
            })
            .on(EventKind::Activate, |manager, _| async move {
                manager.activate().await.map(EventOutcome::Activated)
            })
            .on(EventKind::Fetch, |manager, event| async move {
                match event {
                    WorkerEvent::Fetch(request) => manager.handle_fetch(&request).await.map(EventOutcome::Fetch),
                    _ => Ok(EventOutcome::Handled),
                }
            })
            .on(EventKind::Message, |manager, event| async move {
                if let WorkerEvent::Message { message, reply } = event {
                    manager.handle_message(message, reply).await;
                }
                Ok(EventOutcome::Handled)
            });
        dispatcher
    }

    /// Register (or replace) the handler for an event kind
    pub fn on<F, Fut>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: Fn(Arc<CacheManager>, WorkerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<EventOutcome>> + Send + 'static,
    {
        self.handlers
            .insert(kind, Box::new(move |manager, event| handler(manager, event).boxed()));
        self
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub async fn dispatch(&self, event: WorkerEvent) -> CacheResult<EventOutcome> {
        let kind = event.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler(Arc::clone(&self.manager), event).await,
            None => {
                debug!(kind = ?kind, "No handler registered");
                Ok(match kind {
                    EventKind::Fetch => EventOutcome::Fetch(FetchOutcome::Passthrough),
                    _ => EventOutcome::Handled,
                })
            }
        }
    }
}
