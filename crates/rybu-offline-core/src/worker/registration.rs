//! Host-side view of a worker registration.
//!
//! `Registration` plays the platform's part: it installs new workers, keeps
//! an installed worker waiting while the old one still controls pages,
//! promotes on skip-waiting or when the last old page closes, and routes
//! page fetches through the active worker.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::CacheResult;
use crate::http::{Request, Response};
use crate::network::Network;

use super::clients::{ClientId, ClientRegistry};
use super::dispatch::{Dispatcher, EventOutcome, WorkerEvent};
use super::manager::{ActivationReport, FetchOutcome, ResponseSource};
use super::message::{Message, ReplyPort};

#[derive(Debug)]
pub enum RegisterOutcome {
    Activated(ActivationReport),
    /// Installed, held until the previous worker releases its clients
    Waiting,
}

pub struct Registration {
    network: Arc<dyn Network>,
    clients: Arc<ClientRegistry>,
    active: Option<Arc<Dispatcher>>,
    waiting: Option<Arc<Dispatcher>>,
}

impl Registration {
    pub fn new(network: Arc<dyn Network>, clients: Arc<ClientRegistry>) -> Self {
        Self {
            network,
            clients,
            active: None,
            waiting: None,
        }
    }

    pub fn active(&self) -> Option<&Arc<Dispatcher>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<Dispatcher>> {
        self.waiting.as_ref()
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Install a new worker and promote it when nothing holds it back.
    /// A failed install leaves the current workers untouched.
    pub async fn register(&mut self, worker: Dispatcher) -> CacheResult<RegisterOutcome> {
        let worker = Arc::new(worker);
        info!(version = %worker.manager().version(), "Registering worker");

        if let Err(e) = worker.dispatch(WorkerEvent::Install).await {
            error!(version = %worker.manager().version(), error = %e, "Install failed, keeping current worker");
            return Err(e);
        }

        if let Some(previous) = self.waiting.replace(worker) {
            previous.manager().make_redundant();
        }

        Ok(match self.try_promote().await? {
            Some(report) => RegisterOutcome::Activated(report),
            None => RegisterOutcome::Waiting,
        })
    }

    /// Adopt a worker whose bucket survived a host restart.
    /// Returns false when there is no bucket to resume from.
    pub async fn restore(&mut self, worker: Dispatcher) -> CacheResult<bool> {
        if !worker.manager().resume().await? {
            return Ok(false);
        }
        if let Some(previous) = self.active.replace(Arc::new(worker)) {
            previous.manager().make_redundant();
        }
        Ok(true)
    }

    async fn try_promote(&mut self) -> CacheResult<Option<ActivationReport>> {
        let blocked = match (&self.waiting, &self.active) {
            (None, _) => return Ok(None),
            (Some(_), None) => false,
            (Some(waiting), Some(active)) => {
                !waiting.manager().skip_waiting_requested()
                    && self.clients.controlled_by(active.manager().version()) > 0
            }
        };
        if blocked {
            info!("New worker waiting for open pages to close");
            return Ok(None);
        }

        let Some(next) = self.waiting.take() else {
            return Ok(None);
        };
        let outcome = next.dispatch(WorkerEvent::Activate).await;
        if let Some(previous) = self.active.replace(Arc::clone(&next)) {
            previous.manager().make_redundant();
        }

        match outcome? {
            EventOutcome::Activated(report) => Ok(Some(report)),
            _ => Ok(Some(ActivationReport::default())),
        }
    }

    /// Deliver a page message. `SKIP_WAITING` goes to the waiting worker,
    /// anything else to the active one.
    pub async fn post_message(&mut self, message: Message, reply: Option<ReplyPort>) -> CacheResult<()> {
        let target = match message {
            Message::SkipWaiting => self.waiting.as_ref().or(self.active.as_ref()),
            _ => self.active.as_ref().or(self.waiting.as_ref()),
        };
        let Some(target) = target.cloned() else {
            warn!(message = ?message, "No worker to receive message");
            return Ok(());
        };

        target.dispatch(WorkerEvent::Message { message, reply }).await?;

        if message == Message::SkipWaiting {
            self.try_promote().await?;
        }
        Ok(())
    }

    /// Open a page, controlled by the active worker if there is one
    pub fn open_client(&self) -> ClientId {
        let controller = self.active.as_ref().map(|w| w.manager().version());
        self.clients.open(controller)
    }

    /// Close a page; the last page of the old worker releases a waiting one
    pub async fn close_client(&mut self, id: ClientId) -> CacheResult<Option<ActivationReport>> {
        if !self.clients.close(id) {
            debug!(client = %id, "Closing unknown client");
        }
        self.try_promote().await
    }

    /// Fetch on behalf of a page, through the active worker when it
    /// intercepts the request and straight to the network otherwise.
    pub async fn fetch(&self, request: &Request) -> CacheResult<(Response, ResponseSource)> {
        if let Some(active) = &self.active {
            if let EventOutcome::Fetch(FetchOutcome::Respond { response, source }) =
                active.dispatch(WorkerEvent::Fetch(request.clone())).await?
            {
                return Ok((response, source));
            }
        }

        debug!(url = %request.url, "Fetching directly");
        let response = self.network.fetch(request).await?;
        Ok((response, ResponseSource::Direct))
    }
}
