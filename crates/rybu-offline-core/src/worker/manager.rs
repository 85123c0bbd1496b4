//! The offline cache manager.
//!
//! One `CacheManager` is one worker instance: a version tag, the scope it
//! intercepts, the asset manifest, and handles to storage, network and the
//! open clients. Install populates the versioned bucket, activate evicts
//! every other bucket, and fetch serves cache-first with offline substitutes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::{Method, Url};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{CacheError, CacheResult};
use crate::http::{cache_key, Destination, Request, Response, Scope};
use crate::manifest::AssetManifest;
use crate::network::Network;
use crate::storage::CacheStorage;

use super::clients::ClientRegistry;
use super::lifecycle::WorkerState;
use super::message::{Message, ReplyPort, UpdateReply};

// ============================================================================
// Configuration
// ============================================================================

/// Version tag of the current RybuHome deploy
pub const DEFAULT_VERSION: &str = "rybuhome-v1";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version: String,
    pub scope: Scope,
    pub manifest: AssetManifest,
    /// Request promotion as soon as install succeeds
    pub skip_waiting_on_install: bool,
}

impl WorkerConfig {
    pub fn new(version: impl Into<String>, origin: Url) -> Self {
        Self {
            version: version.into(),
            scope: Scope::new(origin),
            manifest: AssetManifest::default(),
            skip_waiting_on_install: true,
        }
    }

    pub fn with_manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Keep installed workers waiting until promoted by message or by
    /// their predecessor releasing its pages
    pub fn hold_after_install(mut self) -> Self {
        self.skip_waiting_on_install = false;
        self
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Stale-bucket cleanup performed during activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    /// Bucket name and error description for each failed deletion
    pub failed: Vec<(String, String)>,
    pub claimed: usize,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Network,
    /// Cached root document standing in for an offline navigation
    OfflineDocument,
    /// Inline SVG standing in for an offline image
    Placeholder,
    /// Not intercepted; fetched by the host directly
    Direct,
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Out of scope or worker not active; the host fetches it untouched
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

impl FetchOutcome {
    fn respond(response: Response, source: ResponseSource) -> Self {
        FetchOutcome::Respond { response, source }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough)
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Respond { source, .. } => Some(*source),
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Respond { response, .. } => Some(response),
        }
    }
}

// ============================================================================
// Cache Manager
// ============================================================================

pub struct CacheManager {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<ClientRegistry>,
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
}

impl CacheManager {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<ClientRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Uninstalled);
        Self {
            config,
            storage,
            network,
            clients,
            state,
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn scope(&self) -> &Scope {
        &self.config.scope
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.config.manifest
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: WorkerState) -> CacheResult<()> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if state.can_transition(next) {
                debug!(version = %self.config.version, from = %state, to = %next, "Lifecycle transition");
                *state = next;
                true
            } else {
                result = Err(CacheError::InvalidTransition { from: *state, to: next });
                false
            }
        });
        result
    }

    /// Retire this instance after a failed install or when superseded
    pub fn make_redundant(&self) {
        if self.transition(WorkerState::Redundant).is_ok() {
            info!(version = %self.config.version, "Worker is redundant");
        }
    }

    /// Ask to be promoted without waiting for older clients to close
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        debug!(version = %self.config.version, "Skip waiting requested");
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    // ===== Install =====

    /// Populate the versioned bucket with the whole manifest.
    /// On failure nothing is committed and the worker becomes redundant.
    pub async fn install(&self) -> CacheResult<()> {
        self.transition(WorkerState::Installing)?;
        info!(version = %self.config.version, assets = self.config.manifest.len(), "Installing");

        match self.populate().await {
            Ok(count) => {
                self.transition(WorkerState::Installed)?;
                info!(version = %self.config.version, cached = count, "Installed successfully");
                if self.config.skip_waiting_on_install {
                    self.skip_waiting();
                }
                Ok(())
            }
            Err(e) => {
                error!(version = %self.config.version, error = %e, "Installation failed");
                self.make_redundant();
                Err(e)
            }
        }
    }

    /// Fetch every manifest asset concurrently, then store them as one batch.
    async fn populate(&self) -> CacheResult<usize> {
        let version = self.config.version.as_str();
        let urls = self.config.manifest.resolve(&self.config.scope)?;
        let fetches = urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let response = self.network.fetch(&request).await?;
            if !response.is_ok() {
                return Err(CacheError::bad_status(request.url.as_str(), response.status));
            }
            Ok::<_, CacheError>((request.cache_key(), response))
        });

        // First failure aborts the batch before anything is written,
        // including the bucket itself
        let entries = futures::future::try_join_all(fetches).await?;
        let count = entries.len();
        self.storage.put_all(version, entries).await?;
        Ok(count)
    }

    // ===== Activate =====

    /// Delete every bucket but the live one, then claim all open clients.
    ///
    /// The worker becomes active even if the bucket listing fails; that
    /// error is still logged and returned.
    pub async fn activate(&self) -> CacheResult<ActivationReport> {
        self.transition(WorkerState::Activating)?;
        info!(version = %self.config.version, "Activating");

        let cleanup = self.evict_stale().await;
        self.transition(WorkerState::Active)?;
        let claimed = self.clients.claim(&self.config.version);

        match cleanup {
            Ok(mut report) => {
                report.claimed = claimed;
                info!(
                    version = %self.config.version,
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    claimed = claimed,
                    "Activated successfully"
                );
                Ok(report)
            }
            Err(e) => {
                error!(version = %self.config.version, error = %e, "Stale cache cleanup failed");
                Err(e)
            }
        }
    }

    async fn evict_stale(&self) -> CacheResult<ActivationReport> {
        let live = self.config.version.as_str();
        let names = self.storage.keys().await?;

        let deletions = names.into_iter().filter(|name| name != live).map(|name| async move {
            info!(bucket = %name, "Deleting old cache");
            let result = self.storage.delete(&name).await;
            (name, result)
        });

        let mut report = ActivationReport::default();
        for (name, result) in futures::future::join_all(deletions).await {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!(bucket = %name, error = %e, "Failed to delete old cache");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Adopt an existing live bucket after a host restart.
    /// Only a bucket holding the whole manifest counts as installed.
    pub async fn resume(&self) -> CacheResult<bool> {
        let version = self.config.version.as_str();
        if !self.storage.has(version).await? {
            return Ok(false);
        }
        let stored: HashSet<String> = self.storage.entries(version).await?.into_iter().map(|e| e.key).collect();
        let missing = self
            .config
            .manifest
            .resolve(&self.config.scope)?
            .iter()
            .filter(|url| !stored.contains(&cache_key(&Method::GET, url)))
            .count();
        if missing > 0 {
            warn!(version = version, missing = missing, "Bucket is incomplete, not resuming");
            return Ok(false);
        }
        self.transition(WorkerState::Active)?;
        info!(version = %self.config.version, "Resumed with existing cache");
        Ok(true)
    }

    // ===== Fetch =====

    pub async fn handle_fetch(&self, request: &Request) -> CacheResult<FetchOutcome> {
        if !self.state().is_active() {
            debug!(url = %request.url, state = %self.state(), "Worker not active, passing through");
            return Ok(FetchOutcome::Passthrough);
        }
        if !self.config.scope.contains(&request.url) {
            debug!(url = %request.url, "Out of scope, passing through");
            return Ok(FetchOutcome::Passthrough);
        }

        let version = self.config.version.as_str();
        let key = request.cache_key();
        let cacheable_method = request.method == Method::GET;

        if cacheable_method {
            match self.storage.match_entry(version, &key).await {
                Ok(Some(response)) => {
                    debug!(url = %request.url, "Cache hit");
                    return Ok(FetchOutcome::respond(response, ResponseSource::Cache));
                }
                Ok(None) => {}
                Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed, using network"),
            }
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if cacheable_method && response.is_cacheable() {
                    if let Err(e) = self.storage.put(version, &key, response.clone()).await {
                        warn!(url = %request.url, error = %e, "Failed to cache response");
                    }
                }
                Ok(FetchOutcome::respond(response, ResponseSource::Network))
            }
            Err(e) if e.is_network_failure() => self.offline_substitute(request, e).await,
            Err(e) => Err(e),
        }
    }

    async fn offline_substitute(&self, request: &Request, err: CacheError) -> CacheResult<FetchOutcome> {
        match request.destination {
            Destination::Document => {
                let root = self.config.manifest.root_document();
                let key = cache_key(&Method::GET, &self.config.scope.resolve(root)?);
                match self.storage.match_entry(&self.config.version, &key).await? {
                    Some(page) => {
                        info!(url = %request.url, "Offline, serving cached root document");
                        Ok(FetchOutcome::respond(page, ResponseSource::OfflineDocument))
                    }
                    None => {
                        warn!(url = %request.url, root = root, "Offline and root document is not cached");
                        Err(CacheError::FallbackMissing(root.to_string()))
                    }
                }
            }
            Destination::Image => {
                info!(url = %request.url, "Offline, serving placeholder image");
                Ok(FetchOutcome::respond(Response::placeholder_image(), ResponseSource::Placeholder))
            }
            _ => {
                debug!(url = %request.url, error = %err, "Offline, no substitute");
                Err(err)
            }
        }
    }

    // ===== Messages =====

    /// Re-run manifest population against the live bucket
    pub async fn update_cache(&self) -> UpdateReply {
        match self.populate().await {
            Ok(count) => {
                info!(version = %self.config.version, cached = count, "Cache updated");
                UpdateReply::success()
            }
            Err(e) => {
                error!(version = %self.config.version, error = %e, "Cache update failed");
                UpdateReply::failure(e.to_string())
            }
        }
    }

    pub async fn handle_message(&self, message: Message, reply: Option<ReplyPort>) {
        match message {
            Message::SkipWaiting => self.skip_waiting(),
            Message::UpdateCache => {
                let outcome = self.update_cache().await;
                match reply {
                    Some(port) => {
                        if port.send(outcome).is_err() {
                            debug!("Update reply dropped, receiver gone");
                        }
                    }
                    None => warn!(success = outcome.success, "UPDATE_CACHE sent without a reply port"),
                }
            }
            Message::Unknown => debug!("Ignoring unknown message"),
        }
    }
}
