//! Subcommand implementations.
//!
//! Each invocation builds a fresh host around the on-disk cache: `install`
//! registers a new worker, the other commands restore the worker whose
//! bucket is already on disk.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rybu_offline_core::{
    CacheError, CacheManager, CacheResult, CacheStorage, ClientRegistry, Destination, DiskStorage, Dispatcher,
    HttpNetwork, Message, Network, RegisterOutcome, Registration, Request, Response,
};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::Config;

/// Network stand-in for `--offline`: every request fails at the transport
struct Unplugged;

#[async_trait]
impl Network for Unplugged {
    async fn fetch(&self, request: &Request) -> CacheResult<Response> {
        Err(CacheError::Offline(format!("offline mode, not fetching {}", request.url)))
    }
}

pub struct Host {
    config: Config,
    storage: Arc<DiskStorage>,
    network: Arc<dyn Network>,
    clients: Arc<ClientRegistry>,
}

impl Host {
    pub async fn new(config: Config, offline: bool) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let storage = DiskStorage::new(cache_dir.clone())
            .await
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;

        let network: Arc<dyn Network> = if offline {
            Arc::new(Unplugged)
        } else {
            let scope = config.scope()?;
            Arc::new(match config.request_timeout() {
                Some(timeout) => HttpNetwork::with_timeout(scope, timeout)?,
                None => HttpNetwork::new(scope)?,
            })
        };

        Ok(Self {
            config,
            storage: Arc::new(storage),
            network,
            clients: Arc::new(ClientRegistry::new()),
        })
    }

    fn worker(&self) -> Result<Dispatcher> {
        let manager = CacheManager::new(
            self.config.worker_config()?,
            self.storage.clone(),
            self.network.clone(),
            self.clients.clone(),
        );
        Ok(Dispatcher::with_default_handlers(Arc::new(manager)))
    }

    fn registration(&self) -> Registration {
        Registration::new(self.network.clone(), self.clients.clone())
    }

    /// Registration with the on-disk worker restored, if there is one
    async fn restored(&self) -> Result<(Registration, bool)> {
        let mut registration = self.registration();
        let restored = registration.restore(self.worker()?).await?;
        if !restored {
            warn!(version = %self.config.version, "No cache for this version, run `install` first");
        }
        Ok((registration, restored))
    }
}

pub async fn install(host: &Host) -> Result<()> {
    let mut registration = host.registration();
    let outcome = registration
        .register(host.worker()?)
        .await
        .with_context(|| format!("Failed to install {}", host.config.version))?;

    match outcome {
        RegisterOutcome::Activated(report) => {
            info!(version = %host.config.version, "Worker active");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        RegisterOutcome::Waiting => println!("Installed {}, waiting for activation", host.config.version),
    }
    Ok(())
}

pub async fn fetch(host: &Host, url: &str, destination: Option<Destination>) -> Result<()> {
    let (registration, _) = host.restored().await?;

    let request = Request::parse(url)?;
    let destination = destination.unwrap_or_else(|| Destination::infer(&request.url));
    let request = request.with_destination(destination);

    let (response, source) = registration
        .fetch(&request)
        .await
        .with_context(|| format!("Fetch failed: {}", url))?;

    eprintln!(
        "{} {} ({:?}, {} bytes, {})",
        response.status,
        response.content_type().unwrap_or("-"),
        source,
        response.body.len(),
        url
    );
    std::io::stdout().write_all(&response.body)?;
    Ok(())
}

pub async fn update(host: &Host) -> Result<()> {
    let (mut registration, restored) = host.restored().await?;
    if !restored {
        anyhow::bail!("Nothing to update: no cache for {}", host.config.version);
    }

    let (tx, rx) = oneshot::channel();
    registration.post_message(Message::UpdateCache, Some(tx)).await?;
    let reply = rx.await.context("Worker dropped the reply port")?;

    println!("{}", serde_json::to_string(&reply)?);
    if !reply.success {
        anyhow::bail!("Cache update failed");
    }
    Ok(())
}

pub async fn buckets(host: &Host) -> Result<()> {
    for name in host.storage.keys().await? {
        let marker = if name == host.config.version { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    Ok(())
}

pub async fn entries(host: &Host, bucket: Option<&str>) -> Result<()> {
    let bucket = bucket.unwrap_or(&host.config.version);
    let entries = host.storage.entries(bucket).await?;
    if entries.is_empty() {
        eprintln!("Bucket {} is empty or missing", bucket);
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:>4} {:>9} {:<24} {:<10} {}",
            entry.status,
            entry.size,
            entry.content_type.as_deref().unwrap_or("-"),
            entry.age_display(),
            entry.key
        );
    }
    Ok(())
}

pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
