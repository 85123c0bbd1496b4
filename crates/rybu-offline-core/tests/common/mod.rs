//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rybu_offline_core::{
    AssetManifest, CacheError, CacheManager, CacheResult, CacheStorage, ClientRegistry, Dispatcher, MemoryStorage,
    Network, Request, Response, ResponseType, WorkerConfig,
};
use reqwest::Url;

pub const ORIGIN: &str = "https://rybuhome.com/";
pub const FONT_CSS: &str = "https://fonts.googleapis.com/css2?family=Poppins:wght@400;500;600;700&display=swap";
pub const INDEX_HTML: &str = "<!doctype html><title>RybuHome</title>";

/// Network that serves a scripted site and counts every call per URL.
#[derive(Default)]
pub struct ScriptedNetwork {
    offline: Mutex<bool>,
    unreachable: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    /// Make a single URL fail at the transport level
    pub fn break_url(&self, url: &str) {
        self.unreachable.lock().unwrap().insert(url.to_string());
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn body_for(url: &Url) -> Response {
        let same_origin = url.host_str() == Some("rybuhome.com");
        let response_type = if same_origin { ResponseType::Basic } else { ResponseType::Cors };
        match url.path() {
            "/" | "/index.html" if same_origin => {
                Response::new(200, response_type, INDEX_HTML).with_header("Content-Type", "text/html")
            }
            "/missing.css" => Response::new(404, response_type, "not found"),
            path => Response::new(200, response_type, format!("content of {}", path)),
        }
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> CacheResult<Response> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        if *self.offline.lock().unwrap() || self.unreachable.lock().unwrap().contains(&url) {
            return Err(CacheError::Offline(format!("could not reach {}", url)));
        }
        Ok(Self::body_for(&request.url))
    }
}

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn small_manifest() -> AssetManifest {
    AssetManifest::new(["/", "/index.html", "/style.css", "/assets/img/logo.svg", FONT_CSS])
}

pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub network: Arc<ScriptedNetwork>,
    pub clients: Arc<ClientRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            network: ScriptedNetwork::new(),
            clients: Arc::new(ClientRegistry::new()),
        }
    }

    pub fn config(&self, version: &str) -> WorkerConfig {
        WorkerConfig::new(version, origin()).with_manifest(small_manifest())
    }

    pub fn manager(&self, config: WorkerConfig) -> Arc<CacheManager> {
        self.manager_with_storage(config, self.storage.clone())
    }

    pub fn manager_with_storage(&self, config: WorkerConfig, storage: Arc<dyn CacheStorage>) -> Arc<CacheManager> {
        Arc::new(CacheManager::new(config, storage, self.network.clone(), self.clients.clone()))
    }

    pub fn worker(&self, version: &str) -> Dispatcher {
        Dispatcher::with_default_handlers(self.manager(self.config(version)))
    }

    /// Manager installed and activated under `version`
    pub async fn active_manager(&self, version: &str) -> Arc<CacheManager> {
        let manager = self.manager(self.config(version));
        manager.install().await.unwrap();
        manager.activate().await.unwrap();
        manager
    }
}

pub fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

pub fn key(url: &Url) -> String {
    format!("GET {}", url)
}
