use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Open pages and the worker version controlling each one.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: Mutex<HashMap<ClientId, Option<String>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, Option<String>>> {
        // A poisoned map is still a valid map
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a page, controlled by `controller` if one is active
    pub fn open(&self, controller: Option<&str>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, controller.map(str::to_string));
        id
    }

    /// Returns false for unknown ids
    pub fn close(&self, id: ClientId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn controller(&self, id: ClientId) -> Option<String> {
        self.lock().get(&id).cloned().flatten()
    }

    /// Put every open client under `version`, returns how many changed hands
    pub fn claim(&self, version: &str) -> usize {
        let mut clients = self.lock();
        let mut claimed = 0;
        for controller in clients.values_mut() {
            if controller.as_deref() != Some(version) {
                *controller = Some(version.to_string());
                claimed += 1;
            }
        }
        debug!(version = version, claimed = claimed, "Claimed clients");
        claimed
    }

    pub fn controlled_by(&self, version: &str) -> usize {
        self.lock().values().filter(|c| c.as_deref() == Some(version)).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
