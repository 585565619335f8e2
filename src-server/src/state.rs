//! Shared state for the HTTP trigger.

use std::collections::HashSet;
use std::sync::Arc;

use nassync::SyncOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    api_keys: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, api_keys: Vec<String>) -> Self {
        Self {
            orchestrator,
            api_keys: Arc::new(api_keys.into_iter().collect()),
        }
    }

    pub fn accepts_key(&self, key: &str) -> bool {
        self.api_keys.contains(key)
    }
}
