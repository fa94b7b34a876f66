use std::sync::Arc;

use crate::storage::ResultStore;
use crate::sync::LiveCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResultStore>,
    pub coordinator: Arc<LiveCoordinator>,
}

impl AppState {
    /// Serve from the coordinator's own store.
    pub fn new(coordinator: Arc<LiveCoordinator>) -> Self {
        Self {
            store: Arc::clone(coordinator.store()),
            coordinator,
        }
    }
}
