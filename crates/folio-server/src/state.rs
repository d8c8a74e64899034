use std::sync::Arc;

use folio_core::FolderStore;

use crate::config::ServerSection;

/// Shared application state, wrapped in Arc for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: ServerSection,
    pub store: FolderStore,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: ServerSection, store: FolderStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                start_time: std::time::Instant::now(),
            }),
        }
    }

    pub fn store(&self) -> &FolderStore {
        &self.inner.store
    }
}
