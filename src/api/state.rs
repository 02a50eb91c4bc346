use std::sync::Arc;

use crate::services::{Backfiller, CatalogProvider, ProgressStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: ProgressStore,
    pub backfill: Arc<Backfiller>,
}

impl AppState {
    pub fn new(store: ProgressStore, catalog: Arc<dyn CatalogProvider>) -> Self {
        let backfill = Arc::new(Backfiller::new(store.clone(), catalog));
        Self { store, backfill }
    }
}
