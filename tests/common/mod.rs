#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum_test::TestServer;

use trackmyseries::{
    api::{create_router, AppState},
    error::{AppError, AppResult},
    models::{Episode, Roster},
    services::{CatalogProvider, ProgressStore},
};

/// Catalog that answers from a fixed table of episode counts
#[derive(Default)]
pub struct FixedCatalog {
    totals: HashMap<u64, u32>,
    calls: AtomicUsize,
}

impl FixedCatalog {
    pub fn new(totals: &[(u64, u32)]) -> Self {
        Self {
            totals: totals.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CatalogProvider for FixedCatalog {
    async fn fetch_episode_roster(&self, series_id: u64) -> AppResult<Roster> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let count = *self
            .totals
            .get(&series_id)
            .ok_or(AppError::RosterFetch { status: 404 })?;

        let episodes = (1..=count)
            .map(|n| Episode {
                id: series_id * 1000 + u64::from(n),
                name: format!("E{n}"),
                number: Some(n),
                overview: String::new(),
                image: String::new(),
            })
            .collect();

        Ok(Roster::from([(1, episodes)]))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub async fn test_state(catalog: Arc<FixedCatalog>) -> AppState {
    let store = ProgressStore::connect("sqlite::memory:").await.unwrap();
    AppState::new(store, catalog)
}

pub async fn test_server(catalog: Arc<FixedCatalog>) -> (TestServer, AppState) {
    let state = test_state(catalog).await;
    let server = TestServer::new(create_router(state.clone())).unwrap();
    (server, state)
}
