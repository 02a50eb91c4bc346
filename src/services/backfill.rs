use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinSet};

use crate::{
    error::AppResult,
    models::ProgressRow,
    services::{catalog::CatalogProvider, progress_store::ProgressStore},
};

/// Fills in unknown series totals from the catalog
///
/// Backfills never fail the request that triggered them: each one runs on
/// its own task, logs its outcome and is otherwise forgotten. Tasks are kept
/// in a [`JoinSet`] so shutdown and tests can wait for them.
pub struct Backfiller {
    store: ProgressStore,
    catalog: Arc<dyn CatalogProvider>,
    tasks: Mutex<JoinSet<()>>,
}

impl Backfiller {
    pub fn new(store: ProgressStore, catalog: Arc<dyn CatalogProvider>) -> Self {
        Self {
            store,
            catalog,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Fetches and records the total of one series in the background
    pub async fn spawn(&self, user_id: &str, show_id: u64) {
        let store = self.store.clone();
        let catalog = self.catalog.clone();
        let user_id = user_id.to_string();

        let mut tasks = self.tasks.lock().await;
        // Reap finished tasks so the set does not grow with every request
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            if let Err(e) = backfill_one(&store, catalog.as_ref(), &user_id, show_id).await {
                tracing::warn!(
                    error = %e,
                    user_id = %user_id,
                    show_id,
                    "Total backfill failed"
                );
            }
        });
    }

    /// Spawns backfills for aggregate rows that have progress but no total
    pub async fn schedule_missing(&self, user_id: &str, rows: &[ProgressRow]) -> usize {
        let mut scheduled = 0;
        for row in rows {
            if let ProgressRow::Aggregate(agg) = row {
                if agg.seen_count > 0 && agg.total_episodes == 0 {
                    self.spawn(user_id, agg.show_id).await;
                    scheduled += 1;
                }
            }
        }

        if scheduled > 0 {
            tracing::debug!(user_id = %user_id, scheduled, "Scheduled total backfills");
        }
        scheduled
    }

    /// One pass over every series missing a total, run once at startup
    ///
    /// Returns how many totals were recorded.
    pub async fn run_startup(&self) -> usize {
        let pending = match self.store.missing_totals(None).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "Startup backfill could not list pending series");
                return 0;
            }
        };

        tracing::info!(pending = pending.len(), "Startup backfill started");

        let mut recorded = 0;
        for (user_id, show_id) in pending {
            match backfill_one(&self.store, self.catalog.as_ref(), &user_id, show_id).await {
                Ok(Some(total)) => {
                    recorded += 1;
                    tracing::info!(user_id = %user_id, show_id, total, "Total backfilled");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, user_id = %user_id, show_id, "Startup backfill skipped series");
                }
            }
        }

        tracing::info!(recorded, "Startup backfill completed");
        recorded
    }

    /// Waits until every spawned backfill has finished
    pub async fn wait_idle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Backfill task panicked");
            }
        }
    }
}

/// Fetches one total and records it; `None` when the catalog knows no episodes
async fn backfill_one(
    store: &ProgressStore,
    catalog: &dyn CatalogProvider,
    user_id: &str,
    show_id: u64,
) -> AppResult<Option<u32>> {
    let total = catalog.fetch_total_episodes(show_id).await?;
    if total == 0 {
        tracing::debug!(show_id, "Catalog returned no episodes, total left unknown");
        return Ok(None);
    }

    store.record_total(user_id, show_id, total).await?;
    Ok(Some(total))
}
