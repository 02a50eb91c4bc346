use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::{client::cache::ProgressCache, models::UserLists};

/// Fills in series totals once the session and the user's lists are loaded
///
/// Runs off the first paint: [`Preloader::spawn`] returns immediately and each
/// series resolves on its own task, so one failing series never holds up the
/// others.
pub struct Preloader;

impl Preloader {
    /// Series that need a total: any with progress but no total, plus every
    /// listed series (never a movie) lacking one
    pub async fn pending(cache: &ProgressCache, lists: &UserLists) -> Vec<u64> {
        let mut pending: BTreeSet<u64> = cache.missing_totals().await.into_iter().collect();

        for series_id in lists.series_ids() {
            if series_id != 0 && cache.get_total(series_id).await == 0 {
                pending.insert(series_id);
            }
        }

        pending.into_iter().collect()
    }

    pub async fn spawn(cache: Arc<ProgressCache>, lists: &UserLists) -> PreloadHandle {
        let pending = Self::pending(&cache, lists).await;
        let mut tasks = JoinSet::new();

        tracing::debug!(series = pending.len(), "Preloading series totals");

        for series_id in pending {
            let cache = cache.clone();
            tasks.spawn(async move {
                match cache.catalog().fetch_total_episodes(series_id).await {
                    Ok(0) => {
                        tracing::debug!(series_id, "Catalog has no episodes, total left unknown");
                    }
                    Ok(total) => cache.set_total(series_id, total).await,
                    Err(e) => {
                        tracing::warn!(error = %e, series_id, "Preload failed for series");
                    }
                }
            });
        }

        PreloadHandle { tasks }
    }
}

/// Background preload; dropping it lets the tasks run to completion
pub struct PreloadHandle {
    tasks: JoinSet<()>,
}

impl PreloadHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every preload task
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Preload task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::progress_api::MockProgressApi;
    use crate::client::snapshot::SnapshotFile;
    use crate::error::AppError;
    use crate::models::{AggregateRow, ListEntry, ProgressRow};
    use crate::services::catalog::MockCatalogProvider;
    use mockall::predicate::eq;

    fn lists() -> UserLists {
        UserLists {
            watchlist: vec![ListEntry::series(1), ListEntry::movie(2)],
            watched: vec![ListEntry::series(3), ListEntry::series(1)],
            favorites: vec![ListEntry::series(4)],
        }
    }

    #[tokio::test]
    async fn test_pending_skips_movies_and_known_totals() {
        let mut api = MockProgressApi::new();
        api.expect_fetch_progress().returning(|_| {
            Ok(vec![ProgressRow::Aggregate(AggregateRow {
                show_id: 3,
                total_episodes: 12,
                seen_count: 2,
            })])
        });

        let cache = ProgressCache::new(Arc::new(MockCatalogProvider::new()), Arc::new(api), None);
        cache.load_from_api(None).await;
        cache.set_total(4, 30).await;

        assert_eq!(Preloader::pending(&cache, &lists()).await, vec![1]);
    }

    #[tokio::test]
    async fn test_spawn_sets_totals_and_survives_failures() {
        let mut catalog = MockCatalogProvider::new();
        catalog
            .expect_fetch_total_episodes()
            .returning(|series_id| match series_id {
                1 => Ok(10),
                3 => Err(AppError::RosterFetch { status: 404 }),
                4 => Ok(0),
                _ => Ok(99),
            });

        let cache = Arc::new(ProgressCache::new(
            Arc::new(catalog),
            Arc::new(MockProgressApi::new()),
            None,
        ));

        let handle = Preloader::spawn(cache.clone(), &lists()).await;
        assert_eq!(handle.len(), 3);
        handle.join().await;

        assert_eq!(cache.get_total(1).await, 10);
        assert_eq!(cache.get_total(3).await, 0);
        assert_eq!(cache.get_total(4).await, 0);
        assert_eq!(cache.get_total(2).await, 0);
    }

    #[tokio::test]
    async fn test_spawn_with_nothing_pending() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_fetch_total_episodes().never();

        let cache = Arc::new(ProgressCache::new(
            Arc::new(catalog),
            Arc::new(MockProgressApi::new()),
            None,
        ));
        cache.set_total(1, 5).await;

        let lists = UserLists {
            watchlist: vec![ListEntry::series(1), ListEntry::movie(2)],
            ..Default::default()
        };
        let handle = Preloader::spawn(cache, &lists).await;
        assert!(handle.is_empty());
        handle.join().await;
    }

    #[tokio::test]
    async fn test_series_with_progress_but_no_total_is_preloaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::in_dir(dir.path());
        tokio::fs::write(file.path(), br#"{"seen": {"42": [1, 2]}}"#)
            .await
            .unwrap();

        let mut catalog = MockCatalogProvider::new();
        catalog
            .expect_fetch_total_episodes()
            .with(eq(42))
            .times(1)
            .returning(|_| Ok(62));

        let cache = Arc::new(ProgressCache::new(
            Arc::new(catalog),
            Arc::new(MockProgressApi::new()),
            Some(file),
        ));
        cache.restore().await;

        let no_lists = UserLists::default();
        assert_eq!(Preloader::pending(&cache, &no_lists).await, vec![42]);

        Preloader::spawn(cache.clone(), &no_lists).await.join().await;
        assert_eq!(cache.get_total(42).await, 62);
        assert_eq!(cache.get_percent(42).await, 3);
    }
}
