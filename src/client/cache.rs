use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::{
    sync::{Mutex, RwLock},
    task::JoinSet,
};

use crate::{
    client::{
        progress_api::ProgressApi,
        snapshot::{Snapshot, SnapshotFile},
    },
    models::{ProgressRow, SeenUpdate},
    services::CatalogProvider,
};

/// Load lifecycle of one series entry
///
/// There is no error state: a failed load puts the entry back where it was.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Ready,
}

/// Local progress of one series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesProgress {
    /// Episode ids known to be seen; may be empty while `counter > 0`
    pub seen: HashSet<u64>,
    /// Known episode count, 0 when unknown
    pub total: u32,
    /// Seen count, `None` until any data for the series arrived
    pub counter: Option<u32>,
    pub state: LoadState,
}

impl SeriesProgress {
    fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let counter = self.counter.unwrap_or(0) as f64;
        (counter / self.total as f64 * 100.0).round() as u32
    }

    fn needs_total(&self) -> bool {
        self.total == 0 && self.counter.unwrap_or(0) > 0
    }

    fn recount(&mut self) {
        self.counter = Some(count(&self.seen));
    }
}

fn count(set: &HashSet<u64>) -> u32 {
    u32::try_from(set.len()).unwrap_or(u32::MAX)
}

type SeriesMap = HashMap<u64, SeriesProgress>;

/// Session-wide mirror of the user's episode progress
///
/// Lifecycle is `restore()` at session start, mutations, then `clear()` on
/// logout. Every operation swallows catalog and store failures after logging
/// them: the local view stays usable and the next load reconciles it.
///
/// The state lock is never held across a network call. Each toggle's flip
/// and recount, and each merged response, happen inside one write lock.
pub struct ProgressCache {
    series: Arc<RwLock<SeriesMap>>,
    catalog: Arc<dyn CatalogProvider>,
    api: Arc<dyn ProgressApi>,
    snapshot: Option<Mutex<SnapshotFile>>,
}

impl ProgressCache {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        api: Arc<dyn ProgressApi>,
        snapshot: Option<SnapshotFile>,
    ) -> Self {
        Self {
            series: Arc::new(RwLock::new(HashMap::new())),
            catalog,
            api,
            snapshot: snapshot.map(Mutex::new),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogProvider> {
        &self.catalog
    }

    /// Seeds the cache from the durable snapshot, before any network call
    ///
    /// Returns how many series were restored.
    pub async fn restore(&self) -> usize {
        let Some(file) = &self.snapshot else {
            return 0;
        };

        let snapshot = match file.lock().await.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "Progress snapshot unreadable, starting empty");
                return 0;
            }
        };

        let mut series = self.series.write().await;
        for (series_id, episodes) in snapshot.seen {
            let entry = series.entry(series_id).or_default();
            entry.seen = episodes.into_iter().collect();
            entry.recount();
        }
        for (series_id, total) in snapshot.totals {
            series.entry(series_id).or_default().total = total;
        }

        tracing::debug!(series = series.len(), "Progress snapshot restored");
        series.len()
    }

    /// Drops all local progress and the snapshot (logout)
    pub async fn clear(&self) {
        self.series.write().await.clear();

        if let Some(file) = &self.snapshot {
            if let Err(e) = file.lock().await.remove().await {
                tracing::warn!(error = %e, "Failed to remove progress snapshot");
            }
        }
    }

    /// True when the local detail set holds the episode
    ///
    /// Aggregate-only data has no per-episode detail, so this is false until
    /// the series is loaded in detail.
    pub async fn is_seen(&self, series_id: u64, episode_id: u64) -> bool {
        self.series
            .read()
            .await
            .get(&series_id)
            .is_some_and(|entry| entry.seen.contains(&episode_id))
    }

    /// Flips one episode and persists the change; returns the new seen state
    ///
    /// The local flip is optimistic and is never rolled back. When the total
    /// is unknown it is fetched first so the upsert already carries it.
    pub async fn toggle_episode(&self, series_id: u64, episode_id: u64, season: u32) -> bool {
        let now_seen = {
            let mut series = self.series.write().await;
            let entry = series.entry(series_id).or_default();
            let now_seen = !entry.seen.remove(&episode_id);
            if now_seen {
                entry.seen.insert(episode_id);
            }
            entry.recount();
            now_seen
        };
        self.persist_snapshot().await;

        let total = self.resolve_total(series_id).await;

        let update = SeenUpdate {
            show_id: series_id,
            season,
            episode: episode_id,
            seen: now_seen,
            total_episodes: (total > 0).then_some(total),
        };
        if let Err(e) = self.api.upsert_seen(&update).await {
            tracing::warn!(
                error = %e,
                series_id,
                episode_id,
                "Failed to persist episode toggle, keeping local state"
            );
        }

        now_seen
    }

    /// Returns the known total, asking the catalog once when it is unknown
    ///
    /// Yields 0 when the catalog fails or knows no episodes.
    pub async fn resolve_total(&self, series_id: u64) -> u32 {
        let known = self.get_total(series_id).await;
        if known > 0 {
            return known;
        }

        match self.catalog.fetch_total_episodes(series_id).await {
            Ok(0) => 0,
            Ok(total) => {
                self.set_total(series_id, total).await;
                total
            }
            Err(e) => {
                tracing::warn!(error = %e, series_id, "Could not resolve series total");
                0
            }
        }
    }

    /// Fetches progress and merges it into the cache
    ///
    /// With `series_id` the detail set of that series is rebuilt from the
    /// returned rows. Without it, every returned row is merged: aggregate rows
    /// first, then detail rows. A failed fetch leaves the previous data.
    pub async fn load_from_api(&self, series_id: Option<u64>) {
        let previous = self.mark_loading(series_id).await;

        let rows = match self.api.fetch_progress(series_id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, series_id = ?series_id, "Progress load failed");
                self.restore_states(previous).await;
                return;
            }
        };

        let pending = {
            let mut series = self.series.write().await;
            match series_id {
                Some(id) => merge_series(&mut series, id, &rows),
                None => merge_all(&mut series, &rows),
            }
            for id in previous.keys() {
                if let Some(entry) = series.get_mut(id) {
                    entry.state = LoadState::Ready;
                }
            }

            series
                .iter()
                .filter(|(id, entry)| series_id.map_or(true, |s| s == **id) && entry.needs_total())
                .map(|(id, _)| *id)
                .collect::<Vec<_>>()
        };

        tracing::debug!(
            series_id = ?series_id,
            rows = rows.len(),
            pending_totals = pending.len(),
            "Progress loaded"
        );

        self.persist_snapshot().await;

        if !pending.is_empty() {
            self.backfill_totals(pending).await;
        }
    }

    /// Resolves missing totals in parallel and pushes each one to the store
    async fn backfill_totals(&self, series_ids: Vec<u64>) {
        let mut tasks = JoinSet::new();

        for series_id in series_ids {
            let catalog = self.catalog.clone();
            let api = self.api.clone();
            let series = self.series.clone();

            tasks.spawn(async move {
                let total = match catalog.fetch_total_episodes(series_id).await {
                    Ok(0) => return,
                    Ok(total) => total,
                    Err(e) => {
                        tracing::warn!(error = %e, series_id, "Client total backfill failed");
                        return;
                    }
                };

                series.write().await.entry(series_id).or_default().total = total;

                if let Err(e) = api.upsert_seen(&SeenUpdate::sentinel(series_id, total)).await {
                    tracing::warn!(error = %e, series_id, "Failed to push backfilled total");
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Client backfill task panicked");
            }
        }

        self.persist_snapshot().await;
    }

    /// Clears a series locally and in the store
    pub async fn delete_series(&self, series_id: u64) {
        self.series.write().await.remove(&series_id);
        self.persist_snapshot().await;

        if let Err(e) = self.api.delete_series(series_id).await {
            tracing::warn!(error = %e, series_id, "Failed to clear series progress in store");
        }
    }

    pub async fn set_total(&self, series_id: u64, total: u32) {
        self.series.write().await.entry(series_id).or_default().total = total;
        self.persist_snapshot().await;
    }

    pub async fn get_total(&self, series_id: u64) -> u32 {
        self.series
            .read()
            .await
            .get(&series_id)
            .map_or(0, |entry| entry.total)
    }

    pub async fn seen_count(&self, series_id: u64) -> u32 {
        self.series
            .read()
            .await
            .get(&series_id)
            .and_then(|entry| entry.counter)
            .unwrap_or(0)
    }

    /// `round(counter / total * 100)`, 0 while the total is unknown
    pub async fn get_percent(&self, series_id: u64) -> u32 {
        self.series
            .read()
            .await
            .get(&series_id)
            .map_or(0, SeriesProgress::percent)
    }

    pub async fn load_state(&self, series_id: u64) -> LoadState {
        self.series
            .read()
            .await
            .get(&series_id)
            .map_or(LoadState::Unloaded, |entry| entry.state)
    }

    /// Copy of one series entry
    pub async fn series(&self, series_id: u64) -> Option<SeriesProgress> {
        self.series.read().await.get(&series_id).cloned()
    }

    /// Series with seen episodes but no known total
    pub async fn missing_totals(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .series
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.needs_total())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Writes the current state to the durable snapshot
    ///
    /// The snapshot lock is taken before the state is captured, so the last
    /// save always reflects the latest state.
    pub async fn persist_snapshot(&self) {
        let Some(file) = &self.snapshot else {
            return;
        };

        let file = file.lock().await;
        let snapshot = self.capture().await;
        if let Err(e) = file.save(&snapshot).await {
            tracing::warn!(error = %e, path = %file.path().display(), "Failed to save progress snapshot");
        }
    }

    async fn capture(&self) -> Snapshot {
        let series = self.series.read().await;
        let mut snapshot = Snapshot::default();

        for (id, entry) in series.iter() {
            let mut episodes: Vec<u64> = entry.seen.iter().copied().collect();
            episodes.sort_unstable();
            snapshot.seen.insert(*id, episodes);
            if entry.total > 0 {
                snapshot.totals.insert(*id, entry.total);
            }
        }

        snapshot
    }

    /// Marks the load scope as loading and returns the states to restore on failure
    async fn mark_loading(&self, series_id: Option<u64>) -> HashMap<u64, LoadState> {
        let mut series = self.series.write().await;
        let mut previous = HashMap::new();

        match series_id {
            Some(id) => {
                let entry = series.entry(id).or_default();
                previous.insert(id, entry.state);
                entry.state = LoadState::Loading;
            }
            None => {
                for (id, entry) in series.iter_mut() {
                    previous.insert(*id, entry.state);
                    entry.state = LoadState::Loading;
                }
            }
        }

        previous
    }

    async fn restore_states(&self, previous: HashMap<u64, LoadState>) {
        let mut series = self.series.write().await;
        for (id, state) in previous {
            if let Some(entry) = series.get_mut(&id) {
                // A concurrent load may already have finished this entry
                if entry.state == LoadState::Loading {
                    entry.state = state;
                }
            }
        }
    }
}

/// Rebuilds one series from the rows of a scoped load
fn merge_series(series: &mut SeriesMap, series_id: u64, rows: &[ProgressRow]) {
    let entry = series.entry(series_id).or_default();
    entry.seen.clear();

    let mut total = 0;
    let mut aggregate_count = None;
    for row in rows.iter().filter(|row| row.show_id() == series_id) {
        match row {
            ProgressRow::Detail(detail) => {
                total = total.max(detail.total_episodes.unwrap_or(0));
                if detail.seen && !detail.is_sentinel() {
                    entry.seen.insert(detail.episode);
                }
            }
            ProgressRow::Aggregate(agg) => {
                total = total.max(agg.total_episodes);
                aggregate_count = Some(agg.seen_count);
            }
        }
    }

    if total > 0 {
        entry.total = total;
    }
    entry.counter = Some(match aggregate_count {
        Some(seen_count) if entry.seen.is_empty() => seen_count,
        _ => count(&entry.seen),
    });
    entry.state = LoadState::Ready;
}

/// Merges the rows of a full load
fn merge_all(series: &mut SeriesMap, rows: &[ProgressRow]) {
    let mut aggregate_sourced = HashSet::new();

    for row in rows {
        if let ProgressRow::Aggregate(agg) = row {
            let entry = series.entry(agg.show_id).or_default();
            if agg.total_episodes > 0 {
                entry.total = agg.total_episodes;
            }
            entry.counter = Some(agg.seen_count);
            entry.state = LoadState::Ready;
            if agg.seen_count > 0 {
                aggregate_sourced.insert(agg.show_id);
            }
        }
    }

    let mut detail_sets: HashMap<u64, HashSet<u64>> = HashMap::new();
    let mut detail_totals: HashMap<u64, u32> = HashMap::new();
    for row in rows {
        if let ProgressRow::Detail(detail) = row {
            let set = detail_sets.entry(detail.show_id).or_default();
            if detail.seen && !detail.is_sentinel() {
                set.insert(detail.episode);
            }
            if let Some(total) = detail.total_episodes.filter(|t| *t > 0) {
                let max = detail_totals.entry(detail.show_id).or_default();
                *max = (*max).max(total);
            }
        }
    }

    for (id, set) in detail_sets {
        let entry = series.entry(id).or_default();
        if !aggregate_sourced.contains(&id) {
            entry.counter = Some(count(&set));
        }
        entry.seen = set;
        if let Some(total) = detail_totals.get(&id) {
            entry.total = *total;
        }
        entry.state = LoadState::Ready;
    }
}
