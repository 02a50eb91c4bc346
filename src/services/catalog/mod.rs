/// Episode catalog abstraction
///
/// The progress store and the client cache only need two things from a
/// catalog: the episode roster of a series and, derived from it, an estimated
/// episode count. Each catalog backend implements [`CatalogProvider`].
use crate::{
    error::AppResult,
    models::{roster_total, Roster},
};

pub mod tvdb;

pub use tvdb::{Scheme, TvdbCatalog};

/// Trait for episode catalog providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Full episode roster of a series, grouped by season number
    async fn fetch_episode_roster(&self, series_id: u64) -> AppResult<Roster>;

    /// Estimated number of episodes of a series
    ///
    /// The count is only as good as the remote pagination; callers use it to
    /// fill an unknown total, never to lower a known one.
    async fn fetch_total_episodes(&self, series_id: u64) -> AppResult<u32> {
        let roster = self.fetch_episode_roster(series_id).await?;
        Ok(roster_total(&roster))
    }

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
