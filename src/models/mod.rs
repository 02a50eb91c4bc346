use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub mod catalog;
pub mod lists;

pub use catalog::{roster_total, ApiEpisode, Episode, EpisodePage, LoginResponse, Roster};
pub use lists::{ListEntry, MediaType, UserLists};

/// Season/episode pair reserved for the row that only carries a series total
pub const SENTINEL_SEASON: u32 = 0;
pub const SENTINEL_EPISODE: u64 = 0;

/// Largest integer a JSON consumer can represent without losing precision
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Returns true for the `(0, 0)` row used to anchor a total
pub fn is_sentinel(season: u32, episode: u64) -> bool {
    season == SENTINEL_SEASON && episode == SENTINEL_EPISODE
}

/// A stored "seen" ledger row, keyed by (user, show, season, episode)
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SeenRecord {
    pub user_id: String,
    pub show_id: i64,
    pub season: i64,
    pub episode: i64,
    pub seen: bool,
    pub total_episodes: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// One progress row as exchanged between the store and the client cache
///
/// The store answers series-scoped reads with detail rows and full reads with
/// aggregate rows. On the wire the aggregate form is recognised by `seen_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressRow {
    Aggregate(AggregateRow),
    Detail(DetailRow),
}

impl ProgressRow {
    pub fn show_id(&self) -> u64 {
        match self {
            ProgressRow::Aggregate(row) => row.show_id,
            ProgressRow::Detail(row) => row.show_id,
        }
    }
}

/// Per-episode row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub show_id: u64,
    pub season: u32,
    pub episode: u64,
    #[serde(deserialize_with = "bool_or_int")]
    pub seen: bool,
    #[serde(default)]
    pub total_episodes: Option<u32>,
}

impl DetailRow {
    pub fn is_sentinel(&self) -> bool {
        is_sentinel(self.season, self.episode)
    }
}

/// Pre-aggregated per-series row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub show_id: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_episodes: u32,
    pub seen_count: u32,
}

/// Body of `POST /episodes` once validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenUpdate {
    pub show_id: u64,
    pub season: u32,
    pub episode: u64,
    pub seen: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_episodes: Option<u32>,
}

impl SeenUpdate {
    /// Row that only records a freshly fetched total for a series
    pub fn sentinel(show_id: u64, total: u32) -> Self {
        Self {
            show_id,
            season: SENTINEL_SEASON,
            episode: SENTINEL_EPISODE,
            seen: true,
            total_episodes: Some(total),
        }
    }
}

/// Raw `POST /episodes` body; required fields are checked by [`UpsertSeenRequest::validate`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertSeenRequest {
    pub show_id: Option<u64>,
    pub season: Option<u32>,
    pub episode: Option<u64>,
    #[serde(default, deserialize_with = "opt_bool_or_int")]
    pub seen: Option<bool>,
    pub total_episodes: Option<u32>,
}

impl UpsertSeenRequest {
    pub fn validate(self) -> Result<SeenUpdate, crate::error::AppError> {
        let missing = |field: &str| crate::error::AppError::Validation(format!("{field} is required"));

        let show_id = self.show_id.ok_or_else(|| missing("show_id"))?;
        let season = self.season.ok_or_else(|| missing("season"))?;
        let episode = self.episode.ok_or_else(|| missing("episode"))?;

        if show_id > MAX_SAFE_INTEGER || episode > MAX_SAFE_INTEGER {
            return Err(crate::error::AppError::Validation(
                "identifier out of range".to_string(),
            ));
        }

        Ok(SeenUpdate {
            show_id,
            season,
            episode,
            seen: self.seen.unwrap_or(true),
            // A zero total carries no information and must not mask a stored one
            total_episodes: self.total_episodes.filter(|total| *total > 0),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrInt {
    Bool(bool),
    Int(i64),
}

impl From<BoolOrInt> for bool {
    fn from(value: BoolOrInt) -> Self {
        match value {
            BoolOrInt::Bool(b) => b,
            BoolOrInt::Int(i) => i != 0,
        }
    }
}

fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    BoolOrInt::deserialize(deserializer).map(bool::from)
}

fn opt_bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(Option::<BoolOrInt>::deserialize(deserializer)?.map(bool::from))
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}
