use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    db,
    error::{AppError, AppResult},
    models::{AggregateRow, DetailRow, ProgressRow, SeenRecord, SeenUpdate, MAX_SAFE_INTEGER},
};

/// Authoritative per-(user, show, season, episode) "seen" ledger
#[derive(Clone)]
pub struct ProgressStore {
    pool: SqlitePool,
}

type DetailTuple = (i64, i64, i64, bool, Option<i64>);
type AggregateTuple = (i64, i64, i64);

impl ProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (and migrates) the database behind `database_url`
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        Ok(Self::new(db::create_pool(database_url).await?))
    }

    /// Idempotent upsert keyed by (user, show, season, episode)
    ///
    /// `seen` always takes the new value. A stored total is only replaced by a
    /// present one: an absent total never erases what is already known.
    pub async fn upsert_seen(&self, user_id: &str, update: &SeenUpdate) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO episodes_seen (user_id, show_id, season, episode, seen, total_episodes, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, show_id, season, episode)
            DO UPDATE SET seen = excluded.seen,
                          updated_at = excluded.updated_at,
                          total_episodes = COALESCE(excluded.total_episodes, episodes_seen.total_episodes)
            "#,
        )
        .bind(user_id)
        .bind(to_db_id(update.show_id)?)
        .bind(i64::from(update.season))
        .bind(to_db_id(update.episode)?)
        .bind(update.seen)
        .bind(update.total_episodes.filter(|t| *t > 0).map(i64::from))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            show_id = update.show_id,
            season = update.season,
            episode = update.episode,
            seen = update.seen,
            "Episode progress upserted"
        );

        Ok(())
    }

    /// Progress of a user
    ///
    /// With `show_id`: the seen detail rows of that series, the sentinel
    /// included so its total reaches the caller. Without: one aggregate row per
    /// series that has at least one seen episode.
    pub async fn get_progress(
        &self,
        user_id: &str,
        show_id: Option<u64>,
    ) -> AppResult<Vec<ProgressRow>> {
        match show_id {
            Some(show_id) => {
                let rows: Vec<DetailTuple> = sqlx::query_as(
                    r#"
                    SELECT show_id, season, episode, seen, total_episodes
                    FROM episodes_seen
                    WHERE user_id = ? AND show_id = ? AND seen = 1
                    ORDER BY season, episode
                    "#,
                )
                .bind(user_id)
                .bind(to_db_id(show_id)?)
                .fetch_all(&self.pool)
                .await?;

                rows.into_iter()
                    .map(|(show_id, season, episode, seen, total)| {
                        Ok(ProgressRow::Detail(DetailRow {
                            show_id: to_safe_id(show_id)?,
                            season: to_count(season)?,
                            episode: to_safe_id(episode)?,
                            seen,
                            total_episodes: total.map(to_count).transpose()?,
                        }))
                    })
                    .collect()
            }
            None => {
                let rows: Vec<AggregateTuple> = sqlx::query_as(
                    r#"
                    SELECT show_id,
                           COALESCE(MAX(total_episodes), 0) AS total_episodes,
                           SUM(CASE WHEN seen = 1 AND NOT (season = 0 AND episode = 0)
                                    THEN 1 ELSE 0 END) AS seen_count
                    FROM episodes_seen
                    WHERE user_id = ?
                    GROUP BY show_id
                    HAVING seen_count > 0
                    ORDER BY show_id
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

                rows.into_iter()
                    .map(|(show_id, total, seen_count)| {
                        Ok(ProgressRow::Aggregate(AggregateRow {
                            show_id: to_safe_id(show_id)?,
                            total_episodes: to_count(total)?,
                            seen_count: to_count(seen_count)?,
                        }))
                    })
                    .collect()
            }
        }
    }

    /// Removes every row of a series for a user; deleting nothing is fine
    pub async fn delete_series(&self, user_id: &str, show_id: u64) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM episodes_seen WHERE user_id = ? AND show_id = ?")
            .bind(user_id)
            .bind(to_db_id(show_id)?)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            user_id = %user_id,
            show_id,
            removed = result.rows_affected(),
            "Series progress cleared"
        );

        Ok(result.rows_affected())
    }

    /// Largest total recorded for a series, `None` while unknown
    pub async fn stored_total(&self, user_id: &str, show_id: u64) -> AppResult<Option<u32>> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(total_episodes) FROM episodes_seen WHERE user_id = ? AND show_id = ?",
        )
        .bind(user_id)
        .bind(to_db_id(show_id)?)
        .fetch_one(&self.pool)
        .await?;

        total.filter(|t| *t > 0).map(to_count).transpose()
    }

    /// (user, show) pairs with seen episodes but no known total
    pub async fn missing_totals(&self, user_id: Option<&str>) -> AppResult<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, show_id
            FROM episodes_seen
            WHERE (? IS NULL OR user_id = ?)
            GROUP BY user_id, show_id
            HAVING COALESCE(MAX(total_episodes), 0) = 0
               AND SUM(CASE WHEN seen = 1 AND NOT (season = 0 AND episode = 0)
                            THEN 1 ELSE 0 END) > 0
            ORDER BY user_id, show_id
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(user, show)| Ok((user, to_safe_id(show)?)))
            .collect()
    }

    /// Stores a fetched total on the series' sentinel row
    pub async fn record_total(&self, user_id: &str, show_id: u64, total: u32) -> AppResult<()> {
        if total == 0 {
            return Ok(());
        }
        self.upsert_seen(user_id, &SeenUpdate::sentinel(show_id, total))
            .await
    }

    /// Every stored row of a series, sentinel included
    pub async fn records(&self, user_id: &str, show_id: u64) -> AppResult<Vec<SeenRecord>> {
        let records = sqlx::query_as::<_, SeenRecord>(
            r#"
            SELECT user_id, show_id, season, episode, seen, total_episodes, updated_at
            FROM episodes_seen
            WHERE user_id = ? AND show_id = ?
            ORDER BY season, episode
            "#,
        )
        .bind(user_id)
        .bind(to_db_id(show_id)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Converts a stored integer to an id every JSON consumer can represent exactly
fn to_safe_id(value: i64) -> AppResult<u64> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v <= MAX_SAFE_INTEGER)
        .ok_or_else(|| AppError::Internal(format!("stored identifier {} out of range", value)))
}

fn to_count(value: i64) -> AppResult<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Internal(format!("stored count {} out of range", value)))
}

fn to_db_id(value: u64) -> AppResult<i64> {
    i64::try_from(value)
        .map_err(|_| AppError::Validation(format!("identifier {} out of range", value)))
}
