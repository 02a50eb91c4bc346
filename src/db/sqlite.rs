use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::AppResult;

/// Creates a SQLite connection pool and applies the embedded migrations
///
/// In-memory databases live per connection, so they get a single connection
/// that is never recycled.
pub async fn create_pool(database_url: &str) -> AppResult<SqlitePool> {
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    let options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = options.connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(in_memory, "Progress database ready");

    Ok(pool)
}
