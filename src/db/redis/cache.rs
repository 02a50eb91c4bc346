use std::fmt::Display;

use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::error::AppResult;

/// Queued writes beyond this are dropped; the catalog stays authoritative
const WRITE_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Episode roster of a catalog series
    EpisodeRoster(u64),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::EpisodeRoster(series_id) => write!(f, "tvdb:roster:{}", series_id),
        }
    }
}

/// Creates a Redis client for the roster cache
pub fn create_redis_client(redis_url: &str) -> AppResult<Client> {
    Ok(Client::open(redis_url)?)
}

struct PendingWrite {
    key: String,
    value: String,
    ttl: u64,
}

/// JSON values in Redis, read inline and written by a background task
///
/// Reads share one auto-reconnecting connection. Writes are queued so a slow
/// Redis never holds up a catalog lookup.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    writes: mpsc::Sender<PendingWrite>,
}

/// Owns the background writer; dropping it stops the writer as well
pub struct CacheWriterHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Flushes queued writes and waits for the writer to exit
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

impl Cache {
    /// Connects to Redis and starts the background writer
    pub async fn connect(client: Client) -> AppResult<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(client).await?;
        let (writes, queue) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (stop, stop_rx) = oneshot::channel();

        let task = tokio::spawn(run_writer(conn.clone(), queue, stop_rx));

        Ok((Self { conn, writes }, CacheWriterHandle { stop, task }))
    }

    /// Reads and decodes one value; `None` on a miss
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key.to_string()).await?;

        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    /// Queues a value for the background writer and returns immediately
    pub fn put_in_background<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let value = match serde_json::to_string(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Cache value not serializable");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            value,
            ttl,
        };
        match self.writes.try_send(write) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(write)) => {
                tracing::warn!(key = %write.key, "Cache write queue full, dropping write");
            }
            Err(mpsc::error::TrySendError::Closed(write)) => {
                tracing::debug!(key = %write.key, "Cache writer stopped, dropping write");
            }
        }
    }
}

async fn run_writer(
    mut conn: ConnectionManager,
    mut queue: mpsc::Receiver<PendingWrite>,
    mut stop: oneshot::Receiver<()>,
) {
    tracing::debug!("Cache writer started");

    loop {
        tokio::select! {
            write = queue.recv() => match write {
                Some(write) => store(&mut conn, write).await,
                None => break,
            },
            _ = &mut stop => {
                queue.close();
                while let Some(write) = queue.recv().await {
                    store(&mut conn, write).await;
                }
                break;
            }
        }
    }

    tracing::info!("Cache writer stopped");
}

async fn store(conn: &mut ConnectionManager, write: PendingWrite) {
    let result: RedisResult<()> = conn.set_ex(&write.key, write.value, write.ttl).await;
    if let Err(e) = result {
        tracing::warn!(error = %e, key = %write.key, "Cache write failed");
    }
}
