/// Read-through caching over an optional [`Cache`](crate::db::Cache).
///
/// Returns the cached value on a hit. On a miss, or when no cache is
/// configured, awaits `$block`, queues the result for a background write and
/// returns it. A failing cache read is logged and treated as a miss, so the
/// remote source stays authoritative when Redis is unavailable.
///
/// The optional last argument is a `Fn(&T) -> bool`; values it rejects are
/// returned but never written.
///
/// # Example
/// ```rust,ignore
/// let roster: Roster = cached!(
///     self.cache,
///     CacheKey::EpisodeRoster(id),
///     ttl,
///     self.fetch_roster_uncached(id),
///     |roster: &Roster| !roster.is_empty()
/// )?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {
        $crate::cached!($cache, $key, $ttl, $block, |_| true)
    };
    ($cache:expr, $key:expr, $ttl:expr, $block:expr, $should_cache:expr) => {{
        let key = $key;
        match &$cache {
            Some(cache) => {
                let hit = match cache.get_json(&key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        tracing::warn!(error = %e, key = %key, "Cache read failed, bypassing");
                        None
                    }
                };
                match hit {
                    Some(cached) => Ok(cached),
                    None => match $block.await {
                        Ok(value) => {
                            let should_cache = $should_cache;
                            if should_cache(&value) {
                                cache.put_in_background(&key, &value, $ttl);
                            }
                            Ok(value)
                        }
                        Err(e) => Err(e),
                    },
                }
            }
            None => $block.await,
        }
    }};
}
