/// TheTVDB v4 catalog provider
///
/// API Flow:
/// 1. Login: POST /login {apikey} → bearer token, reused until it expires
/// 2. Roster: GET /series/{id}/episodes/{scheme}?page=N, following `links.next`
///
/// Some series only list episodes under the `official` ordering, so a roster
/// that comes back empty (or failing) under `default` is fetched once more
/// under `official`.
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{ApiEpisode, Episode, EpisodePage, LoginResponse, Roster},
    services::catalog::CatalogProvider,
};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;

const TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_ROSTER_CACHE_TTL: u64 = 86_400; // 1 day
const MAX_PAGES: u32 = 100;

/// Episode ordering requested from the episodes endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Default,
    Official,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Default => write!(f, "default"),
            Scheme::Official => write!(f, "official"),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Outcome of paging through one scheme
enum SchemeFetch {
    Episodes(Vec<ApiEpisode>),
    /// The first page had no episodes
    Empty,
}

#[derive(Clone)]
pub struct TvdbCatalog {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    cache: Option<Cache>,
    roster_cache_ttl: u64,
    token_ttl: Duration,
    /// Held across the login request so concurrent callers share one login
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl TvdbCatalog {
    pub fn new(api_key: Option<String>, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache: None,
            roster_cache_ttl: DEFAULT_ROSTER_CACHE_TTL,
            token_ttl: Duration::hours(TOKEN_TTL_HOURS),
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Caches rosters in Redis for `ttl` seconds
    pub fn with_cache(mut self, cache: Cache, ttl: u64) -> Self {
        self.cache = Some(cache);
        self.roster_cache_ttl = ttl;
        self
    }

    /// Overrides how long a login token is trusted
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Returns a valid bearer token, logging in when none is cached or it expired
    async fn token(&self) -> AppResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::Auth("TVDB API key missing".to_string()))?;

        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Utc::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        let url = format!("{}/login", self.api_url);
        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({ "apikey": api_key }))
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("login request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, "TVDB login rejected");
            return Err(AppError::Auth(format!("login rejected with status {}", status)));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("malformed login response: {}", e)))?;

        *slot = Some(CachedToken {
            value: login.data.token.clone(),
            expires_at: Utc::now() + self.token_ttl,
        });

        tracing::debug!("TVDB token refreshed");

        Ok(login.data.token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Pages through one scheme until `links.next` runs out or `MAX_PAGES` is hit
    async fn fetch_scheme(
        &self,
        token: &str,
        series_id: u64,
        scheme: Scheme,
    ) -> AppResult<SchemeFetch> {
        let mut episodes = Vec::new();
        let mut page = 0;

        for fetched in 0..MAX_PAGES {
            let url = format!("{}/series/{}/episodes/{}", self.api_url, series_id, scheme);
            let response = self
                .http_client
                .get(&url)
                .bearer_auth(token)
                .query(&[("page", page)])
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
                return Err(AppError::Auth("token rejected by TVDB".to_string()));
            }
            if !status.is_success() {
                return Err(AppError::RosterFetch {
                    status: status.as_u16(),
                });
            }

            let body: EpisodePage = response.json().await?;
            let next = body.next_page(page);
            let list = body.into_episodes();

            if list.is_empty() {
                if fetched == 0 {
                    return Ok(SchemeFetch::Empty);
                }
                return Ok(SchemeFetch::Episodes(episodes));
            }
            episodes.extend(list);

            match next {
                Some(next) if next > page => page = next,
                _ => return Ok(SchemeFetch::Episodes(episodes)),
            }
        }

        tracing::warn!(
            series_id,
            scheme = %scheme,
            pages = MAX_PAGES,
            episodes = episodes.len(),
            "Page limit reached, roster may be incomplete"
        );
        Ok(SchemeFetch::Episodes(episodes))
    }

    async fn fetch_roster_uncached(&self, series_id: u64) -> AppResult<Roster> {
        // One token for both orderings: a fallback never costs a second login
        let token = self.token().await?;

        let episodes = match self.fetch_scheme(&token, series_id, Scheme::Default).await {
            Ok(SchemeFetch::Episodes(episodes)) => episodes,
            Ok(SchemeFetch::Empty) => {
                tracing::debug!(series_id, "Default ordering empty, retrying with official");
                self.fetch_official(&token, series_id).await?
            }
            Err(AppError::RosterFetch { status }) => {
                tracing::debug!(series_id, status, "Default ordering failed, retrying with official");
                self.fetch_official(&token, series_id).await?
            }
            Err(e) => return Err(e),
        };

        let roster = group_by_season(episodes);

        tracing::info!(
            series_id,
            seasons = roster.len(),
            episodes = crate::models::roster_total(&roster),
            provider = "tvdb",
            "Episode roster fetched"
        );

        Ok(roster)
    }

    async fn fetch_official(&self, token: &str, series_id: u64) -> AppResult<Vec<ApiEpisode>> {
        match self.fetch_scheme(token, series_id, Scheme::Official).await? {
            SchemeFetch::Episodes(episodes) => Ok(episodes),
            SchemeFetch::Empty => Ok(Vec::new()),
        }
    }
}

/// Empty rosters stay uncached so the next lookup asks TVDB again
fn worth_caching(roster: &Roster) -> bool {
    !roster.is_empty()
}

/// Groups raw episodes by season and sorts each season by episode number
fn group_by_season(episodes: Vec<ApiEpisode>) -> Roster {
    let mut roster = Roster::new();
    for api in episodes {
        let season = api.season();
        roster.entry(season).or_default().push(Episode::from(api));
    }
    for list in roster.values_mut() {
        list.sort_by_key(|episode| episode.number.unwrap_or(0));
    }
    roster
}

#[async_trait::async_trait]
impl CatalogProvider for TvdbCatalog {
    async fn fetch_episode_roster(&self, series_id: u64) -> AppResult<Roster> {
        if series_id == 0 {
            return Ok(Roster::new());
        }

        cached!(
            self.cache,
            CacheKey::EpisodeRoster(series_id),
            self.roster_cache_ttl,
            self.fetch_roster_uncached(series_id),
            worth_caching
        )
    }

    fn name(&self) -> &'static str {
        "tvdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api_episode(id: u64, season: u32, number: u32) -> ApiEpisode {
        serde_json::from_value(json!({
            "id": id,
            "seasonNumber": season,
            "number": number,
            "name": format!("S{season}E{number}")
        }))
        .unwrap()
    }

    #[test]
    fn test_scheme_display() {
        assert_eq!(Scheme::Default.to_string(), "default");
        assert_eq!(Scheme::Official.to_string(), "official");
    }

    #[test]
    fn test_group_by_season_sorts_episodes() {
        let roster = group_by_season(vec![
            api_episode(3, 1, 3),
            api_episode(1, 1, 1),
            api_episode(10, 2, 1),
            api_episode(2, 1, 2),
        ]);

        assert_eq!(roster.len(), 2);
        let numbers: Vec<Option<u32>> = roster[&1].iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(roster[&2].len(), 1);
    }

    #[test]
    fn test_group_by_season_unknown_season_is_zero() {
        let unknown: ApiEpisode = serde_json::from_value(json!({"id": 5})).unwrap();
        let roster = group_by_season(vec![unknown]);
        assert_eq!(roster[&0].len(), 1);
    }

    #[test]
    fn test_only_non_empty_rosters_are_cached() {
        assert!(!worth_caching(&Roster::new()));
        assert!(worth_caching(&group_by_season(vec![api_episode(1, 1, 1)])));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let catalog = TvdbCatalog::new(None, "http://test.local".to_string());
        let err = catalog.fetch_episode_roster(42).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_empty_api_key_is_auth_error() {
        let catalog = TvdbCatalog::new(Some(String::new()), "http://test.local".to_string());
        let err = catalog.fetch_total_episodes(42).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_series_zero_has_empty_roster() {
        let catalog = TvdbCatalog::new(None, "http://test.local".to_string());
        let roster = catalog.fetch_episode_roster(0).await.unwrap();
        assert!(roster.is_empty());
    }
}
