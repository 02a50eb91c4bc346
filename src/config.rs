use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// SQLite connection URL for the progress store
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Redis connection URL; the roster cache is disabled when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// TheTVDB API key used for episode rosters
    #[serde(default)]
    pub tvdb_api_key: Option<String>,

    /// TheTVDB API base URL
    #[serde(default = "default_tvdb_api_url")]
    pub tvdb_api_url: String,

    /// Seconds an episode roster stays in the Redis cache
    #[serde(default = "default_roster_cache_ttl")]
    pub roster_cache_ttl: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Run the missing-total backfill once at startup
    #[serde(default = "default_startup_backfill")]
    pub startup_backfill: bool,
}

fn default_database_url() -> String {
    "sqlite://trackmyseries.db?mode=rwc".to_string()
}

fn default_tvdb_api_url() -> String {
    "https://api4.thetvdb.com/v4".to_string()
}

fn default_roster_cache_ttl() -> u64 {
    86_400
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_startup_backfill() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(vars).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert_eq!(config.database_url, "sqlite://trackmyseries.db?mode=rwc");
        assert_eq!(config.tvdb_api_url, "https://api4.thetvdb.com/v4");
        assert_eq!(config.port, 4000);
        assert_eq!(config.roster_cache_ttl, 86_400);
        assert!(config.redis_url.is_none());
        assert!(config.tvdb_api_key.is_none());
        assert!(config.startup_backfill);
    }

    #[test]
    fn test_overrides_from_vars() {
        let config = Config::from_vars(vec![
            ("TVDB_API_KEY".to_string(), "secret".to_string()),
            ("PORT".to_string(), "8080".to_string()),
            ("STARTUP_BACKFILL".to_string(), "false".to_string()),
        ])
        .unwrap();

        assert_eq!(config.tvdb_api_key.as_deref(), Some("secret"));
        assert_eq!(config.port, 8080);
        assert!(!config.startup_backfill);
    }
}
