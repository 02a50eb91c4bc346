use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Episodes of a series grouped by season number, ordered by episode number
pub type Roster = BTreeMap<u32, Vec<Episode>>;

/// Estimated episode count of a series: the sum of every season's list length
pub fn roster_total(roster: &Roster) -> u32 {
    roster.values().map(|episodes| episodes.len() as u32).sum()
}

/// Episode as exposed to the rest of the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: u64,
    pub name: String,
    pub number: Option<u32>,
    pub overview: String,
    pub image: String,
}

// ============================================================================
// TheTVDB API Types
// ============================================================================

/// Raw episode record from `/series/{id}/episodes/{scheme}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEpisode {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub aired_episode_number: Option<u32>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub aired_season: Option<u32>,
}

impl ApiEpisode {
    /// Season the episode is filed under; unknown seasons land in 0
    pub fn season(&self) -> u32 {
        self.aired_season
            .filter(|s| *s > 0)
            .or(self.season_number)
            .unwrap_or(0)
    }
}

impl From<ApiEpisode> for Episode {
    fn from(api: ApiEpisode) -> Self {
        let number = api.number.filter(|n| *n > 0).or(api.aired_episode_number);
        let name = api
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| api.overview.clone().filter(|o| !o.is_empty()))
            .unwrap_or_else(|| format!("E{}", number.unwrap_or(0)));

        Episode {
            id: api.id,
            name,
            number,
            overview: api.overview.unwrap_or_default(),
            image: api.image.unwrap_or_default(),
        }
    }
}

/// One page of the episodes endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpisodePage {
    #[serde(default)]
    pub data: Option<EpisodePageData>,
    #[serde(default)]
    pub links: Option<PageLinks>,
}

impl EpisodePage {
    /// Episodes on this page, whichever of the two payload layouts was used
    ///
    /// Items that do not parse as an episode are skipped one by one, so a
    /// single malformed record never blanks the rest of the page.
    pub fn into_episodes(self) -> Vec<ApiEpisode> {
        let items = match self.data {
            Some(EpisodePageData::List(items)) => items,
            Some(EpisodePageData::Nested { episodes }) => episodes,
            Some(EpisodePageData::Other(_)) | None => return Vec::new(),
        };

        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<ApiEpisode>(item) {
                Ok(episode) => Some(episode),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed TVDB episode");
                    None
                }
            })
            .collect()
    }

    /// Page number of the next page, `None` once the server stops paginating
    pub fn next_page(&self, current: u32) -> Option<u32> {
        match self.links.as_ref()?.next.as_ref()? {
            NextCursor::Page(page) => Some(*page),
            NextCursor::Url(url) => reqwest::Url::parse(url)
                .ok()
                .and_then(|parsed| {
                    parsed
                        .query_pairs()
                        .find(|(k, _)| k == "page")
                        .and_then(|(_, v)| v.parse().ok())
                })
                .or(Some(current + 1)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EpisodePageData {
    List(Vec<serde_json::Value>),
    Nested { episodes: Vec<serde_json::Value> },
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<NextCursor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NextCursor {
    Page(u32),
    Url(String),
}

/// Response of `POST /login`
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub data: LoginData,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
}
