use serde::{Deserialize, Serialize};

/// Kind of title kept in a user list
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    #[serde(alias = "serie")]
    Series,
    #[serde(alias = "pelicula")]
    Movie,
}

/// A title in one of the user's lists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListEntry {
    pub id: u64,
    /// Entries saved before types were tracked are series
    #[serde(default, rename = "type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub title: String,
}

impl ListEntry {
    pub fn series(id: u64) -> Self {
        Self {
            id,
            media_type: MediaType::Series,
            title: String::new(),
        }
    }

    pub fn movie(id: u64) -> Self {
        Self {
            id,
            media_type: MediaType::Movie,
            title: String::new(),
        }
    }
}

/// The user's watchlist, watched and favorites lists
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserLists {
    #[serde(default)]
    pub watchlist: Vec<ListEntry>,
    #[serde(default)]
    pub watched: Vec<ListEntry>,
    #[serde(default)]
    pub favorites: Vec<ListEntry>,
}

impl UserLists {
    /// Every entry across the three lists
    pub fn entries(&self) -> impl Iterator<Item = &ListEntry> {
        self.watchlist
            .iter()
            .chain(self.watched.iter())
            .chain(self.favorites.iter())
    }

    /// Ids of series (never movies) across all lists
    pub fn series_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries()
            .filter(|entry| entry.media_type == MediaType::Series)
            .map(|entry| entry.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_accepts_legacy_names() {
        let series: MediaType = serde_json::from_str("\"serie\"").unwrap();
        let movie: MediaType = serde_json::from_str("\"pelicula\"").unwrap();
        assert_eq!(series, MediaType::Series);
        assert_eq!(movie, MediaType::Movie);
    }

    #[test]
    fn test_untyped_entry_is_series() {
        let entry: ListEntry = serde_json::from_str(r#"{"id": 42, "title": "Serie Test"}"#).unwrap();
        assert_eq!(entry.media_type, MediaType::Series);
    }

    #[test]
    fn test_series_ids_skip_movies() {
        let lists = UserLists {
            watchlist: vec![ListEntry::series(1), ListEntry::movie(2)],
            watched: vec![ListEntry::series(3)],
            favorites: vec![ListEntry::series(1)],
        };
        let ids: Vec<u64> = lists.series_ids().collect();
        assert_eq!(ids, vec![1, 3, 1]);
    }
}
