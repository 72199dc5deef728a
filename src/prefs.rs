//! Typed access to the persisted per-anime watch preferences.
//!
//! Keys and value shapes are stable: other surfaces (the continue-watching
//! list) read the same entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::error::Result;
use crate::storage::KeyValueStore;
use crate::types::{AnimeTitle, Episode, Language, SourceType, string_or_number};

pub const LAST_ANIME_VISITED_KEY: &str = "last-anime-visited";

pub fn source_type_key(anime_id: &str) -> String {
    format!("source-[{anime_id}]")
}

pub fn language_key(anime_id: &str) -> String {
    format!("subOrDub-[{anime_id}]")
}

pub fn last_watched_key(anime_id: &str) -> String {
    format!("last-watched-{anime_id}")
}

pub fn watched_episodes_key(anime_id: &str) -> String {
    format!("watched-episodes-{anime_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastWatched {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub number: String,
}

impl From<&Episode> for LastWatched {
    fn from(episode: &Episode) -> Self {
        Self {
            id: episode.id.clone(),
            title: episode.title.clone(),
            number: episode.number.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastVisited {
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub title_english: String,
    #[serde(default)]
    pub title_romaji: String,
}

pub type LastVisitedMap = BTreeMap<String, LastVisited>;

pub struct PreferenceStore<S> {
    store: S,
}

impl<S: KeyValueStore> PreferenceStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn source_type(&self, anime_id: &str) -> SourceType {
        self.store
            .get(&source_type_key(anime_id))
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_source_type(&mut self, anime_id: &str, source: SourceType) -> Result<()> {
        self.store.set(&source_type_key(anime_id), source.as_str())
    }

    pub fn language(&self, anime_id: &str) -> Language {
        self.store
            .get(&language_key(anime_id))
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_language(&mut self, anime_id: &str, language: Language) -> Result<()> {
        self.store.set(&language_key(anime_id), language.as_str())
    }

    pub fn last_watched(&self, anime_id: &str) -> Option<LastWatched> {
        self.read_json(&last_watched_key(anime_id))
    }

    pub fn set_last_watched(&mut self, anime_id: &str, episode: &Episode) -> Result<()> {
        self.write_json(&last_watched_key(anime_id), &LastWatched::from(episode))
    }

    pub fn watched_episodes(&self, anime_id: &str) -> Vec<Episode> {
        self.read_json(&watched_episodes_key(anime_id))
            .unwrap_or_default()
    }

    /// Appends to the watched record unless the id is already there.
    /// Returns whether anything was written.
    pub fn mark_watched(&mut self, anime_id: &str, episode: &Episode) -> Result<bool> {
        let mut watched = self.watched_episodes(anime_id);
        if watched.iter().any(|ep| ep.id == episode.id) {
            return Ok(false);
        }
        watched.push(episode.clone());
        self.write_json(&watched_episodes_key(anime_id), &watched)?;
        Ok(true)
    }

    pub fn last_visited(&self) -> LastVisitedMap {
        self.read_json(LAST_ANIME_VISITED_KEY).unwrap_or_default()
    }

    pub fn record_visit(&mut self, anime_id: &str, title: &AnimeTitle, timestamp: i64) -> Result<()> {
        let mut visited = self.last_visited();
        visited.insert(
            anime_id.to_string(),
            LastVisited {
                timestamp,
                title_english: title.english.clone().unwrap_or_default(),
                title_romaji: title.romaji.clone().unwrap_or_default(),
            },
        );
        self.write_json(LAST_ANIME_VISITED_KEY, &visited)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "Ignoring unreadable preference");
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value)?;
        self.store.set(key, &data)
    }
}
