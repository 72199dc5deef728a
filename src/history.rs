//! Continue-watching list built from the stored visit map.

use chrono::{DateTime, Utc};
use dialoguer::{Select, theme::ColorfulTheme};

use crate::catalog;
use crate::error::Result;
use crate::prefs::{LastWatched, PreferenceStore};
use crate::route::Route;
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub anime_id: String,
    pub title: String,
    pub visited_at: Option<DateTime<Utc>>,
    pub last_episode: Option<LastWatched>,
}

impl HistoryEntry {
    /// Route that resumes this entry: the episode when its id carries a slug,
    /// otherwise the bare anime route.
    pub fn route(&self) -> Route {
        let resume = self.last_episode.as_ref().and_then(|ep| {
            ep.id
                .split_once(catalog::EPISODE_DELIMITER)
                .map(|(slug, _)| Route::episode(&self.anime_id, slug, &ep.number))
        });
        resume.unwrap_or_else(|| Route::anime(&self.anime_id))
    }

    pub fn label(&self) -> String {
        let episode = self
            .last_episode
            .as_ref()
            .map(|ep| format!("episode {}", ep.number))
            .unwrap_or_else(|| "not started".to_string());
        let when = self
            .visited_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        format!("{} \u{00b7} {} \u{00b7} visited {}", self.title, episode, when)
    }
}

/// Visited anime, newest first.
pub fn continue_watching<S: KeyValueStore>(prefs: &PreferenceStore<S>) -> Vec<HistoryEntry> {
    let mut visits: Vec<_> = prefs.last_visited().into_iter().collect();
    visits.sort_by(|(_, a), (_, b)| b.timestamp.cmp(&a.timestamp));
    visits
        .into_iter()
        .map(|(anime_id, visit)| {
            let title = [visit.title_english, visit.title_romaji]
                .into_iter()
                .find(|t| !t.is_empty())
                .unwrap_or_else(|| anime_id.clone());
            let last_episode = prefs
                .watched_episodes(&anime_id)
                .last()
                .map(LastWatched::from)
                .or_else(|| prefs.last_watched(&anime_id));
            HistoryEntry {
                visited_at: DateTime::<Utc>::from_timestamp_millis(visit.timestamp),
                title,
                last_episode,
                anime_id,
            }
        })
        .collect()
}

pub fn select_entry(entries: &[HistoryEntry]) -> Result<Option<HistoryEntry>> {
    if entries.is_empty() {
        println!("History is empty.");
        return Ok(None);
    }
    let items: Vec<String> = entries.iter().map(HistoryEntry::label).collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("Continue watching (Esc to cancel)")
        .items(&items)
        .default(0)
        .interact_opt()?;
    Ok(selection.map(|idx| entries[idx].clone()))
}

pub fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}
