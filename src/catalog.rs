//! Episode catalog normalization.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::types::{Episode, RawEpisode};

pub const EPISODE_DELIMITER: &str = "-episode-";

fn episode_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // "12" or a split episode such as "7-5".
    PATTERN.get_or_init(|| Regex::new(r"^(\d+(?:-\d+)?)").expect("episode number pattern is valid"))
}

/// Number encoded in an id after `-episode-`, if it looks like one.
pub fn episode_number_from_id(id: &str) -> Option<&str> {
    let tail = id.split(EPISODE_DELIMITER).nth(1)?;
    episode_number_pattern()
        .captures(tail)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Drops ids without `-episode-`, takes the number from the id where possible,
/// and reverses upstream order. Duplicate ids are kept; lookups take the first.
pub fn normalize(raw: Vec<RawEpisode>) -> Vec<Episode> {
    let total = raw.len();
    let mut episodes: Vec<Episode> = raw
        .into_iter()
        .filter(|ep| ep.id.contains(EPISODE_DELIMITER))
        .map(|ep| {
            let number = episode_number_from_id(&ep.id)
                .map(str::to_string)
                .unwrap_or(ep.number);
            Episode {
                id: ep.id,
                number,
                title: ep.title,
                air_date: ep.air_date,
            }
        })
        .collect();
    if episodes.len() != total {
        debug!(
            dropped = total - episodes.len(),
            kept = episodes.len(),
            "Dropped malformed catalog entries"
        );
    }
    episodes.reverse();
    episodes
}

pub fn find_by_id<'a>(catalog: &'a [Episode], id: &str) -> Option<&'a Episode> {
    catalog.iter().find(|ep| ep.id == id)
}

/// Numbers compare as strings: "7-5" only equals "7-5".
pub fn find_by_number<'a>(catalog: &'a [Episode], number: &str) -> Option<&'a Episode> {
    catalog.iter().find(|ep| ep.number == number)
}

pub fn position_of(catalog: &[Episode], id: &str) -> Option<usize> {
    catalog.iter().position(|ep| ep.id == id)
}
