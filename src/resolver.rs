//! Rules that pick the current episode for one resolution pass.

use crate::catalog::{self, EPISODE_DELIMITER};
use crate::prefs::LastWatched;
use crate::route::Route;
use crate::types::Episode;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveInput<'a> {
    pub route_slug: Option<&'a str>,
    pub route_episode: Option<&'a str>,
    pub catalog: &'a [Episode],
    pub last_watched: Option<&'a LastWatched>,
    /// Episode number to carry over after a language switch.
    pub language_switch: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Select(Episode),
    /// The deep link names an episode the catalog lacks; go to the bare anime route.
    Redirect,
    /// Nothing to resolve against yet.
    Unresolved,
}

/// First matching rule wins:
/// 1. after a language switch, same number in the new catalog, else its last entry;
/// 2. slug and number in the route, exact id `{slug}-episode-{number}` or redirect;
/// 3. saved last-watched number, else the first entry.
pub fn resolve(input: ResolveInput<'_>) -> Resolution {
    let catalog = input.catalog;
    if catalog.is_empty() {
        return Resolution::Unresolved;
    }

    if let Some(number) = input.language_switch {
        let picked = catalog::find_by_number(catalog, number).or_else(|| catalog.last());
        return picked.cloned().map_or(Resolution::Unresolved, Resolution::Select);
    }

    if let (Some(slug), Some(number)) = (input.route_slug, input.route_episode) {
        let wanted = episode_id(slug, number);
        return match catalog::find_by_id(catalog, &wanted) {
            Some(episode) => Resolution::Select(episode.clone()),
            None => Resolution::Redirect,
        };
    }

    let saved = input
        .last_watched
        .and_then(|saved| catalog::find_by_number(catalog, &saved.number));
    saved
        .or_else(|| catalog.first())
        .cloned()
        .map_or(Resolution::Unresolved, Resolution::Select)
}

pub fn episode_id(slug: &str, number: &str) -> String {
    format!("{slug}{EPISODE_DELIMITER}{number}")
}

/// Canonical route of a resolved episode; the slug comes from the episode id.
pub fn episode_route(anime_id: &str, episode: &Episode) -> Route {
    Route::episode(anime_id, episode.slug(), episode.number.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(slug: &str, number: &str) -> Episode {
        Episode {
            id: episode_id(slug, number),
            number: number.into(),
            title: None,
            air_date: None,
        }
    }

    fn catalog() -> Vec<Episode> {
        vec![ep("naruto", "1"), ep("naruto", "5"), ep("naruto", "12")]
    }

    #[test]
    fn deep_link_selects_exact_id() {
        let catalog = catalog();
        let out = resolve(ResolveInput {
            route_slug: Some("naruto"),
            route_episode: Some("5"),
            catalog: &catalog,
            ..Default::default()
        });
        assert_eq!(out, Resolution::Select(ep("naruto", "5")));
    }

    #[test]
    fn deep_link_miss_redirects() {
        let catalog = catalog();
        let out = resolve(ResolveInput {
            route_slug: Some("naruto"),
            route_episode: Some("99"),
            catalog: &catalog,
            ..Default::default()
        });
        assert_eq!(out, Resolution::Redirect);
    }

    #[test]
    fn deep_link_ignores_saved_record() {
        let catalog = catalog();
        let saved = LastWatched {
            id: "naruto-episode-12".into(),
            title: None,
            number: "12".into(),
        };
        let out = resolve(ResolveInput {
            route_slug: Some("naruto"),
            route_episode: Some("1"),
            catalog: &catalog,
            last_watched: Some(&saved),
            language_switch: None,
        });
        assert_eq!(out, Resolution::Select(ep("naruto", "1")));
    }

    #[test]
    fn saved_number_is_used_without_route_episode() {
        let catalog = catalog();
        let saved = LastWatched {
            id: "whatever".into(),
            title: None,
            number: "12".into(),
        };
        let out = resolve(ResolveInput {
            route_slug: Some("naruto"),
            catalog: &catalog,
            last_watched: Some(&saved),
            ..Default::default()
        });
        assert_eq!(out, Resolution::Select(ep("naruto", "12")));
    }

    #[test]
    fn unknown_saved_number_falls_back_to_first() {
        let catalog = catalog();
        let saved = LastWatched {
            id: "whatever".into(),
            title: None,
            number: "40".into(),
        };
        let out = resolve(ResolveInput {
            catalog: &catalog,
            last_watched: Some(&saved),
            ..Default::default()
        });
        assert_eq!(out, Resolution::Select(ep("naruto", "1")));
    }

    #[test]
    fn language_switch_keeps_number_not_id() {
        let dubbed = vec![ep("naruto-dub", "1"), ep("naruto-dub", "5")];
        let out = resolve(ResolveInput {
            route_slug: Some("naruto"),
            route_episode: Some("5"),
            catalog: &dubbed,
            language_switch: Some("5"),
            ..Default::default()
        });
        assert_eq!(out, Resolution::Select(ep("naruto-dub", "5")));
    }

    #[test]
    fn language_switch_falls_back_to_last_entry() {
        let dubbed = vec![ep("naruto-dub", "1"), ep("naruto-dub", "2")];
        let out = resolve(ResolveInput {
            catalog: &dubbed,
            language_switch: Some("12"),
            ..Default::default()
        });
        assert_eq!(out, Resolution::Select(ep("naruto-dub", "2")));
    }

    #[test]
    fn empty_catalog_resolves_nothing() {
        let out = resolve(ResolveInput {
            route_slug: Some("naruto"),
            route_episode: Some("5"),
            ..Default::default()
        });
        assert_eq!(out, Resolution::Unresolved);
    }

    #[test]
    fn route_slug_comes_from_resolved_id() {
        let route = episode_route("123", &ep("naruto-dub", "7-5"));
        assert_eq!(route.path(), "/watch/123/naruto-dub/7-5");
    }

    #[test]
    fn route_slug_may_contain_episode_word() {
        let catalog = vec![ep("my-episodes", "1"), ep("my-episodes", "3")];
        let out = resolve(ResolveInput {
            route_slug: Some("my-episodes"),
            route_episode: Some("3"),
            catalog: &catalog,
            ..Default::default()
        });
        let episode = match out {
            Resolution::Select(episode) => episode,
            other => panic!("expected a selection, got {other:?}"),
        };
        assert_eq!(episode_route("1", &episode).path(), "/watch/1/my-episodes/3");
    }
}
