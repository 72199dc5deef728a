//! Watch-session state machine.
//!
//! The controller owns every piece of mutable session state and never performs
//! I/O beyond the preference store. Callers feed it [`Event`]s one at a time and
//! execute the [`Effect`]s it returns. Each fetch or timer carries a [`Ticket`];
//! a result whose ticket is not the one currently awaited for its slot is
//! dropped, which keeps superseded or torn-down work from touching state.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::config::WatchConfig;
use crate::keyboard::{self, Direction, KeyPress, KeyboardNavigator};
use crate::prefs::PreferenceStore;
use crate::providers::ApiError;
use crate::resolver::{self, Resolution, ResolveInput};
use crate::route::{NavigateMode, Route};
use crate::storage::KeyValueStore;
use crate::switchboard::{self, Switchboard};
use crate::types::{
    AiringStatus, AnimeInfo, EmbedMirror, Episode, EpisodeList, Language, SourceType,
    WatchSelection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Independently owned async work. Starting work in a slot supersedes what ran there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSlot {
    Details,
    Catalog,
    Mirrors,
    NoEpisodesTimer,
}

impl TaskSlot {
    pub const ALL: [TaskSlot; 4] = [
        TaskSlot::Details,
        TaskSlot::Catalog,
        TaskSlot::Mirrors,
        TaskSlot::NoEpisodesTimer,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No watch view mounted.
    Idle,
    Resolving,
    Resolved,
    /// Terminal until the route changes.
    NoEpisodes,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsState {
    Loading,
    Loaded(AnimeInfo),
    Unavailable(String),
}

#[derive(Debug)]
pub enum Event {
    Mount(Route),
    RouteChanged(Route),
    DetailsLoaded {
        ticket: Ticket,
        result: Result<AnimeInfo, ApiError>,
    },
    CatalogLoaded {
        ticket: Ticket,
        result: Result<EpisodeList, ApiError>,
    },
    MirrorsLoaded {
        ticket: Ticket,
        result: Result<Vec<EmbedMirror>, ApiError>,
    },
    NoEpisodesTimeout {
        ticket: Ticket,
    },
    SelectEpisode(String),
    Key {
        press: KeyPress,
        at: Instant,
    },
    /// Primary player reached the end of the episode.
    EpisodeEnded,
    NextEpisode,
    PreviousEpisode,
    SetSourceType(SourceType),
    SetLanguage(Language),
    DownloadLink(String),
    Unmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchDetails { ticket: Ticket, anime_id: String },
    FetchCatalog { ticket: Ticket, title_slug: String },
    FetchMirrors { ticket: Ticket, episode_id: String },
    StartNoEpisodesTimer { ticket: Ticket, after: Duration },
    Cancel(TaskSlot),
    Navigate { path: String, mode: NavigateMode },
    StartCountdown { until_ms: i64 },
    StopCountdown,
}

/// What the watch page should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchView<'a> {
    Idle,
    Loading,
    /// Not yet aired: countdown and trailer instead of a player.
    Upcoming(&'a AnimeInfo),
    NoEpisodes,
    Failed(&'a str),
    Primary(&'a Episode),
    Embedded {
        episode: &'a Episode,
        mirror: Option<&'a EmbedMirror>,
    },
}

#[derive(Debug)]
struct SessionState {
    anime_id: String,
    route: Route,
    phase: Phase,
    details: DetailsState,
    details_attempts: u32,
    catalog: Vec<Episode>,
    /// Slug of the catalog loaded or being loaded.
    catalog_slug: Option<String>,
    catalog_loaded: bool,
    switchboard: Switchboard,
    current: Option<Episode>,
    embedded: Option<EmbedMirror>,
    download_link: Option<String>,
    /// Episode number to keep once the re-fetched catalog arrives.
    language_switch: Option<String>,
    keyboard: KeyboardNavigator,
    awaiting: HashMap<TaskSlot, Ticket>,
}

impl SessionState {
    fn idle(keyboard: KeyboardNavigator) -> Self {
        Self {
            anime_id: String::new(),
            route: Route::anime(""),
            phase: Phase::Idle,
            details: DetailsState::Loading,
            details_attempts: 0,
            catalog: Vec::new(),
            catalog_slug: None,
            catalog_loaded: false,
            switchboard: Switchboard::default(),
            current: None,
            embedded: None,
            download_link: None,
            language_switch: None,
            keyboard,
            awaiting: HashMap::new(),
        }
    }
}

pub struct WatchController<S> {
    prefs: PreferenceStore<S>,
    config: WatchConfig,
    next_ticket: u64,
    state: SessionState,
    effects: Vec<Effect>,
}

impl<S: KeyValueStore> WatchController<S> {
    pub fn new(prefs: PreferenceStore<S>, config: WatchConfig) -> Self {
        let keyboard = KeyboardNavigator::new(config.key_debounce());
        Self {
            prefs,
            config,
            next_ticket: 0,
            state: SessionState::idle(keyboard),
            effects: Vec::new(),
        }
    }

    pub fn prefs(&self) -> &PreferenceStore<S> {
        &self.prefs
    }

    pub fn phase(&self) -> &Phase {
        &self.state.phase
    }

    pub fn anime_id(&self) -> Option<&str> {
        (self.state.phase != Phase::Idle).then_some(self.state.anime_id.as_str())
    }

    pub fn route(&self) -> &Route {
        &self.state.route
    }

    pub fn details(&self) -> &DetailsState {
        &self.state.details
    }

    pub fn anime_info(&self) -> Option<&AnimeInfo> {
        match &self.state.details {
            DetailsState::Loaded(info) => Some(info),
            _ => None,
        }
    }

    pub fn catalog(&self) -> &[Episode] {
        &self.state.catalog
    }

    pub fn current_episode(&self) -> Option<&Episode> {
        self.state.current.as_ref()
    }

    pub fn source_type(&self) -> SourceType {
        self.state.switchboard.source_type()
    }

    pub fn language(&self) -> Language {
        self.state.switchboard.language()
    }

    pub fn selection(&self) -> WatchSelection {
        WatchSelection {
            current_episode: self.state.current.clone(),
            source_type: self.source_type(),
            language: self.language(),
            embedded_video: self.state.embedded.clone(),
            download_link: self.state.download_link.clone(),
        }
    }

    pub fn awaiting(&self, slot: TaskSlot) -> Option<Ticket> {
        self.state.awaiting.get(&slot).copied()
    }

    /// Nothing left to wait for before the next user action.
    pub fn is_settled(&self) -> bool {
        let waiting = |slot: TaskSlot| self.state.awaiting.contains_key(&slot);
        match self.state.phase {
            Phase::Idle => true,
            Phase::Resolving => false,
            Phase::NoEpisodes | Phase::Failed(_) => !waiting(TaskSlot::Details),
            Phase::Resolved => {
                !waiting(TaskSlot::Details)
                    && !waiting(TaskSlot::Mirrors)
                    && !waiting(TaskSlot::Catalog)
            }
        }
    }

    pub fn page_title(&self) -> String {
        match self.anime_info() {
            Some(info) if !info.title.preferred().is_empty() => info.page_title(),
            _ => "Anveshna.".to_string(),
        }
    }

    pub fn view(&self) -> WatchView<'_> {
        if let Some(info) = self.anime_info() {
            if info.status == AiringStatus::NotYetAired {
                return WatchView::Upcoming(info);
            }
        }
        match &self.state.phase {
            Phase::Idle => WatchView::Idle,
            Phase::NoEpisodes => WatchView::NoEpisodes,
            Phase::Failed(reason) => WatchView::Failed(reason),
            Phase::Resolving | Phase::Resolved => match &self.state.current {
                None => WatchView::Loading,
                Some(episode) if self.source_type().is_embedded() => WatchView::Embedded {
                    episode,
                    mirror: self.state.embedded.as_ref(),
                },
                Some(episode) => WatchView::Primary(episode),
            },
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Mount(route) => self.mount(route),
            Event::RouteChanged(route) => self.route_changed(route),
            Event::DetailsLoaded { ticket, result } => self.details_loaded(ticket, result),
            Event::CatalogLoaded { ticket, result } => self.catalog_loaded(ticket, result),
            Event::MirrorsLoaded { ticket, result } => self.mirrors_loaded(ticket, result),
            Event::NoEpisodesTimeout { ticket } => self.no_episodes_timeout(ticket),
            Event::SelectEpisode(id) => self.select_by_id(&id),
            Event::Key { press, at } => {
                if self.state.phase == Phase::Idle {
                    return Vec::new();
                }
                if let Some(direction) = self.state.keyboard.handle(&press, at) {
                    self.step(direction);
                }
            }
            Event::EpisodeEnded | Event::NextEpisode => self.step(Direction::Next),
            Event::PreviousEpisode => self.step(Direction::Previous),
            Event::SetSourceType(source) => self.set_source_type(source),
            Event::SetLanguage(language) => self.set_language(language),
            Event::DownloadLink(link) => {
                if self.state.current.is_some() {
                    self.state.download_link = Some(link);
                }
            }
            Event::Unmount => self.unmount(),
        }
        std::mem::take(&mut self.effects)
    }

    fn mount(&mut self, route: Route) {
        if self.state.phase != Phase::Idle {
            self.teardown();
        }
        let anime_id = route.anime_id.clone();
        info!(anime_id = %anime_id, route = %route, "Mounting watch session");

        let keyboard = KeyboardNavigator::new(self.config.key_debounce());
        self.state = SessionState::idle(keyboard);
        self.state.switchboard = Switchboard::restore(&self.prefs, &anime_id);
        self.state.anime_id = anime_id.clone();
        self.state.phase = Phase::Resolving;
        self.state.details_attempts = 1;

        let ticket = self.issue(TaskSlot::Details);
        self.effects.push(Effect::FetchDetails { ticket, anime_id });

        match route.title_slug.clone() {
            Some(slug) => self.request_catalog(slug),
            None => self.arm_no_episodes_timer(),
        }
        self.state.route = route;
    }

    fn unmount(&mut self) {
        if self.state.phase == Phase::Idle {
            return;
        }
        info!(anime_id = %self.state.anime_id, "Unmounting watch session");
        self.teardown();
        let keyboard = KeyboardNavigator::new(self.config.key_debounce());
        self.state = SessionState::idle(keyboard);
    }

    fn teardown(&mut self) {
        for slot in TaskSlot::ALL {
            if self.state.awaiting.remove(&slot).is_some() {
                self.effects.push(Effect::Cancel(slot));
            }
        }
        self.effects.push(Effect::StopCountdown);
    }

    fn route_changed(&mut self, route: Route) {
        if self.state.phase == Phase::Idle || route.anime_id != self.state.anime_id {
            self.mount(route);
            return;
        }

        let canonical = self
            .state
            .current
            .as_ref()
            .map(|ep| resolver::episode_route(&self.state.anime_id, ep));
        if canonical.as_ref() == Some(&route) {
            // Our own navigation coming back.
            self.state.route = route;
            return;
        }

        debug!(route = %route, "Route changed");
        self.state.route = route.clone();
        match route.title_slug {
            Some(slug) if self.state.catalog_slug.as_deref() != Some(slug.as_str()) => {
                self.state.phase = Phase::Resolving;
                self.request_catalog(slug);
            }
            Some(_) => self.try_resolve(),
            None if self.state.catalog_slug.is_some() => self.try_resolve(),
            None => {
                if let Some(slug) = self.details_slug() {
                    self.state.phase = Phase::Resolving;
                    self.request_catalog(slug);
                }
            }
        }
    }

    fn details_loaded(&mut self, ticket: Ticket, result: Result<AnimeInfo, ApiError>) {
        if !self.accept(TaskSlot::Details, ticket) {
            return;
        }
        let anime_id = self.state.anime_id.clone();
        match result {
            Ok(info) => {
                info!(anime_id = %anime_id, title = %info.title.preferred(), "Anime details loaded");
                let visited_at = Utc::now().timestamp_millis();
                if let Err(err) = self.prefs.record_visit(&anime_id, &info.title, visited_at) {
                    warn!(anime_id = %anime_id, error = %err, "Failed to record visit");
                }
                self.effects.push(Effect::StopCountdown);
                if let Some(until_ms) = info.next_airing_ms() {
                    self.effects.push(Effect::StartCountdown { until_ms });
                }
                self.state.details = DetailsState::Loaded(info);
            }
            Err(err) if self.state.details_attempts <= self.config.details_retries => {
                warn!(anime_id = %anime_id, error = %err, "Details fetch failed, retrying");
                self.state.details_attempts += 1;
                let ticket = self.issue(TaskSlot::Details);
                self.effects.push(Effect::FetchDetails { ticket, anime_id });
                return;
            }
            Err(err) => {
                warn!(anime_id = %anime_id, error = %err, "Details unavailable");
                self.state.details = DetailsState::Unavailable(err.to_string());
            }
        }
        if matches!(self.state.phase, Phase::NoEpisodes | Phase::Failed(_)) {
            return;
        }

        if self.state.catalog_slug.is_none() {
            match self.details_slug() {
                Some(slug) => self.request_catalog(slug),
                None => {
                    self.fail("no episode catalog is known for this anime".into());
                    return;
                }
            }
        }
        self.try_resolve();
    }

    fn catalog_loaded(&mut self, ticket: Ticket, result: Result<EpisodeList, ApiError>) {
        if !self.accept(TaskSlot::Catalog, ticket) {
            return;
        }
        self.cancel(TaskSlot::NoEpisodesTimer);
        self.state.catalog_loaded = true;
        match result {
            Ok(list) => {
                self.state.catalog = catalog::normalize(list.episodes);
                info!(
                    slug = self.state.catalog_slug.as_deref().unwrap_or(""),
                    episodes = self.state.catalog.len(),
                    "Episode catalog loaded"
                );
                if self.state.catalog.is_empty() {
                    self.no_episodes();
                } else {
                    self.try_resolve();
                }
            }
            Err(err) => {
                self.state.catalog.clear();
                self.fail(format!("could not load episodes: {err}"));
            }
        }
    }

    fn mirrors_loaded(&mut self, ticket: Ticket, result: Result<Vec<EmbedMirror>, ApiError>) {
        if !self.accept(TaskSlot::Mirrors, ticket) {
            return;
        }
        match result {
            Ok(mirrors) => {
                let source = self.source_type();
                self.state.embedded = switchboard::select_mirror(source, &mirrors).cloned();
                match &self.state.embedded {
                    Some(mirror) => debug!(source = %source, mirror = %mirror.name, "Mirror selected"),
                    None => warn!(source = %source, count = mirrors.len(), "No usable mirror"),
                }
            }
            Err(err) => {
                let episode = self.state.current.as_ref().map(|ep| ep.id.as_str());
                warn!(episode = ?episode, error = %err, "Failed to fetch embedded servers");
            }
        }
    }

    fn no_episodes_timeout(&mut self, ticket: Ticket) {
        if !self.accept(TaskSlot::NoEpisodesTimer, ticket) {
            return;
        }
        if self.state.catalog.is_empty() {
            self.cancel(TaskSlot::Catalog);
            self.no_episodes();
        }
    }

    fn select_by_id(&mut self, id: &str) {
        if !self.accepts_selection() {
            return;
        }
        match catalog::find_by_id(&self.state.catalog, id).cloned() {
            Some(episode) => self.apply_selection(episode),
            None => warn!(episode = id, "Ignoring selection outside the catalog"),
        }
    }

    fn step(&mut self, direction: Direction) {
        if !self.accepts_selection() {
            return;
        }
        let Some(current) = self.state.current.as_ref() else {
            return;
        };
        match keyboard::adjacent(&self.state.catalog, &current.id, direction).cloned() {
            Some(episode) => self.apply_selection(episode),
            None => debug!(?direction, "No episode in that direction"),
        }
    }

    fn set_source_type(&mut self, source: SourceType) {
        if self.state.phase == Phase::Idle {
            return;
        }
        let changed = self.state.switchboard.set_source_type(
            &mut self.prefs,
            &self.state.anime_id,
            source,
        );
        if !changed {
            return;
        }
        self.state.embedded = None;
        if source.is_embedded() {
            self.request_mirrors();
        } else {
            self.cancel(TaskSlot::Mirrors);
        }
    }

    fn set_language(&mut self, language: Language) {
        if self.state.phase == Phase::Idle {
            return;
        }
        let changed =
            self.state
                .switchboard
                .set_language(&mut self.prefs, &self.state.anime_id, language);
        if !changed {
            return;
        }
        self.state.language_switch = self
            .state
            .route
            .episode
            .clone()
            .or_else(|| self.state.current.as_ref().map(|ep| ep.number.clone()));

        let base = self
            .state
            .catalog_slug
            .clone()
            .or_else(|| self.state.route.title_slug.clone())
            .or_else(|| self.details_slug());
        if let Some(base) = base {
            info!(language = %language, keep = ?self.state.language_switch, "Language changed, reloading catalog");
            self.state.phase = Phase::Resolving;
            self.request_catalog(language.catalog_slug(&base));
        }
    }

    fn try_resolve(&mut self) {
        if !self.state.catalog_loaded
            || self.state.catalog.is_empty()
            || self.state.details == DetailsState::Loading
        {
            return;
        }
        let saved = self.prefs.last_watched(&self.state.anime_id);
        let resolution = resolver::resolve(ResolveInput {
            route_slug: self.state.route.title_slug.as_deref(),
            route_episode: self.state.route.episode.as_deref(),
            catalog: &self.state.catalog,
            last_watched: saved.as_ref(),
            language_switch: self.state.language_switch.as_deref(),
        });
        match resolution {
            Resolution::Select(episode) => {
                self.state.language_switch = None;
                self.apply_selection(episode);
            }
            Resolution::Redirect => {
                let bare = Route::anime(self.state.anime_id.clone());
                info!(route = %self.state.route, redirect = %bare, "Deep-linked episode not in catalog");
                self.effects.push(Effect::Navigate {
                    path: bare.path(),
                    mode: NavigateMode::Replace,
                });
            }
            Resolution::Unresolved => {}
        }
    }

    /// Makes `episode` current: persists it, rewrites the route and refreshes
    /// the embedded mirror when needed.
    fn apply_selection(&mut self, episode: Episode) {
        let anime_id = self.state.anime_id.clone();
        let changed =
            self.state.current.as_ref().map(|ep| ep.id.as_str()) != Some(episode.id.as_str());

        if let Err(err) = self.prefs.set_last_watched(&anime_id, &episode) {
            warn!(anime_id = %anime_id, error = %err, "Failed to save last watched episode");
        }
        if let Err(err) = self.prefs.mark_watched(&anime_id, &episode) {
            warn!(anime_id = %anime_id, error = %err, "Failed to save watched episodes");
        }

        let route = resolver::episode_route(&anime_id, &episode);
        info!(anime_id = %anime_id, episode = %episode.number, id = %episode.id, "Episode selected");
        self.effects.push(Effect::Navigate {
            path: route.path(),
            mode: NavigateMode::Replace,
        });
        self.state.route = route;
        self.state.current = Some(episode);
        self.state.phase = Phase::Resolved;

        if changed {
            self.state.download_link = None;
            self.state.embedded = None;
            if self.source_type().is_embedded() {
                self.request_mirrors();
            }
        }
    }

    fn request_catalog(&mut self, slug: String) {
        self.state.catalog.clear();
        self.state.catalog_loaded = false;
        self.state.catalog_slug = Some(slug.clone());
        let ticket = self.issue(TaskSlot::Catalog);
        self.effects.push(Effect::FetchCatalog {
            ticket,
            title_slug: slug,
        });
        self.arm_no_episodes_timer();
    }

    /// Starts the grace period, replacing any running one.
    fn arm_no_episodes_timer(&mut self) {
        let ticket = self.issue(TaskSlot::NoEpisodesTimer);
        self.effects.push(Effect::StartNoEpisodesTimer {
            ticket,
            after: self.config.no_episodes_grace(),
        });
    }

    fn request_mirrors(&mut self) {
        let Some(episode_id) = self
            .state
            .switchboard
            .mirror_lookup(self.state.current.as_ref())
            .map(str::to_string)
        else {
            return;
        };
        let ticket = self.issue(TaskSlot::Mirrors);
        self.effects.push(Effect::FetchMirrors { ticket, episode_id });
    }

    fn details_slug(&self) -> Option<String> {
        let info = self.anime_info()?;
        let gogo = info.provider_ids.gogo.as_deref().filter(|s| !s.is_empty())?;
        Some(self.language().catalog_slug(gogo))
    }

    fn accepts_selection(&self) -> bool {
        matches!(self.state.phase, Phase::Resolving | Phase::Resolved)
            && self.state.catalog_loaded
    }

    fn no_episodes(&mut self) {
        info!(anime_id = %self.state.anime_id, "No episodes available");
        self.state.phase = Phase::NoEpisodes;
    }

    fn fail(&mut self, reason: String) {
        warn!(anime_id = %self.state.anime_id, reason = %reason, "Watch session failed");
        self.cancel(TaskSlot::NoEpisodesTimer);
        self.state.phase = Phase::Failed(reason);
    }

    fn issue(&mut self, slot: TaskSlot) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.state.awaiting.insert(slot, ticket);
        ticket
    }

    fn cancel(&mut self, slot: TaskSlot) {
        if self.state.awaiting.remove(&slot).is_some() {
            self.effects.push(Effect::Cancel(slot));
        }
    }

    /// Consumes the awaited ticket for `slot`; `false` means the result is stale.
    fn accept(&mut self, slot: TaskSlot, ticket: Ticket) -> bool {
        if self.state.awaiting.get(&slot) == Some(&ticket) {
            self.state.awaiting.remove(&slot);
            true
        } else {
            debug!(?slot, %ticket, "Discarding stale result");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::LastWatched;
    use crate::storage::MemoryStore;
    use crate::types::{AnimeTitle, CoverImage, NextAiringEpisode, ProviderIds, RawEpisode};

    fn controller() -> WatchController<MemoryStore> {
        WatchController::new(PreferenceStore::new(MemoryStore::new()), WatchConfig::default())
    }

    fn info(id: &str, gogo: Option<&str>) -> AnimeInfo {
        AnimeInfo {
            id: id.into(),
            title: AnimeTitle {
                romaji: Some("Naruto".into()),
                english: Some("Naruto".into()),
            },
            status: AiringStatus::Finished,
            banner_image: None,
            cover_image: CoverImage::default(),
            next_airing_episode: None,
            trailer: None,
            id_mal: Some(20),
            provider_ids: ProviderIds {
                gogo: gogo.map(str::to_string),
            },
        }
    }

    /// Upstream order is newest first, so the normalized catalog runs 1..=count.
    fn upstream(slug: &str, count: u32) -> EpisodeList {
        EpisodeList {
            episodes: (1..=count)
                .rev()
                .map(|n| RawEpisode {
                    id: format!("{slug}-episode-{n}"),
                    number: n.to_string(),
                    title: Some(format!("Episode {n}")),
                    air_date: None,
                })
                .collect(),
        }
    }

    fn details_ticket(effects: &[Effect]) -> Ticket {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchDetails { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("details fetch issued")
    }

    fn catalog_fetch(effects: &[Effect]) -> (Ticket, String) {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchCatalog { ticket, title_slug } => Some((*ticket, title_slug.clone())),
                _ => None,
            })
            .expect("catalog fetch issued")
    }

    fn navigations(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Navigate { path, mode } => {
                    assert_eq!(*mode, NavigateMode::Replace);
                    Some(path.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Mounts `path` and answers both fetches successfully.
    fn resolved(
        ctl: &mut WatchController<MemoryStore>,
        path: &str,
        catalog: EpisodeList,
    ) -> Vec<Effect> {
        let route: Route = path.parse().unwrap();
        let anime_id = route.anime_id.clone();
        let mounted = ctl.handle(Event::Mount(route));
        let details = details_ticket(&mounted);
        let (catalog_ticket, _) = catalog_fetch(&mounted);
        let mut effects = ctl.handle(Event::DetailsLoaded {
            ticket: details,
            result: Ok(info(&anime_id, Some("naruto"))),
        });
        effects.extend(ctl.handle(Event::CatalogLoaded {
            ticket: catalog_ticket,
            result: Ok(catalog),
        }));
        effects
    }

    #[test]
    fn deep_link_resolves_without_redirect() {
        let mut ctl = controller();
        let effects = resolved(&mut ctl, "/watch/123/naruto/5", upstream("naruto", 12));

        assert_eq!(ctl.phase(), &Phase::Resolved);
        assert_eq!(ctl.current_episode().unwrap().id, "naruto-episode-5");
        assert_eq!(navigations(&effects), ["/watch/123/naruto/5"]);
        assert!(effects.contains(&Effect::Cancel(TaskSlot::NoEpisodesTimer)));

        let saved = ctl.prefs().last_watched("123").unwrap();
        assert_eq!(saved.number, "5");
        assert_eq!(ctl.prefs().watched_episodes("123").len(), 1);
        assert!(ctl.prefs().last_visited().contains_key("123"));
    }

    #[test]
    fn deep_link_miss_redirects_then_resolves_from_bare_route() {
        let mut ctl = controller();
        let effects = resolved(&mut ctl, "/watch/123/naruto/99", upstream("naruto", 3));

        assert_eq!(navigations(&effects), ["/watch/123"]);
        assert!(ctl.current_episode().is_none());

        let effects = ctl.handle(Event::RouteChanged(Route::anime("123")));
        assert_eq!(navigations(&effects), ["/watch/123/naruto/1"]);
        assert_eq!(ctl.phase(), &Phase::Resolved);

        // The canonical route echoing back changes nothing.
        let echo = ctl.handle(Event::RouteChanged("/watch/123/naruto/1".parse().unwrap()));
        assert!(echo.is_empty());
    }

    #[test]
    fn saved_episode_is_resumed_via_details_slug() {
        let mut store = MemoryStore::new();
        store
            .set(
                "last-watched-123",
                &serde_json::to_string(&LastWatched {
                    id: "naruto-episode-12".into(),
                    title: None,
                    number: "12".into(),
                })
                .unwrap(),
            )
            .unwrap();
        let mut ctl = WatchController::new(PreferenceStore::new(store), WatchConfig::default());

        let mounted = ctl.handle(Event::Mount(Route::anime("123")));
        assert!(!mounted.iter().any(|e| matches!(e, Effect::FetchCatalog { .. })));

        let effects = ctl.handle(Event::DetailsLoaded {
            ticket: details_ticket(&mounted),
            result: Ok(info("123", Some("naruto"))),
        });
        let (ticket, slug) = catalog_fetch(&effects);
        assert_eq!(slug, "naruto");

        let effects = ctl.handle(Event::CatalogLoaded {
            ticket,
            result: Ok(upstream("naruto", 20)),
        });
        assert_eq!(navigations(&effects), ["/watch/123/naruto/12"]);
    }

    #[test]
    fn unknown_saved_episode_falls_back_to_first() {
        let mut store = MemoryStore::new();
        store
            .set("last-watched-123", r#"{"id":"x","title":null,"number":"40"}"#)
            .unwrap();
        let mut ctl = WatchController::new(PreferenceStore::new(store), WatchConfig::default());
        resolved(&mut ctl, "/watch/123/naruto", upstream("naruto", 3));
        assert_eq!(ctl.current_episode().unwrap().number, "1");
    }

    #[test]
    fn results_for_a_previous_anime_are_discarded() {
        let mut ctl = controller();
        let mounted = ctl.handle(Event::Mount("/watch/123/naruto/1".parse().unwrap()));
        let (stale, _) = catalog_fetch(&mounted);

        let remount = ctl.handle(Event::RouteChanged("/watch/456/bleach/1".parse().unwrap()));
        assert!(remount.contains(&Effect::Cancel(TaskSlot::Catalog)));
        assert!(remount.contains(&Effect::StopCountdown));

        let effects = ctl.handle(Event::CatalogLoaded {
            ticket: stale,
            result: Ok(upstream("naruto", 3)),
        });
        assert!(effects.is_empty());
        assert!(ctl.catalog().is_empty());
        assert_eq!(ctl.anime_id(), Some("456"));
    }

    #[test]
    fn language_toggle_keeps_episode_number() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/5", upstream("naruto", 12));

        let effects = ctl.handle(Event::SetLanguage(Language::Dub));
        let (ticket, slug) = catalog_fetch(&effects);
        assert_eq!(slug, "naruto-dub");
        assert_eq!(ctl.phase(), &Phase::Resolving);
        assert_eq!(ctl.prefs().store().get("subOrDub-[123]").as_deref(), Some("dub"));

        let effects = ctl.handle(Event::CatalogLoaded {
            ticket,
            result: Ok(upstream("naruto-dub", 8)),
        });
        assert_eq!(ctl.current_episode().unwrap().id, "naruto-dub-episode-5");
        assert_eq!(navigations(&effects), ["/watch/123/naruto-dub/5"]);

        // Toggling back goes to the bare slug.
        let effects = ctl.handle(Event::SetLanguage(Language::Sub));
        assert_eq!(catalog_fetch(&effects).1, "naruto");
    }

    #[test]
    fn language_toggle_without_match_takes_last_entry() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/10", upstream("naruto", 12));
        let effects = ctl.handle(Event::SetLanguage(Language::Dub));
        let (ticket, _) = catalog_fetch(&effects);
        ctl.handle(Event::CatalogLoaded {
            ticket,
            result: Ok(upstream("naruto-dub", 4)),
        });
        assert_eq!(ctl.current_episode().unwrap().number, "4");
    }

    #[test]
    fn gogo_source_fetches_and_selects_second_mirror() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/2", upstream("naruto", 3));

        let effects = ctl.handle(Event::SetSourceType(SourceType::Gogo));
        let ticket = match effects.as_slice() {
            [Effect::FetchMirrors { ticket, episode_id }] => {
                assert_eq!(episode_id, "naruto-episode-2");
                *ticket
            }
            other => panic!("unexpected effects {other:?}"),
        };
        assert_eq!(ctl.prefs().store().get("source-[123]").as_deref(), Some("gogo"));

        let mirrors = ["A", "B", "C"]
            .iter()
            .map(|name| EmbedMirror {
                name: name.to_string(),
                url: format!("https://{name}.example"),
            })
            .collect();
        ctl.handle(Event::MirrorsLoaded {
            ticket,
            result: Ok(mirrors),
        });
        assert_eq!(ctl.selection().embedded_video.unwrap().name, "B");
        assert!(matches!(ctl.view(), WatchView::Embedded { mirror: Some(_), .. }));

        // Back to the primary player: no lookup, mirror dropped.
        let effects = ctl.handle(Event::SetSourceType(SourceType::Default));
        assert!(effects.is_empty());
        assert!(ctl.selection().embedded_video.is_none());
        assert!(matches!(ctl.view(), WatchView::Primary(_)));
    }

    #[test]
    fn switching_episode_refreshes_embedded_mirror() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/1", upstream("naruto", 3));
        ctl.handle(Event::SetSourceType(SourceType::Vidstreaming));
        let effects = ctl.handle(Event::NextEpisode);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::FetchMirrors { episode_id, .. } if episode_id == "naruto-episode-2"
        )));
    }

    #[test]
    fn keyboard_shortcut_is_debounced() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/1", upstream("naruto", 5));
        let start = Instant::now();

        ctl.handle(Event::Key {
            press: KeyPress::shifted("N"),
            at: start,
        });
        assert_eq!(ctl.current_episode().unwrap().number, "2");

        let effects = ctl.handle(Event::Key {
            press: KeyPress::shifted("n"),
            at: start + Duration::from_millis(150),
        });
        assert!(effects.is_empty());
        assert_eq!(ctl.current_episode().unwrap().number, "2");

        // The window is measured from the last accepted press and closes at 200 ms.
        ctl.handle(Event::Key {
            press: KeyPress::shifted("N"),
            at: start + Duration::from_millis(200),
        });
        assert_eq!(ctl.current_episode().unwrap().number, "3");

        let effects = ctl.handle(Event::Key {
            press: KeyPress::shifted("N"),
            at: start + Duration::from_millis(250),
        });
        assert!(effects.is_empty());

        ctl.handle(Event::Key {
            press: KeyPress::shifted("P"),
            at: start + Duration::from_millis(450),
        });
        assert_eq!(ctl.current_episode().unwrap().number, "2");
    }

    #[test]
    fn episode_end_advances_and_stops_at_last() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/2", upstream("naruto", 3));
        ctl.handle(Event::DownloadLink("https://dl.example/2.mp4".into()));

        let effects = ctl.handle(Event::EpisodeEnded);
        assert_eq!(navigations(&effects), ["/watch/123/naruto/3"]);
        assert!(ctl.selection().download_link.is_none());

        let effects = ctl.handle(Event::EpisodeEnded);
        assert!(effects.is_empty());
        assert_eq!(ctl.current_episode().unwrap().number, "3");
        assert_eq!(ctl.prefs().watched_episodes("123").len(), 2);
    }

    #[test]
    fn selecting_outside_catalog_is_ignored() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/1", upstream("naruto", 3));
        assert!(ctl.handle(Event::SelectEpisode("bleach-episode-1".into())).is_empty());
        let effects = ctl.handle(Event::SelectEpisode("naruto-episode-3".into()));
        assert_eq!(navigations(&effects), ["/watch/123/naruto/3"]);
    }

    #[test]
    fn empty_catalog_reports_no_episodes_immediately() {
        let mut ctl = controller();
        resolved(&mut ctl, "/watch/123/naruto/1", EpisodeList::default());
        assert_eq!(ctl.phase(), &Phase::NoEpisodes);
        assert_eq!(ctl.view(), WatchView::NoEpisodes);
    }

    #[test]
    fn grace_timeout_reports_no_episodes_and_drops_late_catalog() {
        let mut ctl = controller();
        let mounted = ctl.handle(Event::Mount("/watch/123/naruto/1".parse().unwrap()));
        let (catalog_ticket, _) = catalog_fetch(&mounted);
        let timer = mounted
            .iter()
            .find_map(|e| match e {
                Effect::StartNoEpisodesTimer { ticket, after } => {
                    assert_eq!(*after, Duration::from_secs(10));
                    Some(*ticket)
                }
                _ => None,
            })
            .unwrap();

        let effects = ctl.handle(Event::NoEpisodesTimeout { ticket: timer });
        assert!(effects.contains(&Effect::Cancel(TaskSlot::Catalog)));
        assert_eq!(ctl.phase(), &Phase::NoEpisodes);

        ctl.handle(Event::CatalogLoaded {
            ticket: catalog_ticket,
            result: Ok(upstream("naruto", 3)),
        });
        assert_eq!(ctl.phase(), &Phase::NoEpisodes);
        assert!(ctl.catalog().is_empty());
    }

    #[test]
    fn bare_route_reports_no_episodes_when_details_are_slow() {
        let mut ctl = controller();
        let mounted = ctl.handle(Event::Mount(Route::anime("123")));
        assert!(!mounted.iter().any(|e| matches!(e, Effect::FetchCatalog { .. })));
        let timer = mounted
            .iter()
            .find_map(|e| match e {
                Effect::StartNoEpisodesTimer { ticket, after } => {
                    assert_eq!(*after, Duration::from_secs(10));
                    Some(*ticket)
                }
                _ => None,
            })
            .unwrap();

        ctl.handle(Event::NoEpisodesTimeout { ticket: timer });
        assert_eq!(ctl.view(), WatchView::NoEpisodes);
        assert!(!ctl.is_settled());

        // Details still land, but no catalog is requested any more.
        let effects = ctl.handle(Event::DetailsLoaded {
            ticket: details_ticket(&mounted),
            result: Ok(info("123", Some("naruto"))),
        });
        assert!(!effects.iter().any(|e| matches!(e, Effect::FetchCatalog { .. })));
        assert!(navigations(&effects).is_empty());
        assert_eq!(ctl.phase(), &Phase::NoEpisodes);
        assert_eq!(ctl.page_title(), "Anveshna. | Naruto");
        assert!(ctl.is_settled());
    }

    #[test]
    fn details_are_retried_once_then_reported_unavailable() {
        let mut ctl = controller();
        let mounted = ctl.handle(Event::Mount("/watch/123/naruto/2".parse().unwrap()));
        let (catalog_ticket, _) = catalog_fetch(&mounted);
        ctl.handle(Event::CatalogLoaded {
            ticket: catalog_ticket,
            result: Ok(upstream("naruto", 3)),
        });
        // Resolution waits for details to settle.
        assert!(ctl.current_episode().is_none());

        let retry = ctl.handle(Event::DetailsLoaded {
            ticket: details_ticket(&mounted),
            result: Err(ApiError::Other("timeout".into())),
        });
        let retry_ticket = details_ticket(&retry);
        assert!(matches!(
            retry.as_slice(),
            [Effect::FetchDetails { anime_id, .. }] if anime_id == "123"
        ));

        let effects = ctl.handle(Event::DetailsLoaded {
            ticket: retry_ticket,
            result: Err(ApiError::Other("timeout".into())),
        });
        assert!(matches!(ctl.details(), DetailsState::Unavailable(_)));
        assert_eq!(navigations(&effects), ["/watch/123/naruto/2"]);
        assert_eq!(ctl.page_title(), "Anveshna.");
    }

    #[test]
    fn no_slug_and_no_details_fails() {
        let mut ctl = WatchController::new(
            PreferenceStore::new(MemoryStore::new()),
            WatchConfig {
                details_retries: 0,
                ..WatchConfig::default()
            },
        );
        let mounted = ctl.handle(Event::Mount(Route::anime("123")));
        ctl.handle(Event::DetailsLoaded {
            ticket: details_ticket(&mounted),
            result: Err(ApiError::Other("boom".into())),
        });
        assert!(matches!(ctl.phase(), Phase::Failed(_)));
        assert!(ctl.is_settled());
    }

    #[test]
    fn catalog_error_fails_the_view() {
        let mut ctl = controller();
        let mounted = ctl.handle(Event::Mount("/watch/123/naruto/2".parse().unwrap()));
        let (ticket, _) = catalog_fetch(&mounted);
        ctl.handle(Event::CatalogLoaded {
            ticket,
            result: Err(ApiError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
        });
        assert!(matches!(ctl.view(), WatchView::Failed(reason) if reason.contains("502")));
    }

    #[test]
    fn upcoming_anime_starts_countdown() {
        let mut ctl = controller();
        let mounted = ctl.handle(Event::Mount("/watch/7/new-show".parse().unwrap()));
        let mut upcoming = info("7", Some("new-show"));
        upcoming.status = AiringStatus::NotYetAired;
        upcoming.next_airing_episode = Some(NextAiringEpisode {
            episode: 1,
            time_until_airing: 90,
        });
        let effects = ctl.handle(Event::DetailsLoaded {
            ticket: details_ticket(&mounted),
            result: Ok(upcoming),
        });
        assert!(effects.contains(&Effect::StartCountdown { until_ms: 90_000 }));
        assert!(matches!(ctl.view(), WatchView::Upcoming(_)));
    }

    #[test]
    fn unmount_cancels_everything_and_ignores_late_results() {
        let mut ctl = controller();
        let mounted = ctl.handle(Event::Mount("/watch/123/naruto/1".parse().unwrap()));
        let effects = ctl.handle(Event::Unmount);
        assert!(effects.contains(&Effect::Cancel(TaskSlot::Details)));
        assert!(effects.contains(&Effect::Cancel(TaskSlot::Catalog)));
        assert!(effects.contains(&Effect::Cancel(TaskSlot::NoEpisodesTimer)));
        assert!(effects.contains(&Effect::StopCountdown));
        assert_eq!(ctl.phase(), &Phase::Idle);

        let late = ctl.handle(Event::DetailsLoaded {
            ticket: details_ticket(&mounted),
            result: Ok(info("123", Some("naruto"))),
        });
        assert!(late.is_empty());
        assert!(ctl.prefs().last_visited().is_empty());
    }
}
