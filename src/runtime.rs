//! Single-threaded driver that executes controller effects.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_local};
use tracing::{debug, warn};

use crate::controller::{Effect, Event, TaskSlot, WatchController};
use crate::countdown::{self, CountdownHandle};
use crate::error::Result;
use crate::providers::AnimeApi;
use crate::route::{NavigateMode, Route, Router};
use crate::storage::KeyValueStore;
use crate::types::AiringStatus;

/// Countdown text shown once the airing time has passed.
pub const UNKNOWN_AIRING: &str = "Unknown";

/// Airing information shown next to (or instead of) the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiringPanel {
    /// Not aired yet: the page shows this in place of the player.
    Upcoming {
        countdown: String,
        trailer_id: Option<String>,
    },
    /// Still airing: shown in the source panel under the player.
    Releasing { next_episode: u32, countdown: String },
}

/// Runs one watch view. Must be driven from inside a [`tokio::task::LocalSet`]:
/// every fetch and timer is a local task, so all state changes happen on this
/// thread between awaits.
pub struct WatchRuntime<A, S> {
    api: Rc<A>,
    controller: WatchController<S>,
    router: Router,
    queue: VecDeque<Event>,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    tasks: HashMap<TaskSlot, JoinHandle<()>>,
    countdown: Option<CountdownHandle>,
}

impl<A, S> WatchRuntime<A, S>
where
    A: AnimeApi + 'static,
    S: KeyValueStore,
{
    pub fn new(api: A, controller: WatchController<S>, router: Router) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api: Rc::new(api),
            controller,
            router,
            queue: VecDeque::new(),
            tx,
            rx,
            tasks: HashMap::new(),
            countdown: None,
        }
    }

    pub fn controller(&self) -> &WatchController<S> {
        &self.controller
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Latest countdown text, if the anime has a scheduled episode.
    pub fn countdown(&self) -> Option<String> {
        self.countdown.as_ref().map(CountdownHandle::current)
    }

    pub fn airing_panel(&self) -> Option<AiringPanel> {
        let info = self.controller.anime_info()?;
        match info.status {
            AiringStatus::NotYetAired => {
                let countdown = self
                    .countdown()
                    .filter(|text| text != countdown::AIRED)
                    .unwrap_or_else(|| UNKNOWN_AIRING.to_string());
                Some(AiringPanel::Upcoming {
                    countdown,
                    trailer_id: info.trailer_id().map(str::to_string),
                })
            }
            AiringStatus::Releasing => {
                let next = info.next_airing_episode.as_ref()?;
                Some(AiringPanel::Releasing {
                    next_episode: next.episode,
                    countdown: self.countdown()?,
                })
            }
            _ => None,
        }
    }

    /// Pushes `path` onto the history and mounts or re-routes the session.
    pub fn open(&mut self, path: &str) -> Result<()> {
        let route: Route = path.parse()?;
        self.router.navigate(route.path(), NavigateMode::Push);
        let event = if self.controller.anime_id().is_some() {
            Event::RouteChanged(route)
        } else {
            Event::Mount(route)
        };
        self.dispatch(event);
        Ok(())
    }

    /// Handles `event` and everything it synchronously leads to.
    pub fn dispatch(&mut self, event: Event) {
        self.queue.push_back(event);
        while let Some(event) = self.queue.pop_front() {
            for effect in self.controller.handle(event) {
                self.apply(effect);
            }
        }
    }

    /// Waits for the next fetch or timer result and handles it.
    pub async fn next(&mut self) {
        if let Some(event) = self.rx.recv().await {
            self.dispatch(event);
        }
    }

    /// Runs until the controller has nothing left to wait for.
    pub async fn settle(&mut self) {
        while !self.controller.is_settled() {
            self.next().await;
        }
    }

    pub fn close(&mut self) {
        self.dispatch(Event::Unmount);
        self.abort_all();
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::FetchDetails { ticket, anime_id } => {
                let api = Rc::clone(&self.api);
                let tx = self.tx.clone();
                self.spawn(TaskSlot::Details, async move {
                    let result = api.fetch_anime_details(&anime_id).await;
                    let _ = tx.send(Event::DetailsLoaded { ticket, result });
                });
            }
            Effect::FetchCatalog { ticket, title_slug } => {
                let api = Rc::clone(&self.api);
                let tx = self.tx.clone();
                self.spawn(TaskSlot::Catalog, async move {
                    let result = api.fetch_anime_episodes(&title_slug).await;
                    let _ = tx.send(Event::CatalogLoaded { ticket, result });
                });
            }
            Effect::FetchMirrors { ticket, episode_id } => {
                let api = Rc::clone(&self.api);
                let tx = self.tx.clone();
                self.spawn(TaskSlot::Mirrors, async move {
                    let result = api.fetch_embedded_episodes(&episode_id).await;
                    let _ = tx.send(Event::MirrorsLoaded { ticket, result });
                });
            }
            Effect::StartNoEpisodesTimer { ticket, after } => {
                let tx = self.tx.clone();
                self.spawn(TaskSlot::NoEpisodesTimer, async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(Event::NoEpisodesTimeout { ticket });
                });
            }
            Effect::Cancel(slot) => {
                if let Some(task) = self.tasks.remove(&slot) {
                    debug!(?slot, "Cancelling task");
                    task.abort();
                }
            }
            Effect::Navigate { path, mode } => {
                self.router.navigate(path.clone(), mode);
                match path.parse::<Route>() {
                    Ok(route) => self.queue.push_back(Event::RouteChanged(route)),
                    Err(err) => warn!(path = %path, error = %err, "Navigated outside the watch view"),
                }
            }
            Effect::StartCountdown { until_ms } => {
                self.countdown = countdown::start_countdown(Some(until_ms));
            }
            Effect::StopCountdown => {
                if let Some(countdown) = self.countdown.take() {
                    countdown.stop();
                }
            }
        }
    }

    fn spawn<F>(&mut self, slot: TaskSlot, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        if let Some(previous) = self.tasks.insert(slot, spawn_local(task)) {
            previous.abort();
        }
    }

    fn abort_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
        if let Some(countdown) = self.countdown.take() {
            countdown.stop();
        }
    }
}

impl<A, S> Drop for WatchRuntime<A, S> {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
