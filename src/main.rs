use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dialoguer::{FuzzySelect, Input, Select};
use tokio::task::LocalSet;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use anveshna::config::AppConfig;
use anveshna::controller::{Event, WatchController, WatchView};
use anveshna::history::{self, theme};
use anveshna::keyboard::KeyPress;
use anveshna::player;
use anveshna::prefs::PreferenceStore;
use anveshna::providers::http::HttpApi;
use anveshna::route::{Route, Router};
use anveshna::runtime::{AiringPanel, WatchRuntime};
use anveshna::storage::FileStore;
use anveshna::types::{EmbedMirror, Language, SourceType};

#[derive(Debug, Parser)]
#[command(
    name = "anveshna",
    about = "Watch anime episodes with resume and source switching.",
    version
)]
struct Cli {
    #[arg(value_name = "ANIME_ID")]
    anime_id: Option<String>,

    #[arg(value_name = "TITLE")]
    title: Option<String>,

    #[arg(value_name = "EPISODE")]
    episode: Option<String>,

    #[arg(long)]
    dub: bool,

    /// default, vidstreaming or gogo
    #[arg(long, value_name = "SOURCE")]
    source: Option<SourceType>,

    #[arg(long)]
    history: bool,

    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Play,
    Next,
    Previous,
    Pick,
    ToggleLanguage,
    ChangeSource,
    Key,
    Quit,
}

impl Action {
    const ALL: [Action; 8] = [
        Action::Play,
        Action::Next,
        Action::Previous,
        Action::Pick,
        Action::ToggleLanguage,
        Action::ChangeSource,
        Action::Key,
        Action::Quit,
    ];

    fn label(self) -> &'static str {
        match self {
            Action::Play => "Play",
            Action::Next => "Next episode",
            Action::Previous => "Previous episode",
            Action::Pick => "Pick episode",
            Action::ToggleLanguage => "Toggle sub/dub",
            Action::ChangeSource => "Change source",
            Action::Key => "Type a key",
            Action::Quit => "Quit",
        }
    }
}

type Runtime = WatchRuntime<HttpApi, FileStore>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("anveshna=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = LocalSet::new().run_until(run()).await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let store_path = config.storage_path()?;
    let store = FileStore::open(&store_path)
        .with_context(|| format!("failed to open store {}", store_path.display()))?;
    let mut prefs = PreferenceStore::new(store);

    let route = if cli.history {
        let entries = history::continue_watching(&prefs);
        match history::select_entry(&entries)? {
            Some(entry) => entry.route(),
            None => return Ok(()),
        }
    } else {
        let Some(anime_id) = cli.anime_id.clone() else {
            println!(
                "No anime id provided. Use `anveshna <ID> [TITLE] [EPISODE]` or `anveshna --history`."
            );
            return Ok(());
        };
        Route {
            anime_id,
            title_slug: cli.title.clone(),
            episode: cli.title.as_ref().and(cli.episode.clone()),
        }
    };

    if cli.dub {
        prefs.set_language(&route.anime_id, Language::Dub)?;
    }
    if let Some(source) = cli.source {
        prefs.set_source_type(&route.anime_id, source)?;
    }

    let api = HttpApi::new(&config.api).context("failed to build API client")?;
    let controller = WatchController::new(prefs, config.watch.clone());
    let mut runtime = WatchRuntime::new(api, controller, Router::new("/"));
    runtime.open(&route.path())?;

    let result = watch_loop(&mut runtime, &config).await;
    runtime.close();
    result
}

async fn watch_loop(runtime: &mut Runtime, config: &AppConfig) -> Result<()> {
    loop {
        runtime.settle().await;
        print_status(runtime);

        let labels: Vec<&str> = Action::ALL.iter().map(|a| a.label()).collect();
        let selection = Select::with_theme(&theme())
            .with_prompt("What next? (Esc to quit)")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        let Some(idx) = selection else {
            return Ok(());
        };

        match Action::ALL[idx] {
            Action::Play => play(runtime, config).await,
            Action::Next => runtime.dispatch(Event::NextEpisode),
            Action::Previous => runtime.dispatch(Event::PreviousEpisode),
            Action::Pick => {
                if let Some(id) = pick_episode(runtime)? {
                    runtime.dispatch(Event::SelectEpisode(id));
                }
            }
            Action::ToggleLanguage => {
                let language = runtime.controller().language().toggled();
                runtime.dispatch(Event::SetLanguage(language));
            }
            Action::ChangeSource => {
                if let Some(source) = pick_source(runtime)? {
                    runtime.dispatch(Event::SetSourceType(source));
                }
            }
            Action::Key => {
                let typed: String = Input::with_theme(&theme())
                    .with_prompt("Key (N = next, P = previous)")
                    .interact_text()?;
                if let Some(ch) = typed.chars().next() {
                    runtime.dispatch(Event::Key {
                        press: KeyPress::typed(ch),
                        at: Instant::now(),
                    });
                }
            }
            Action::Quit => return Ok(()),
        }
    }
}

fn print_status(runtime: &Runtime) {
    let ctl = runtime.controller();
    println!();
    println!("{}", ctl.page_title());
    if let Some(backdrop) = ctl.anime_info().and_then(|info| info.backdrop()) {
        println!("  {backdrop}");
    }
    println!(
        "  [{} \u{00b7} {}] {}",
        ctl.language().label(),
        ctl.source_type().label(),
        runtime.router().current()
    );

    match ctl.view() {
        WatchView::Idle => println!("Nothing is open."),
        WatchView::Loading => println!("Loading..."),
        WatchView::Upcoming(_) => {}
        WatchView::NoEpisodes => println!("No episodes found."),
        WatchView::Failed(reason) => println!("Could not load this anime: {reason}"),
        WatchView::Primary(episode) => println!(
            "Episode {}{}",
            episode.number,
            episode.title.as_deref().map(|t| format!(": {t}")).unwrap_or_default()
        ),
        WatchView::Embedded { episode, mirror } => println!(
            "Episode {} via {}",
            episode.number,
            mirror.map(|m| m.name.as_str()).unwrap_or("no server yet")
        ),
    }

    match runtime.airing_panel() {
        Some(AiringPanel::Upcoming {
            countdown,
            trailer_id,
        }) => {
            println!("Not yet aired. Airs in: {countdown}");
            if let Some(id) = trailer_id {
                println!("Trailer: https://www.youtube.com/watch?v={id}");
            }
        }
        Some(AiringPanel::Releasing {
            next_episode,
            countdown,
        }) => println!("Episode {next_episode} airs in {countdown}"),
        None => {}
    }
}

enum PlayTarget {
    Stream { url: String, episode: String },
    Browser(EmbedMirror),
    Nothing,
}

async fn play(runtime: &mut Runtime, config: &AppConfig) {
    let title = runtime.controller().page_title();
    let target = match runtime.controller().view() {
        WatchView::Primary(episode) => PlayTarget::Stream {
            url: player::stream_url(&config.player.stream_url, &episode.id),
            episode: episode.number.clone(),
        },
        WatchView::Embedded {
            mirror: Some(mirror),
            ..
        } => PlayTarget::Browser(mirror.clone()),
        _ => PlayTarget::Nothing,
    };

    match target {
        PlayTarget::Stream { url, episode } => {
            match player::launch_player(&config.player_command(), &url, &title, &episode).await {
                Ok(()) => runtime.dispatch(Event::EpisodeEnded),
                Err(err) => println!("Playback failed: {err}"),
            }
        }
        PlayTarget::Browser(mirror) => {
            if let Err(err) = player::open_embedded(&mirror) {
                println!("Could not open {}: {err}", mirror.url);
            }
        }
        PlayTarget::Nothing => println!("Nothing to play yet."),
    }
}

fn pick_episode(runtime: &Runtime) -> Result<Option<String>> {
    let ctl = runtime.controller();
    let catalog = ctl.catalog();
    if catalog.is_empty() {
        println!("No episodes loaded.");
        return Ok(None);
    }
    let watched = ctl
        .anime_id()
        .map(|id| ctl.prefs().watched_episodes(id))
        .unwrap_or_default();
    let items: Vec<String> = catalog
        .iter()
        .map(|ep| {
            let mark = if watched.iter().any(|w| w.id == ep.id) {
                "\u{2713}"
            } else {
                " "
            };
            match &ep.title {
                Some(title) => format!("{mark} {} \u{00b7} {title}", ep.number),
                None => format!("{mark} {}", ep.number),
            }
        })
        .collect();
    let current = ctl
        .current_episode()
        .and_then(|cur| catalog.iter().position(|ep| ep.id == cur.id))
        .unwrap_or(0);
    let selection = FuzzySelect::with_theme(&theme())
        .with_prompt("Episode (type to filter, Esc to cancel)")
        .items(&items)
        .default(current)
        .interact_opt()?;
    Ok(selection.map(|idx| catalog[idx].id.clone()))
}

fn pick_source(runtime: &Runtime) -> Result<Option<SourceType>> {
    let labels: Vec<&str> = SourceType::ALL.iter().map(|s| s.label()).collect();
    let current = SourceType::ALL
        .iter()
        .position(|s| *s == runtime.controller().source_type())
        .ok_or_else(|| anyhow!("unknown source type"))?;
    let selection = Select::with_theme(&theme())
        .with_prompt("Source")
        .items(&labels)
        .default(current)
        .interact_opt()?;
    Ok(selection.map(|idx| SourceType::ALL[idx]))
}
