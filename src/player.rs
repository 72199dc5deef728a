use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::EmbedMirror;

pub const EPISODE_ID_PLACEHOLDER: &str = "{episode_id}";

/// Stream location for the primary player.
pub fn stream_url(template: &str, episode_id: &str) -> String {
    template.replace(EPISODE_ID_PLACEHOLDER, episode_id)
}

/// Splits a configured player command like `mpv --fs` into program and arguments.
pub fn player_argv(command: &str) -> Result<Vec<String>> {
    let argv = shlex::split(command)
        .ok_or_else(|| Error::Player(format!("cannot parse player command '{command}'")))?;
    if argv.is_empty() {
        return Err(Error::Player("player command is empty".into()));
    }
    Ok(argv)
}

/// Plays `url` and waits for the player to exit. `Ok` means the episode ran to
/// the end and the caller should report it as ended.
pub async fn launch_player(command: &str, url: &str, title: &str, episode: &str) -> Result<()> {
    let argv = player_argv(command)?;
    let (program, extra) = argv
        .split_first()
        .ok_or_else(|| Error::Player("player command is empty".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(extra);
    cmd.arg("--quiet");
    cmd.arg("--terminal=no");
    cmd.arg(format!("--force-media-title={title} - Episode {episode}"));
    cmd.arg(url);
    debug!(player = %program, url, "Launching player");

    let status = match cmd.status().await {
        Ok(status) => status,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::Player(format!(
                "player '{program}' not found. Install mpv or set {} to a valid command.",
                crate::config::PLAYER_ENV_KEY
            )));
        }
        Err(err) => return Err(err.into()),
    };

    if !status.success() {
        return Err(Error::Player(format!("player exited with status {status}")));
    }
    info!(episode, "Player finished");
    Ok(())
}

/// Embedded sources play in the browser.
pub fn open_embedded(mirror: &EmbedMirror) -> Result<()> {
    info!(mirror = %mirror.name, url = %mirror.url, "Opening embedded player");
    open::that(&mirror.url)?;
    Ok(())
}
