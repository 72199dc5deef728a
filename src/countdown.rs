//! Time remaining until the next episode airs.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

pub const AIRED: &str = "Airing now or aired";
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Remaining {
    pub fn from_duration(distance: Duration) -> Self {
        let secs = distance.as_secs();
        Self {
            days: secs / 86_400,
            hours: (secs % 86_400) / 3_600,
            minutes: (secs % 3_600) / 60,
            seconds: secs % 60,
        }
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} days, {} hours, {} minutes, {} seconds",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Text for `target` as seen at `now`.
pub fn countdown_text(target: Instant, now: Instant) -> String {
    match target.checked_duration_since(now) {
        Some(distance) => Remaining::from_duration(distance).to_string(),
        None => AIRED.to_string(),
    }
}

/// A running countdown. Dropping the handle cancels the ticking task.
#[derive(Debug)]
pub struct CountdownHandle {
    rx: watch::Receiver<String>,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn current(&self) -> String {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts ticking once per second towards `now + until_ms`. `None` does no work.
/// The first value is available immediately; once the target passes, the value
/// becomes [`AIRED`] and the task ends.
pub fn start_countdown(until_ms: Option<i64>) -> Option<CountdownHandle> {
    let Ok(until_ms) = u64::try_from(until_ms?) else {
        let (_, rx) = watch::channel(AIRED.to_string());
        let task = tokio::spawn(async {});
        return Some(CountdownHandle { rx, task });
    };

    let start = Instant::now();
    let target = start + Duration::from_millis(until_ms);
    let (tx, rx) = watch::channel(countdown_text(target, start));

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(start + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            let now = ticker.tick().await;
            let text = countdown_text(target, now);
            let aired = text == AIRED;
            if tx.send(text).is_err() {
                return;
            }
            if aired {
                debug!("Countdown reached airing time");
                return;
            }
        }
    });

    Some(CountdownHandle { rx, task })
}
