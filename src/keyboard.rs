//! Shift+N / Shift+P episode shortcuts.

use std::time::Duration;

use tokio::time::Instant;

use crate::catalog;
use crate::types::Episode;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Element that had focus when the key was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    Document,
    TextInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub shift: bool,
    pub target: FocusTarget,
}

impl KeyPress {
    pub fn shifted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            shift: true,
            target: FocusTarget::Document,
        }
    }

    /// A single typed character; uppercase implies Shift.
    pub fn typed(ch: char) -> Self {
        Self {
            key: ch.to_string(),
            shift: ch.is_uppercase(),
            target: FocusTarget::Document,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, Clone)]
pub struct KeyboardNavigator {
    debounce: Duration,
    last_accepted: Option<Instant>,
}

impl Default for KeyboardNavigator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl KeyboardNavigator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_accepted: None,
        }
    }

    /// Direction for an accepted shortcut. Presses inside the debounce window
    /// of the last accepted one are dropped.
    pub fn handle(&mut self, press: &KeyPress, now: Instant) -> Option<Direction> {
        if press.target == FocusTarget::TextInput || !press.shift {
            return None;
        }
        let direction = match press.key.to_uppercase().as_str() {
            "N" => Direction::Next,
            "P" => Direction::Previous,
            _ => return None,
        };
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.debounce {
                return None;
            }
        }
        self.last_accepted = Some(now);
        Some(direction)
    }
}

/// Neighbour of `current_id` in catalog order; `None` at either end or when
/// the id is not in the catalog.
pub fn adjacent<'a>(
    episodes: &'a [Episode],
    current_id: &str,
    direction: Direction,
) -> Option<&'a Episode> {
    let idx = catalog::position_of(episodes, current_id)?;
    match direction {
        Direction::Next => episodes.get(idx + 1),
        Direction::Previous => idx.checked_sub(1).and_then(|prev| episodes.get(prev)),
    }
}
