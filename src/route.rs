use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::Error;

/// `/watch/:animeId[/:animeTitle[/:episodeNumber]]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub anime_id: String,
    pub title_slug: Option<String>,
    pub episode: Option<String>,
}

impl Route {
    pub fn anime(anime_id: impl Into<String>) -> Self {
        Self {
            anime_id: anime_id.into(),
            title_slug: None,
            episode: None,
        }
    }

    pub fn episode(
        anime_id: impl Into<String>,
        slug: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            anime_id: anime_id.into(),
            title_slug: Some(slug.into()),
            episode: Some(number.into()),
        }
    }

    pub fn path(&self) -> String {
        let mut path = format!("/watch/{}", self.anime_id);
        if let Some(slug) = &self.title_slug {
            path.push('/');
            path.push_str(slug);
            if let Some(episode) = &self.episode {
                path.push('/');
                path.push_str(episode);
            }
        }
        path
    }
}

impl FromStr for Route {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let mut segments = path
            .trim_matches('/')
            .split('/')
            .filter(|seg| !seg.is_empty());
        if segments.next() != Some("watch") {
            return Err(Error::Route(path.to_string()));
        }
        let anime_id = segments
            .next()
            .ok_or_else(|| Error::Route(path.to_string()))?
            .to_string();
        let title_slug = segments.next().map(str::to_string);
        let episode = segments.next().map(str::to_string);
        if segments.next().is_some() {
            return Err(Error::Route(path.to_string()));
        }
        Ok(Self {
            anime_id,
            title_slug,
            episode,
        })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateMode {
    Push,
    Replace,
}

/// In-memory browser history.
#[derive(Debug, Clone)]
pub struct Router {
    entries: Vec<String>,
}

impl Router {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: vec![initial.into()],
        }
    }

    pub fn current(&self) -> &str {
        self.entries.last().map(String::as_str).unwrap_or("/")
    }

    pub fn navigate(&mut self, path: impl Into<String>, mode: NavigateMode) {
        let path = path.into();
        debug!(path = %path, ?mode, "Navigate");
        match mode {
            NavigateMode::Push => self.entries.push(path),
            NavigateMode::Replace => match self.entries.last_mut() {
                Some(last) => *last = path,
                None => self.entries.push(path),
            },
        }
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}
