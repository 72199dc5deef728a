use thiserror::Error;

use crate::types::{AnimeInfo, EmbedMirror, EpisodeList};

pub mod http;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse {what} response: {source}")]
    Decode {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

/// Remote metadata source for the watch view.
#[allow(async_fn_in_trait)]
pub trait AnimeApi {
    async fn fetch_anime_details(&self, anime_id: &str) -> Result<AnimeInfo, ApiError>;
    async fn fetch_anime_episodes(&self, title_slug: &str) -> Result<EpisodeList, ApiError>;
    async fn fetch_embedded_episodes(&self, episode_id: &str)
    -> Result<Vec<EmbedMirror>, ApiError>;
}
