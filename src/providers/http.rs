use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{AnimeApi, ApiError};
use crate::config::ApiConfig;
use crate::types::{AnimeInfo, EmbedMirror, EpisodeList};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// JSON metadata API: `info/{id}`, `episodes/{slug}` and `servers/{episodeId}`.
pub struct HttpApi {
    client: Client,
    base: Url,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Other(format!(
                "API base URL cannot have paths: {}",
                config.base_url
            )));
        }
        Ok(Self { client, base })
    }

    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        what: &'static str,
    ) -> Result<T, ApiError> {
        debug!(url = %url, what, "GET");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|source| ApiError::Decode { what, source })
    }
}

impl AnimeApi for HttpApi {
    async fn fetch_anime_details(&self, anime_id: &str) -> Result<AnimeInfo, ApiError> {
        self.get_json(self.endpoint(&["info", anime_id]), "anime details")
            .await
    }

    async fn fetch_anime_episodes(&self, title_slug: &str) -> Result<EpisodeList, ApiError> {
        self.get_json(self.endpoint(&["episodes", title_slug]), "episode list")
            .await
    }

    async fn fetch_embedded_episodes(
        &self,
        episode_id: &str,
    ) -> Result<Vec<EmbedMirror>, ApiError> {
        self.get_json(self.endpoint(&["servers", episode_id]), "embed servers")
            .await
    }
}
