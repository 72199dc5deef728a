use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio track of a catalog: subtitled or dubbed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Sub,
    Dub,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Sub => "sub",
            Language::Dub => "dub",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::Sub => "Sub",
            Language::Dub => "Dub",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::Sub => Language::Dub,
            Language::Dub => Language::Sub,
        }
    }

    /// Catalog slug for this language. Dubbed catalogs live under `{slug}-dub`.
    pub fn catalog_slug(self, slug: &str) -> String {
        let base = slug.strip_suffix("-dub").unwrap_or(slug);
        match self {
            Language::Sub => base.to_string(),
            Language::Dub => format!("{base}-dub"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sub" => Ok(Language::Sub),
            "dub" => Ok(Language::Dub),
            other => Err(format!("unknown language '{other}'")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which player renders the current episode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Primary player, fed the episode id directly.
    #[default]
    Default,
    Vidstreaming,
    Gogo,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [
        SourceType::Default,
        SourceType::Vidstreaming,
        SourceType::Gogo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Default => "default",
            SourceType::Vidstreaming => "vidstreaming",
            SourceType::Gogo => "gogo",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceType::Default => "Default",
            SourceType::Vidstreaming => "Vidstreaming",
            SourceType::Gogo => "Gogo",
        }
    }

    pub fn is_embedded(self) -> bool {
        !matches!(self, SourceType::Default)
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(SourceType::Default),
            "vidstreaming" => Ok(SourceType::Vidstreaming),
            "gogo" => Ok(SourceType::Gogo),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeTitle {
    #[serde(default)]
    pub romaji: Option<String>,
    #[serde(default)]
    pub english: Option<String>,
}

impl AnimeTitle {
    pub fn preferred(&self) -> &str {
        self.english
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.romaji.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiringStatus {
    Releasing,
    NotYetAired,
    Finished,
    Cancelled,
    Hiatus,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverImage {
    #[serde(default)]
    pub large: Option<String>,
    #[serde(default, rename = "extraLarge")]
    pub extra_large: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextAiringEpisode {
    pub episode: u32,
    /// Seconds until the episode airs.
    pub time_until_airing: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIds {
    #[serde(default, rename = "idGogo")]
    pub gogo: Option<String>,
}

/// Snapshot of a details fetch. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: AnimeTitle,
    pub status: AiringStatus,
    #[serde(default)]
    pub banner_image: Option<String>,
    #[serde(default)]
    pub cover_image: CoverImage,
    #[serde(default)]
    pub next_airing_episode: Option<NextAiringEpisode>,
    #[serde(default)]
    pub trailer: Option<Trailer>,
    #[serde(default)]
    pub id_mal: Option<u64>,
    #[serde(default, rename = "id_provider")]
    pub provider_ids: ProviderIds,
}

impl AnimeInfo {
    pub fn page_title(&self) -> String {
        format!("Anveshna. | {}", self.title.preferred())
    }

    pub fn backdrop(&self) -> Option<&str> {
        self.banner_image
            .as_deref()
            .or(self.cover_image.large.as_deref())
    }

    pub fn trailer_id(&self) -> Option<&str> {
        self.trailer.as_ref().map(|t| t.id.as_str())
    }

    /// Milliseconds until the next episode airs, if one is scheduled.
    pub fn next_airing_ms(&self) -> Option<i64> {
        self.next_airing_episode
            .as_ref()
            .map(|next| next.time_until_airing.saturating_mul(1000))
    }
}

/// Catalog record as the upstream returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEpisode {
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub number: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpisodeList {
    #[serde(default)]
    pub episodes: Vec<RawEpisode>,
}

/// One normalized catalog entry. `number` stays a string: "7-5" is a valid number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub number: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
}

impl Episode {
    /// Title slug encoded in the id, i.e. everything before `-episode-`.
    pub fn slug(&self) -> &str {
        self.id
            .split_once(crate::catalog::EPISODE_DELIMITER)
            .map(|(slug, _)| slug)
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedMirror {
    pub name: String,
    pub url: String,
}

/// Mutable state of one mounted watch view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSelection {
    pub current_episode: Option<Episode>,
    pub source_type: SourceType,
    pub language: Language,
    pub embedded_video: Option<EmbedMirror>,
    pub download_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Int(i64),
    Float(f64),
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Text(text) => text,
        StringOrNumber::Int(n) => n.to_string(),
        StringOrNumber::Float(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dub_catalog_slug_round_trips_between_languages() {
        assert_eq!(Language::Dub.catalog_slug("naruto"), "naruto-dub");
        assert_eq!(Language::Dub.catalog_slug("naruto-dub"), "naruto-dub");
        assert_eq!(Language::Sub.catalog_slug("naruto-dub"), "naruto");
    }

    #[test]
    fn episode_slug_is_taken_from_id() {
        let ep = Episode {
            id: "one-piece-dub-episode-7-5".into(),
            number: "7-5".into(),
            title: None,
            air_date: None,
        };
        assert_eq!(ep.slug(), "one-piece-dub");
    }

    #[test]
    fn episode_slug_keeps_words_starting_with_episode() {
        let ep = Episode {
            id: "my-episodes-episode-3".into(),
            number: "3".into(),
            title: None,
            air_date: None,
        };
        assert_eq!(ep.slug(), "my-episodes");
    }

    #[test]
    fn anime_info_accepts_numeric_ids_and_unknown_status() {
        let info: AnimeInfo = serde_json::from_str(
            r#"{"id": 21, "title": {"romaji": "One Piece"}, "status": "SOMETHING_NEW",
                "coverImage": {"large": "cover.jpg"},
                "nextAiringEpisode": {"episode": 1100, "timeUntilAiring": 60},
                "id_provider": {"idGogo": "one-piece"}}"#,
        )
        .unwrap();
        assert_eq!(info.id, "21");
        assert_eq!(info.status, AiringStatus::Unknown);
        assert_eq!(info.backdrop(), Some("cover.jpg"));
        assert_eq!(info.next_airing_ms(), Some(60_000));
        assert_eq!(info.provider_ids.gogo.as_deref(), Some("one-piece"));
        assert_eq!(info.page_title(), "Anveshna. | One Piece");
    }

    #[test]
    fn raw_episode_number_may_be_numeric() {
        let raw: RawEpisode =
            serde_json::from_str(r#"{"id": "naruto-episode-3", "number": 3}"#).unwrap();
        assert_eq!(raw.number, "3");
    }
}
