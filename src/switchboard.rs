//! Video source and language selection for one anime.

use tracing::{debug, warn};

use crate::prefs::PreferenceStore;
use crate::storage::KeyValueStore;
use crate::types::{EmbedMirror, Episode, Language, SourceType};

pub const VIDSTREAMING_MIRROR: &str = "Vidstreaming";
pub const GOGO_MIRROR: &str = "Gogo server";

/// Mirror for an embedded source: exact name match first, then a fixed index
/// (0 for vidstreaming, 1 for gogo). `Default` never uses a mirror.
pub fn select_mirror(source: SourceType, mirrors: &[EmbedMirror]) -> Option<&EmbedMirror> {
    let (name, fallback) = match source {
        SourceType::Default => return None,
        SourceType::Vidstreaming => (VIDSTREAMING_MIRROR, 0),
        SourceType::Gogo => (GOGO_MIRROR, 1),
    };
    mirrors
        .iter()
        .find(|mirror| mirror.name == name)
        .or_else(|| mirrors.get(fallback))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Switchboard {
    source_type: SourceType,
    language: Language,
}

impl Switchboard {
    /// Saved choices for `anime_id`, `default`/`sub` when nothing is stored.
    pub fn restore<S: KeyValueStore>(prefs: &PreferenceStore<S>, anime_id: &str) -> Self {
        Self {
            source_type: prefs.source_type(anime_id),
            language: prefs.language(anime_id),
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Persists and applies `source`. Returns whether it changed.
    pub fn set_source_type<S: KeyValueStore>(
        &mut self,
        prefs: &mut PreferenceStore<S>,
        anime_id: &str,
        source: SourceType,
    ) -> bool {
        if let Err(err) = prefs.set_source_type(anime_id, source) {
            warn!(anime_id, error = %err, "Failed to save source type");
        }
        let changed = self.source_type != source;
        self.source_type = source;
        debug!(anime_id, source = %source, changed, "Source type set");
        changed
    }

    /// Persists and applies `language`. Returns whether it changed.
    pub fn set_language<S: KeyValueStore>(
        &mut self,
        prefs: &mut PreferenceStore<S>,
        anime_id: &str,
        language: Language,
    ) -> bool {
        if let Err(err) = prefs.set_language(anime_id, language) {
            warn!(anime_id, error = %err, "Failed to save language");
        }
        let changed = self.language != language;
        self.language = language;
        debug!(anime_id, language = %language, changed, "Language set");
        changed
    }

    /// Episode id to look mirrors up for, when the active source is embedded.
    pub fn mirror_lookup<'a>(&self, current: Option<&'a Episode>) -> Option<&'a str> {
        if !self.source_type.is_embedded() {
            return None;
        }
        current
            .map(|ep| ep.id.as_str())
            .filter(|id| !id.is_empty())
    }
}
