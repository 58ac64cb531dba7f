use serde::{Deserialize, Serialize};
use std::fmt;

/// Which slot of a song a track fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackRole {
    Before,
    After,
    Classic,
}

impl TrackRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackRole::Before => "before",
            TrackRole::After => "after",
            TrackRole::Classic => "classic",
        }
    }
}

/// The audible side of a dual-track player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DualRole {
    #[default]
    Before,
    After,
}

impl DualRole {
    pub fn opposite(self) -> Self {
        match self {
            DualRole::Before => DualRole::After,
            DualRole::After => DualRole::Before,
        }
    }
}

impl From<DualRole> for TrackRole {
    fn from(role: DualRole) -> Self {
        match role {
            DualRole::Before => TrackRole::Before,
            DualRole::After => TrackRole::After,
        }
    }
}

/// Player flavours as configured upstream. Quick clips are short before/after
/// pairs and share the dual engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerMode {
    Classic,
    #[default]
    Dual,
    Quickclip,
}

impl PlayerMode {
    pub fn is_dual(&self) -> bool {
        !matches!(self, PlayerMode::Classic)
    }

    /// Track roles a song must carry to be playable in this mode
    pub fn required_roles(&self) -> &'static [TrackRole] {
        if self.is_dual() {
            &[TrackRole::Before, TrackRole::After]
        } else {
            &[TrackRole::Classic]
        }
    }
}

/// One playable resource. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub source_url: String,
    pub role: TrackRole,
}

impl Track {
    pub fn new(source_url: impl Into<String>, role: TrackRole) -> Self {
        Self {
            source_url: source_url.into(),
            role,
        }
    }

    pub fn is_usable(&self) -> bool {
        !is_placeholder_url(&self.source_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub String);

impl SongId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    pub tracks: Vec<Track>,
}

impl Song {
    /// First usable track for a role; placeholders never count
    pub fn track(&self, role: TrackRole) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|track| track.role == role && track.is_usable())
    }

    pub fn source_url(&self, role: TrackRole) -> Option<&str> {
        self.track(role).map(|track| track.source_url.as_str())
    }

    pub fn is_valid_for(&self, mode: PlayerMode) -> bool {
        mode.required_roles()
            .iter()
            .all(|role| self.track(*role).is_some())
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }

    pub fn display_artist(&self) -> &str {
        if self.artist.trim().is_empty() {
            "Unknown Artist"
        } else {
            &self.artist
        }
    }
}

/// Upstream song row as the data layer hands it over: one column per role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub before_audio_url: Option<String>,
    #[serde(default)]
    pub after_audio_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl From<SongRecord> for Song {
    fn from(record: SongRecord) -> Self {
        let tracks = [
            (record.before_audio_url, TrackRole::Before),
            (record.after_audio_url, TrackRole::After),
            (record.audio_url, TrackRole::Classic),
        ]
        .into_iter()
        .filter_map(|(url, role)| url.map(|url| Track::new(url, role)))
        .collect();

        Self {
            id: SongId(record.id),
            title: record.title,
            artist: record.artist,
            description: record.description,
            artwork_url: record.artwork_url,
            tracks,
        }
    }
}

// Values the dashboard writes into url columns before an upload finishes
const PLACEHOLDER_URLS: &[&str] = &["null", "undefined", "#", "about:blank"];

pub fn is_placeholder_url(url: &str) -> bool {
    let url = url.trim();
    url.is_empty()
        || PLACEHOLDER_URLS.iter().any(|p| url.eq_ignore_ascii_case(p))
        || url.to_ascii_lowercase().contains("placeholder")
}
