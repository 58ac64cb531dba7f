use super::track::{PlayerMode, Song, SongId, SongRecord};
use crate::analytics::PlaySource;
use crate::config::PlayerSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The playable songs of one player, in play order.
///
/// Only songs valid for the player's mode ever make it in, so the rest of
/// the engine can assume every entry has the URLs it needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    songs: Vec<Song>,
    mode: PlayerMode,
}

impl Playlist {
    /// Build from the upstream song list plus the player's ordering.
    ///
    /// Songs named in `order` come first, in that order; the rest follow in
    /// upstream order. Unknown and duplicate ids in `order` are skipped.
    pub fn resolve(songs: Vec<Song>, order: &[SongId], mode: PlayerMode) -> Self {
        let mut remaining: Vec<Option<Song>> = songs.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(remaining.len());

        for id in order {
            if let Some(slot) = remaining
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|song| &song.id == id))
            {
                ordered.extend(slot.take());
            }
        }
        ordered.extend(remaining.into_iter().flatten());

        let mut seen = HashSet::new();
        let songs: Vec<Song> = ordered
            .into_iter()
            .filter(|song| {
                if !song.is_valid_for(mode) {
                    debug!(
                        "Dropping '{}' ({}): missing a usable track for {:?} mode",
                        song.display_title(),
                        song.id,
                        mode
                    );
                    return false;
                }
                seen.insert(song.id.clone())
            })
            .collect();

        Self { songs, mode }
    }

    pub fn from_songs(songs: Vec<Song>, mode: PlayerMode) -> Self {
        Self::resolve(songs, &[], mode)
    }

    pub fn mode(&self) -> PlayerMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn get(&self, id: &SongId) -> Option<&Song> {
        self.songs.iter().find(|song| &song.id == id)
    }

    pub fn index_of(&self, id: &SongId) -> Option<usize> {
        self.songs.iter().position(|song| &song.id == id)
    }

    pub fn at(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Song> {
        self.songs.iter()
    }

    pub fn first(&self) -> Option<&Song> {
        self.songs.first()
    }

    /// The entry after `id`; `None` at the end of the list
    pub fn next_after(&self, id: &SongId) -> Option<&Song> {
        self.index_of(id).and_then(|index| self.songs.get(index + 1))
    }

    /// The entry before `id`; `None` at the start of the list
    pub fn previous_before(&self, id: &SongId) -> Option<&Song> {
        self.index_of(id)
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| self.songs.get(index))
    }
}

fn default_plan() -> bool {
    true
}

/// Everything the data layer resolves for one player instance, as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerManifest {
    #[serde(default)]
    pub player: PlayerSettings,
    #[serde(default)]
    pub songs: Vec<SongRecord>,
    #[serde(default)]
    pub order: Vec<SongId>,
    #[serde(default = "default_plan")]
    pub has_active_plan: bool,
    #[serde(default)]
    pub source: PlaySource,
}

impl PlayerManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read manifest {}: {}", path.display(), e))?;
        let manifest: PlayerManifest = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse manifest JSON: {}", e))?;
        info!(
            "Loaded player '{}' with {} song(s) from {}",
            manifest.player.name,
            manifest.songs.len(),
            path.display()
        );
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize manifest: {}", e))?;
        fs::write(path, json)
            .map_err(|e| anyhow::anyhow!("Failed to write manifest file: {}", e))?;
        info!("Saved player '{}' to {}", self.player.name, path.display());
        Ok(())
    }

    pub fn playlist(&self) -> Playlist {
        let songs = self.songs.iter().cloned().map(Song::from).collect();
        Playlist::resolve(songs, &self.order, self.player.player_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dual(id: &str, after: &str) -> SongRecord {
        SongRecord {
            id: id.to_string(),
            title: format!("Song {}", id),
            artist: "Mixer".to_string(),
            before_audio_url: Some(format!("{}-before.wav", id)),
            after_audio_url: Some(after.to_string()),
            ..Default::default()
        }
    }

    fn songs(records: Vec<SongRecord>) -> Vec<Song> {
        records.into_iter().map(Song::from).collect()
    }

    #[test]
    fn test_song_without_after_track_is_excluded() {
        let playlist = Playlist::from_songs(
            songs(vec![dual("1", "1-after.wav"), dual("2", ""), dual("3", "3-after.wav")]),
            PlayerMode::Dual,
        );

        assert_eq!(playlist.len(), 2);
        assert!(playlist.get(&SongId::new("2")).is_none());
        assert_eq!(playlist.index_of(&SongId::new("3")), Some(1));
        assert_eq!(
            playlist.next_after(&SongId::new("1")).map(|s| s.id.as_str()),
            Some("3")
        );
    }

    #[test]
    fn test_order_then_upstream_remainder() {
        let order = vec![SongId::new("c"), SongId::new("ghost"), SongId::new("a"), SongId::new("c")];
        let playlist = Playlist::resolve(
            songs(vec![dual("a", "x.wav"), dual("b", "y.wav"), dual("c", "z.wav")]),
            &order,
            PlayerMode::Dual,
        );

        let ids: Vec<&str> = playlist.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_neighbours_do_not_wrap() {
        let playlist = Playlist::from_songs(
            songs(vec![dual("a", "x.wav"), dual("b", "y.wav")]),
            PlayerMode::Dual,
        );

        assert!(playlist.previous_before(&SongId::new("a")).is_none());
        assert!(playlist.next_after(&SongId::new("b")).is_none());
        assert_eq!(
            playlist.previous_before(&SongId::new("b")).map(|s| s.id.as_str()),
            Some("a")
        );
        assert!(playlist.next_after(&SongId::new("missing")).is_none());
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.json");

        let mut manifest = PlayerManifest {
            songs: vec![dual("a", "a-after.wav"), dual("b", "placeholder")],
            order: vec![SongId::new("b"), SongId::new("a")],
            has_active_plan: true,
            source: PlaySource::LandingPage,
            ..Default::default()
        };
        manifest.player.id = "p1".to_string();
        manifest.save(&path).unwrap();

        let loaded = PlayerManifest::load(&path).unwrap();
        assert_eq!(loaded.player.id, "p1");
        assert_eq!(loaded.source, PlaySource::LandingPage);
        let playlist = loaded.playlist();
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.first().map(|s| s.id.as_str()), Some("a"));
    }

    #[test]
    fn test_minimal_manifest_defaults() {
        let manifest: PlayerManifest = serde_json::from_str(
            r#"{"songs": [{"id": "s", "audio_url": "s.mp3"}], "player": {"player_type": "classic"}}"#,
        )
        .unwrap();

        assert!(manifest.has_active_plan);
        assert_eq!(manifest.source, PlaySource::Embed);
        assert_eq!(manifest.playlist().len(), 1);
    }
}
