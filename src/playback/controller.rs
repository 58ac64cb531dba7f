use super::events::PlayerEvent;
use super::gestures::Intent;
use super::session::{PlaybackSession, SessionPhase};
use crate::analytics::{AnalyticsSink, PlayRecorder, PlaySource};
use crate::audio::backend::AudioBackend;
use crate::audio::crossfade::{CrossfadeEngine, CrossfadeSettings};
use crate::audio::loader::{DualTrackLoader, LoadOutcome, TrackSet};
use crate::audio::playlist::Playlist;
use crate::audio::progress::ProgressTracker;
use crate::audio::track::{DualRole, PlayerMode, Song, SongId};
use crate::config::PlayerSettings;
use crate::error::PlaybackError;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Knobs that come from the embedding rather than the player itself.
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub crossfade: CrossfadeSettings,
    pub has_active_plan: bool,
    pub source: PlaySource,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            crossfade: CrossfadeSettings::default(),
            has_active_plan: true,
            source: PlaySource::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongSummary {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    pub description: Option<String>,
    pub index: usize,
}

/// Read-only picture of the session for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub song: Option<SongSummary>,
    pub mode: PlayerMode,
    pub active_role: DualRole,
    pub wants_play: bool,
    pub crossfading: bool,
    pub fraction: f64,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub error: Option<String>,
    pub before_label: String,
    pub after_label: String,
    pub has_active_plan: bool,
    pub source: PlaySource,
    pub playlist_len: usize,
}

/// Owner of one player's session and every handle it plays.
///
/// All mutation goes through the methods here, called from a single task.
/// Loads complete on other tasks and come back as [`LoadOutcome`]s through
/// [`pump`](Self::pump) or [`settle`](Self::settle).
pub struct PlaybackController {
    backend: Arc<dyn AudioBackend>,
    loader: DualTrackLoader,
    playlist: Playlist,
    player: PlayerSettings,
    options: ControllerOptions,
    session: PlaybackSession,
    tracks: Option<TrackSet>,
    crossfade: CrossfadeEngine,
    progress: ProgressTracker,
    ended_tx: mpsc::UnboundedSender<u64>,
    ended_rx: mpsc::UnboundedReceiver<u64>,
    analytics: Option<PlayRecorder>,
    events: Option<mpsc::UnboundedSender<PlayerEvent>>,
    torn_down: bool,
}

impl PlaybackController {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        playlist: Playlist,
        player: PlayerSettings,
        options: ControllerOptions,
    ) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        if !options.has_active_plan {
            info!("Player '{}' has no active plan, playback disabled", player.id);
        }

        Self {
            loader: DualTrackLoader::new(Arc::clone(&backend)),
            backend,
            playlist,
            player,
            crossfade: CrossfadeEngine::new(options.crossfade),
            options,
            session: PlaybackSession::new(),
            tracks: None,
            progress: ProgressTracker::new(),
            ended_tx,
            ended_rx,
            analytics: None,
            events: None,
            torn_down: false,
        }
    }

    /// Report every new load to `sink` from a background writer.
    /// Must run inside a tokio runtime.
    pub fn with_analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(PlayRecorder::spawn(sink));
        self
    }

    pub fn set_event_sender(&mut self, events: mpsc::UnboundedSender<PlayerEvent>) {
        self.events = Some(events);
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn player(&self) -> &PlayerSettings {
        &self.player
    }

    pub fn tracks(&self) -> Option<&TrackSet> {
        self.tracks.as_ref()
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_active()
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    fn mode(&self) -> PlayerMode {
        self.playlist.mode()
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn fail(&mut self, error: PlaybackError) {
        warn!("Playback error: {}", error);
        self.session.mark_failed(error.clone());
        self.emit(PlayerEvent::Error(error));
    }

    fn ensure_plan(&self) -> Result<(), PlaybackError> {
        if self.options.has_active_plan {
            Ok(())
        } else {
            Err(PlaybackError::PlanInactive)
        }
    }

    fn initial_role(&self) -> DualRole {
        if self.player.default_to_after {
            DualRole::After
        } else {
            DualRole::Before
        }
    }

    /// Load the first playlist entry without starting it.
    pub fn preload(&mut self) -> Result<(), PlaybackError> {
        self.ensure_plan()?;
        if self.session.current_song().is_some() {
            return Ok(());
        }
        let song = self.playlist.first().cloned().ok_or(PlaybackError::EmptyPlaylist)?;
        self.start_song(&song, false)
    }

    /// Switch to `id` and start it once loaded. Re-selecting the current song
    /// does nothing unless its last load failed.
    pub fn select_song(&mut self, id: &SongId) -> Result<(), PlaybackError> {
        self.ensure_plan()?;
        if self.session.current_song() == Some(id) && self.session.phase() != SessionPhase::Idle {
            return Ok(());
        }
        let song = self
            .playlist
            .get(id)
            .cloned()
            .ok_or_else(|| PlaybackError::UnknownSong(id.to_string()))?;
        self.start_song(&song, true)
    }

    pub fn select_index(&mut self, index: usize) -> Result<(), PlaybackError> {
        self.ensure_plan()?;
        let id = self
            .playlist
            .at(index)
            .map(|song| song.id.clone())
            .ok_or_else(|| PlaybackError::UnknownSong(format!("#{}", index)))?;
        self.select_song(&id)
    }

    /// Step through the playlist. Stops at either end, and waits out a load.
    pub fn select_adjacent(&mut self, forward: bool) -> Result<(), PlaybackError> {
        self.ensure_plan()?;
        if self.session.is_loading() {
            debug!("Ignoring song step while a load is in flight");
            return Ok(());
        }

        let target = match self.session.current_song() {
            Some(current) if forward => self.playlist.next_after(current),
            Some(current) => self.playlist.previous_before(current),
            None if forward => self.playlist.first(),
            None => None,
        };
        match target.map(|song| song.id.clone()) {
            Some(id) => self.select_song(&id),
            None => Ok(()),
        }
    }

    fn release_current(&mut self) {
        self.crossfade.cancel();
        self.progress.reset();
        if let Some(tracks) = self.tracks.take() {
            tracks.unload_all();
        }
    }

    fn start_song(&mut self, song: &Song, autoplay: bool) -> Result<(), PlaybackError> {
        // Old song is silent and released before the new generation exists
        self.release_current();
        self.loader.cancel();

        let generation = self
            .session
            .begin_load(song.id.clone(), self.initial_role(), autoplay);
        debug!("Session -> loading {} (generation {})", song.id, generation);

        if let Err(e) = self.loader.start_load(song, self.mode(), generation) {
            let error = PlaybackError::Load(e);
            self.fail(error.clone());
            return Err(error);
        }

        self.emit(PlayerEvent::SongChanged(song.id.clone()));
        self.track_play(&song.id);
        Ok(())
    }

    fn track_play(&self, song_id: &SongId) {
        if let Some(recorder) = &self.analytics {
            recorder.record(&self.player.id, song_id, self.options.source);
        }
    }

    /// Match a finished load against the session.
    pub fn handle_load_outcome(&mut self, outcome: LoadOutcome) {
        let generation = outcome.generation;
        let song_id = outcome.song_id.clone();

        match self.loader.finish(outcome) {
            None => {}
            Some(Err(e)) => {
                if self.session.is_current(generation) {
                    self.fail(PlaybackError::Load(e));
                }
            }
            Some(Ok(tracks)) => {
                if !self.session.is_current(generation) {
                    debug!("Load of {} finished for a retired session, releasing", song_id);
                    tracks.unload_all();
                    return;
                }
                self.install(tracks, generation);
                self.session.mark_ready();
                debug!("Session -> ready ({})", song_id);
                self.emit(PlayerEvent::Loaded(song_id));

                if self.session.wants_play() {
                    self.start_playback();
                }
            }
        }
    }

    fn install(&mut self, tracks: TrackSet, generation: u64) {
        self.apply_steady_volumes(&tracks);

        let ended = self.ended_tx.clone();
        tracks.canonical().on_end(move || {
            let _ = ended.send(generation);
        });

        self.progress.sync(tracks.canonical());
        self.tracks = Some(tracks);
    }

    fn apply_steady_volumes(&self, tracks: &TrackSet) {
        match tracks {
            TrackSet::Classic(handle) => handle.set_volume(1.0),
            TrackSet::Dual { before, after } => {
                let after_active = self.session.active_role() == DualRole::After;
                before.set_volume(if after_active { 0.0 } else { 1.0 });
                after.set_volume(if after_active { 1.0 } else { 0.0 });
            }
        }
    }

    fn start_playback(&mut self) {
        let Some(tracks) = &self.tracks else {
            return;
        };
        // Both halves always run; only their volumes say which one is heard
        tracks.play_all();
        self.session.mark_playing();
        self.progress.start();
        debug!("Session -> playing");
        self.emit(PlayerEvent::Started);
    }

    fn pause_playback(&mut self) {
        if let Some(tracks) = &self.tracks {
            tracks.pause_all();
        }
        self.session.mark_paused();
        self.progress.stop();
        debug!("Session -> paused");
        self.emit(PlayerEvent::Paused);
    }

    fn unlock(&mut self) -> Result<(), PlaybackError> {
        if self.session.is_unlocked() {
            return Ok(());
        }
        match self.backend.unlock() {
            Ok(()) => {
                debug!("Audio output unlocked");
                self.session.set_unlocked();
                Ok(())
            }
            Err(e) => {
                warn!("Unlock rejected, will retry on the next gesture: {}", e);
                self.session.report(e.clone());
                self.emit(PlayerEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    pub fn toggle_play_pause(&mut self) -> Result<(), PlaybackError> {
        self.ensure_plan()?;
        self.unlock()?;

        match self.session.phase() {
            SessionPhase::Playing => self.pause_playback(),
            SessionPhase::Ready => self.start_playback(),
            SessionPhase::Loading => {
                let wants_play = !self.session.wants_play();
                self.session.set_wants_play(wants_play);
                debug!("Play intent while loading: {}", wants_play);
            }
            SessionPhase::Idle => {
                let song = match self.session.current_song() {
                    Some(current) => self.playlist.get(current).cloned(),
                    None => None,
                }
                .or_else(|| self.playlist.first().cloned())
                .ok_or(PlaybackError::EmptyPlaylist)?;
                self.start_song(&song, true)?;
            }
        }
        Ok(())
    }

    /// Crossfade to `target`. False when nothing changed.
    pub fn toggle_active_role(&mut self, target: DualRole, now: Instant) -> bool {
        if !self.options.has_active_plan || !self.mode().is_dual() || target == self.session.active_role() {
            return false;
        }

        let from = self.session.active_role();
        self.session.set_active_role(target);
        if let Some(tracks) = &self.tracks {
            if let (Some(fade_out), Some(fade_in)) = (tracks.dual(from), tracks.dual(target)) {
                self.crossfade.crossfade(fade_out, fade_in, now);
            }
        }

        debug!("Active role -> {:?}", target);
        self.emit(PlayerEvent::RoleChanged(target));
        true
    }

    /// Put every handle on `fraction` of the canonical duration.
    pub fn seek_to(&mut self, fraction: f64) {
        if !self.session.audio_ready() {
            return;
        }
        let Some(tracks) = &self.tracks else {
            return;
        };
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let target = fraction * tracks.canonical().duration();
        tracks.seek_all(target);
        self.progress.sync(tracks.canonical());
        debug!("Seek to {:.2}s", target);
    }

    /// The canonical track played out for `generation`.
    pub fn on_track_end(&mut self, generation: u64) {
        if generation != self.session.load_generation() || !self.session.audio_ready() {
            return;
        }
        let Some(song_id) = self.session.current_song().cloned() else {
            return;
        };

        if let Some(tracks) = &self.tracks {
            tracks.stop_all();
        }
        self.session.mark_paused();
        self.progress.stop();
        if let Some(tracks) = &self.tracks {
            self.progress.sync(tracks.canonical());
        }
        info!("Finished {}", song_id);
        self.emit(PlayerEvent::TrackEnded(song_id.clone()));

        if self.player.auto_advance {
            if let Some(next) = self.playlist.next_after(&song_id).map(|song| song.id.clone()) {
                if let Err(e) = self.select_song(&next) {
                    warn!("Auto-advance to {} failed: {}", next, e);
                }
            }
        }
    }

    pub fn apply_intent(&mut self, intent: Intent, now: Instant) -> Result<(), PlaybackError> {
        self.ensure_plan()?;
        match intent {
            Intent::SwitchTo(role) => {
                self.toggle_active_role(role, now);
                Ok(())
            }
            Intent::FlipRole => {
                let target = self.session.active_role().opposite();
                self.toggle_active_role(target, now);
                Ok(())
            }
            Intent::TogglePlayPause => self.toggle_play_pause(),
            Intent::PreviousSong => self.select_adjacent(false),
            Intent::NextSong => self.select_adjacent(true),
            Intent::Seek(fraction) => {
                self.seek_to(fraction);
                Ok(())
            }
            Intent::Select(index) => self.select_index(index),
        }
    }

    /// Drain finished loads, then run one tick. Never blocks.
    pub fn pump(&mut self, now: Instant) {
        while let Some(outcome) = self.loader.try_next_outcome() {
            self.handle_load_outcome(outcome);
        }
        self.tick(now);
    }

    /// Wait until no load is in flight.
    pub async fn settle(&mut self) {
        while self.loader.is_loading() {
            match self.loader.next_outcome().await {
                Some(outcome) => self.handle_load_outcome(outcome),
                None => break,
            }
        }
    }

    /// One display frame: crossfade steps, end-of-track, play-head.
    pub fn tick(&mut self, now: Instant) {
        self.crossfade.advance(now);

        if let Some(tracks) = &self.tracks {
            tracks.canonical().poll_end();
        }
        while let Ok(generation) = self.ended_rx.try_recv() {
            self.on_track_end(generation);
        }

        if let Some(tracks) = &self.tracks {
            self.progress.frame(tracks.canonical());
        }
    }

    pub fn snapshot(&self) -> SessionView {
        let song = self.session.current_song().and_then(|id| {
            let index = self.playlist.index_of(id)?;
            let song = self.playlist.at(index)?;
            Some(SongSummary {
                id: song.id.clone(),
                title: song.display_title().to_string(),
                artist: song.display_artist().to_string(),
                description: song.description.clone(),
                index,
            })
        });

        SessionView {
            phase: self.session.phase(),
            song,
            mode: self.mode(),
            active_role: self.session.active_role(),
            wants_play: self.session.wants_play(),
            crossfading: self.crossfade.is_active(),
            fraction: self.progress.fraction(),
            position_secs: self.progress.position_secs(),
            duration_secs: self.progress.duration_secs(),
            error: self.session.last_error().map(ToString::to_string),
            before_label: self.player.before_label().to_string(),
            after_label: self.player.after_label().to_string(),
            has_active_plan: self.options.has_active_plan,
            source: self.options.source,
            playlist_len: self.playlist.len(),
        }
    }

    /// Stop and release everything this player owns. Safe to repeat.
    pub fn teardown(&mut self) {
        self.loader.cancel();
        self.release_current();
        while self.ended_rx.try_recv().is_ok() {}
        self.backend.stop_all();
        self.session.reset();
        if !self.torn_down {
            debug!("Player '{}' torn down", self.player.id);
        }
        self.torn_down = true;
    }

    /// Upstream player identity, songs or ordering changed: start over with
    /// a fresh session under the new settings
    pub fn replace_playlist(&mut self, player: PlayerSettings, playlist: Playlist) {
        self.teardown();
        if player.id != self.player.id {
            info!("Player '{}' replaced by '{}'", self.player.id, player.id);
        }
        info!("Playlist replaced ({} playable song(s))", playlist.len());
        self.player = player;
        self.playlist = playlist;
        self.torn_down = false;
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if !self.torn_down {
            self.teardown();
        }
    }
}
