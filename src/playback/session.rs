use crate::audio::track::{DualRole, SongId};
use crate::error::PlaybackError;

/// Where the session is in its lifecycle.
///
/// Paused is `Ready`; only `Ready` and `Playing` have loaded audio, so
/// "playing without audio" cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Loading => "loading",
            SessionPhase::Ready => "ready",
            SessionPhase::Playing => "playing",
        }
    }
}

/// Mutable runtime state of one player. Only the controller writes to it.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSession {
    phase: SessionPhase,
    current_song: Option<SongId>,
    active_role: DualRole,
    unlocked: bool,
    load_generation: u64,
    /// Play intent remembered across a load
    wants_play: bool,
    last_error: Option<PlaybackError>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_song(&self) -> Option<&SongId> {
        self.current_song.as_ref()
    }

    pub fn active_role(&self) -> DualRole {
        self.active_role
    }

    pub fn is_playing(&self) -> bool {
        self.phase == SessionPhase::Playing
    }

    pub fn audio_ready(&self) -> bool {
        matches!(self.phase, SessionPhase::Ready | SessionPhase::Playing)
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Loading
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn load_generation(&self) -> u64 {
        self.load_generation
    }

    pub fn wants_play(&self) -> bool {
        self.wants_play
    }

    pub fn last_error(&self) -> Option<&PlaybackError> {
        self.last_error.as_ref()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.phase == SessionPhase::Loading && self.load_generation == generation
    }

    /// Open a new load generation for `song`. Returns the generation number.
    pub fn begin_load(&mut self, song: SongId, role: DualRole, autoplay: bool) -> u64 {
        self.load_generation += 1;
        self.phase = SessionPhase::Loading;
        self.current_song = Some(song);
        self.active_role = role;
        self.wants_play = autoplay;
        self.last_error = None;
        self.load_generation
    }

    pub fn mark_ready(&mut self) {
        self.phase = SessionPhase::Ready;
    }

    pub fn mark_playing(&mut self) {
        if self.audio_ready() {
            self.phase = SessionPhase::Playing;
            self.wants_play = true;
        }
    }

    pub fn mark_paused(&mut self) {
        if self.audio_ready() {
            self.phase = SessionPhase::Ready;
        }
        self.wants_play = false;
    }

    /// Back to a retryable idle state. The song stays selected.
    pub fn mark_failed(&mut self, error: PlaybackError) {
        self.phase = SessionPhase::Idle;
        self.wants_play = false;
        self.last_error = Some(error);
    }

    pub fn set_wants_play(&mut self, wants_play: bool) {
        self.wants_play = wants_play;
    }

    pub fn set_active_role(&mut self, role: DualRole) {
        self.active_role = role;
    }

    pub fn set_unlocked(&mut self) {
        self.unlocked = true;
    }

    pub fn report(&mut self, error: PlaybackError) {
        self.last_error = Some(error);
    }

    /// Start over for a new playlist; the generation counter keeps counting
    pub fn reset(&mut self) {
        *self = Self {
            unlocked: self.unlocked,
            load_generation: self.load_generation,
            ..Self::default()
        };
    }
}
