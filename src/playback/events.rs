use crate::audio::track::{DualRole, SongId};
use crate::error::PlaybackError;

/// Notifications the controller pushes to whoever renders it.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    SongChanged(SongId),
    Loaded(SongId),
    Started,
    Paused,
    RoleChanged(DualRole),
    TrackEnded(SongId),
    Error(PlaybackError),
}
