// Error types for MixFlip
// Load/playback failures are values the controller turns into state, never panics

use thiserror::Error;

/// Why a track (or a before/after pair) failed to become playable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("unsupported audio source: {0}")]
    UnsupportedUrl(String),

    #[error("song has no usable {0} track")]
    MissingTrack(&'static str),

    /// The handle was unloaded before its resource arrived.
    #[error("load cancelled")]
    Cancelled,

    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Failures surfaced to the UI as a non-blocking status line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("track load failed: {0}")]
    Load(#[from] LoadError),

    #[error("audio unlock rejected: {0}")]
    Unlock(String),

    #[error("playback requires an active plan")]
    PlanInactive,

    #[error("playlist has no playable songs")]
    EmptyPlaylist,

    #[error("song {0} is not in the playlist")]
    UnknownSong(String),
}

/// Crate-level error for the output device and play storage.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "analytics")]
    #[error("analytics database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("audio output error: {0}")]
    AudioOutput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
