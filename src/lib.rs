// MixFlip Library - dual-track before/after player engine
// Modular design: the engine runs headless, the terminal front end is optional

pub mod analytics; // play events, fire and forget
pub mod audio;     // handles, loader, crossfade, playlist
pub mod config;    // settings and player configuration
pub mod error;     // error types shared by every layer
pub mod playback;  // session state machine, controller, gestures

#[cfg(feature = "tui")]
pub mod ui;        // terminal interface

// Export the stuff other modules actually use
pub use audio::{AudioBackend, AudioTrackHandle, DualTrackLoader, PlayerManifest, Playlist, Song, SongId};
pub use config::{Config, PlayerSettings};
pub use error::{Error, LoadError, PlaybackError, Result};
pub use playback::{ControllerOptions, Intent, PlaybackController, PlayerEvent, SessionView};
