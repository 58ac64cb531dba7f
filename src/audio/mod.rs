// Audio layer - handles, the dual loader, crossfades and the play-head
// Nothing in here knows about sessions or songs being "current"

pub mod backend;
pub mod crossfade;
pub mod handle;
pub mod loader;
pub mod playlist;
pub mod progress;
pub mod track;

#[cfg(feature = "audio")]
pub mod rodio_backend;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{AudioBackend, DecodeFuture, DecodeRequest, StopFlag, Voice};
pub use crossfade::{CrossfadeEngine, CrossfadeSettings};
pub use handle::{AudioTrackHandle, HandleStatus};
pub use loader::{DualTrackLoader, LoadOutcome, PendingLoad, TrackSet};
pub use playlist::{PlayerManifest, Playlist};
pub use progress::{format_clock, ProgressTracker};
pub use track::{DualRole, PlayerMode, Song, SongId, SongRecord, Track, TrackRole};

#[cfg(feature = "audio")]
pub use rodio_backend::{AudioEngine, RodioBackend};
