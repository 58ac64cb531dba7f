// Playback - the session state machine and everything allowed to drive it
// The controller is the hub; gestures only ever produce intents for it

pub mod controller;
pub mod events;
pub mod gestures;
pub mod session;

pub use controller::{ControllerOptions, PlaybackController, SessionView, SongSummary};
pub use events::PlayerEvent;
pub use gestures::{
    GestureSettings, Intent, KeyInput, PointerInput, PointerPhase, PointerSource, ToggleBounds,
    ToggleGestureController,
};
pub use session::{PlaybackSession, SessionPhase};
