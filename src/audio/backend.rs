// Audio engine seam - everything that actually touches the output device
// The controller only ever sees these traits, so tests can script every load

use crate::error::{LoadError, PlaybackError};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One decoded resource attached to the output, paused at 0 when handed over.
pub trait Voice: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration);
    fn position(&self) -> Duration;
    fn duration(&self) -> Duration;
    fn set_volume(&mut self, volume: f32);
    /// True once the source has played out
    fn is_finished(&self) -> bool;
    /// Detach from the output for good. Called once, right before drop.
    fn release(&mut self);
}

pub type DecodeFuture = BoxFuture<'static, Result<Box<dyn Voice>, LoadError>>;

/// Raised when nobody wants the decode anymore. Workers check it between chunks.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub url: String,
    /// Voices decoded with the same clock play from one shared cursor, so
    /// play, pause and seek land on the same sample for all of them
    pub clock: u64,
    pub stop: StopFlag,
}

/// The process-wide audio engine. One per player container, torn down with it.
pub trait AudioBackend: Send + Sync {
    /// Fetch and decode. Dropping the future or raising the stop flag abandons the work.
    fn decode(&self, request: DecodeRequest) -> DecodeFuture;

    /// Play a short silent buffer so later programmatic starts are allowed
    fn unlock(&self) -> Result<(), PlaybackError>;

    /// Silence every voice this engine ever produced
    fn stop_all(&self);
}
