use super::backend::{AudioBackend, DecodeRequest, StopFlag, Voice};
use super::track::TrackRole;
use crate::error::LoadError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Empty,
    Loading,
    Loaded,
    Unloaded,
}

type EndCallback = Box<dyn FnMut() + Send>;

struct HandleInner {
    status: HandleStatus,
    voice: Option<Box<dyn Voice>>,
    volume: f32,
    playing: bool,
    ended: bool,
    on_end: Option<EndCallback>,
    stop: StopFlag,
}

/// Thin wrapper around one decoded resource.
///
/// Clones share the same resource, so the loader, the controller and the
/// crossfade engine can all hold the handle. Every method except `load` is
/// synchronous and safe in any state; after `unload` they all do nothing.
#[derive(Clone)]
pub struct AudioTrackHandle {
    role: TrackRole,
    inner: Arc<Mutex<HandleInner>>,
}

fn lock_inner(inner: &Mutex<HandleInner>) -> MutexGuard<'_, HandleInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AudioTrackHandle {
    pub fn new(role: TrackRole) -> Self {
        Self {
            role,
            inner: Arc::new(Mutex::new(HandleInner {
                status: HandleStatus::Empty,
                voice: None,
                volume: 1.0,
                playing: false,
                ended: false,
                on_end: None,
                stop: StopFlag::new(),
            })),
        }
    }

    pub fn role(&self) -> TrackRole {
        self.role
    }

    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        lock_inner(&self.inner)
    }

    /// Start buffering `url` on `clock`. Resolves once the duration is known.
    ///
    /// Handles loaded on the same clock stay sample-aligned. If the handle is
    /// unloaded while the decode is in flight, the decoder is told to stop,
    /// anything it still delivers is released and the future yields `Cancelled`.
    pub fn load(
        &self,
        backend: &dyn AudioBackend,
        url: &str,
        clock: u64,
    ) -> impl Future<Output = Result<(), LoadError>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let role = self.role;
        let url = url.to_string();

        let decode = {
            let mut guard = self.lock();
            if guard.status == HandleStatus::Unloaded {
                None
            } else {
                guard.status = HandleStatus::Loading;
                Some(backend.decode(DecodeRequest {
                    url: url.clone(),
                    clock,
                    stop: guard.stop.clone(),
                }))
            }
        };

        async move {
            let Some(decode) = decode else {
                return Err(LoadError::Cancelled);
            };
            let result = decode.await;

            let mut guard = lock_inner(&inner);
            if guard.status == HandleStatus::Unloaded {
                if let Ok(mut voice) = result {
                    voice.release();
                }
                debug!("{} track {} arrived after unload, released", role.as_str(), url);
                return Err(LoadError::Cancelled);
            }

            match result {
                Ok(mut voice) => {
                    voice.set_volume(guard.volume);
                    if guard.playing {
                        voice.play();
                    }
                    guard.voice = Some(voice);
                    guard.status = HandleStatus::Loaded;
                    guard.ended = false;
                    Ok(())
                }
                Err(e) => {
                    guard.status = HandleStatus::Empty;
                    Err(e)
                }
            }
        }
    }

    pub fn play(&self) {
        let mut guard = self.lock();
        if guard.status == HandleStatus::Unloaded {
            return;
        }
        guard.playing = true;
        guard.ended = false;
        if let Some(voice) = guard.voice.as_mut() {
            voice.play();
        }
    }

    pub fn pause(&self) {
        let mut guard = self.lock();
        guard.playing = false;
        if let Some(voice) = guard.voice.as_mut() {
            voice.pause();
        }
    }

    /// Pause and rewind to the start
    pub fn stop(&self) {
        let mut guard = self.lock();
        guard.playing = false;
        guard.ended = false;
        if let Some(voice) = guard.voice.as_mut() {
            voice.pause();
            voice.seek(Duration::ZERO);
        }
    }

    /// Release the resource. Every later call is a no-op.
    pub fn unload(&self) {
        let (voice, callback) = {
            let mut guard = self.lock();
            guard.status = HandleStatus::Unloaded;
            guard.playing = false;
            guard.stop.stop();
            (guard.voice.take(), guard.on_end.take())
        };
        if let Some(mut voice) = voice {
            voice.pause();
            voice.release();
        }
        drop(callback);
    }

    pub fn seek_to(&self, seconds: f64) {
        let mut guard = self.lock();
        let Some(voice) = guard.voice.as_mut() else {
            return;
        };
        let duration = voice.duration().as_secs_f64();
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, duration)
        } else {
            0.0
        };
        voice.seek(Duration::from_secs_f64(target));
        guard.ended = false;
    }

    /// Current play-head in seconds
    pub fn position(&self) -> f64 {
        self.lock()
            .voice
            .as_ref()
            .map(|voice| voice.position().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Length in seconds, 0 until loaded
    pub fn duration(&self) -> f64 {
        self.lock()
            .voice
            .as_ref()
            .map(|voice| voice.duration().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        let mut guard = self.lock();
        if guard.status == HandleStatus::Unloaded {
            return;
        }
        guard.volume = volume;
        if let Some(voice) = guard.voice.as_mut() {
            voice.set_volume(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn status(&self) -> HandleStatus {
        self.lock().status
    }

    pub fn is_loaded(&self) -> bool {
        self.status() == HandleStatus::Loaded
    }

    /// Register the end-of-track callback, replacing any previous one
    pub fn on_end(&self, callback: impl FnMut() + Send + 'static) {
        let mut guard = self.lock();
        if guard.status != HandleStatus::Unloaded {
            guard.on_end = Some(Box::new(callback));
        }
    }

    /// Check the voice for completion; fires the end callback once per play-through.
    pub fn poll_end(&self) -> bool {
        let mut callback = {
            let mut guard = self.lock();
            let finished = guard.playing
                && !guard.ended
                && guard.voice.as_ref().is_some_and(|voice| voice.is_finished());
            if !finished {
                return false;
            }
            guard.ended = true;
            guard.playing = false;
            guard.on_end.take()
        };

        // Run outside the lock, the callback may touch this handle
        if let Some(cb) = callback.as_mut() {
            cb();
        }
        if let Some(cb) = callback {
            let mut guard = self.lock();
            if guard.on_end.is_none() && guard.status != HandleStatus::Unloaded {
                guard.on_end = Some(cb);
            }
        }
        true
    }
}

impl fmt::Debug for AudioTrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.lock();
        f.debug_struct("AudioTrackHandle")
            .field("role", &self.role)
            .field("status", &guard.status)
            .field("volume", &guard.volume)
            .field("playing", &guard.playing)
            .finish()
    }
}
