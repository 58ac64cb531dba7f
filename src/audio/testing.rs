// Scripted audio backend for unit tests
// Decodes park until the test resolves or fails them by url

use super::backend::{AudioBackend, DecodeFuture, DecodeRequest, Voice};
use crate::error::{LoadError, PlaybackError};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    pub playing: bool,
    pub volume: f32,
    pub position: Duration,
    pub finished: bool,
    pub released: bool,
}

struct PendingDecode {
    url: String,
    reply: oneshot::Sender<Result<(), LoadError>>,
}

#[derive(Default)]
struct Script {
    pending: Mutex<Vec<PendingDecode>>,
    requests: Mutex<Vec<DecodeRequest>>,
    voices: Mutex<Vec<(String, Arc<Mutex<VoiceState>>)>>,
    durations: Mutex<HashMap<String, Duration>>,
    decode_calls: AtomicUsize,
    live_voices: AtomicUsize,
    unlock_calls: AtomicUsize,
    stop_all_calls: AtomicUsize,
    reject_unlock: AtomicBool,
    auto_resolve: AtomicBool,
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every decode succeeds on first poll
    pub fn auto_resolving() -> Self {
        let backend = Self::new();
        backend.script.auto_resolve.store(true, Ordering::SeqCst);
        backend
    }

    pub fn set_duration(&self, url: &str, seconds: f64) {
        self.script
            .durations
            .lock()
            .unwrap()
            .insert(url.to_string(), Duration::from_secs_f64(seconds));
    }

    fn reply(&self, url: &str, result: Result<(), LoadError>) -> bool {
        let pending = {
            let mut pending = self.script.pending.lock().unwrap();
            match pending.iter().position(|p| p.url == url) {
                Some(index) => pending.remove(index),
                None => return false,
            }
        };
        pending.reply.send(result).is_ok()
    }

    /// Complete the oldest pending decode of `url`. False if nobody is listening anymore.
    pub fn resolve(&self, url: &str) -> bool {
        self.reply(url, Ok(()))
    }

    pub fn fail(&self, url: &str) -> bool {
        self.reply(
            url,
            Err(LoadError::Decode {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            }),
        )
    }

    pub fn pending_urls(&self) -> Vec<String> {
        self.script
            .pending
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.url.clone())
            .collect()
    }

    fn last_request(&self, url: &str) -> Option<DecodeRequest> {
        self.script
            .requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|request| request.url == url)
            .cloned()
    }

    /// Whether the most recent decode of `url` was asked to stop
    pub fn stop_requested(&self, url: &str) -> Option<bool> {
        self.last_request(url).map(|request| request.stop.is_stopped())
    }

    pub fn clock_of(&self, url: &str) -> Option<u64> {
        self.last_request(url).map(|request| request.clock)
    }

    pub fn decode_calls(&self) -> usize {
        self.script.decode_calls.load(Ordering::SeqCst)
    }

    pub fn live_voices(&self) -> usize {
        self.script.live_voices.load(Ordering::SeqCst)
    }

    pub fn unlock_calls(&self) -> usize {
        self.script.unlock_calls.load(Ordering::SeqCst)
    }

    pub fn stop_all_calls(&self) -> usize {
        self.script.stop_all_calls.load(Ordering::SeqCst)
    }

    pub fn reject_unlock(&self, reject: bool) {
        self.script.reject_unlock.store(reject, Ordering::SeqCst);
    }

    /// State of the most recent voice decoded from `url`
    pub fn voice(&self, url: &str) -> Option<VoiceState> {
        self.script
            .voices
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _)| u == url)
            .map(|(_, state)| state.lock().unwrap().clone())
    }

    /// Mark the most recent voice for `url` as played out
    pub fn finish(&self, url: &str) {
        if let Some((_, state)) = self
            .script
            .voices
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _)| u == url)
        {
            state.lock().unwrap().finished = true;
        }
    }
}

fn spawn_voice(script: &Arc<Script>, url: &str) -> ScriptedVoice {
    let duration = script
        .durations
        .lock()
        .unwrap()
        .get(url)
        .copied()
        .unwrap_or(Duration::from_secs(180));
    let state = Arc::new(Mutex::new(VoiceState {
        volume: 1.0,
        ..Default::default()
    }));
    script
        .voices
        .lock()
        .unwrap()
        .push((url.to_string(), Arc::clone(&state)));
    script.live_voices.fetch_add(1, Ordering::SeqCst);
    ScriptedVoice {
        state,
        duration,
        script: Arc::clone(script),
    }
}

impl AudioBackend for ScriptedBackend {
    fn decode(&self, request: DecodeRequest) -> DecodeFuture {
        self.script.decode_calls.fetch_add(1, Ordering::SeqCst);
        self.script.requests.lock().unwrap().push(request.clone());
        let script = Arc::clone(&self.script);
        let url = request.url;

        let reply = if script.auto_resolve.load(Ordering::SeqCst) {
            None
        } else {
            let (tx, rx) = oneshot::channel();
            script.pending.lock().unwrap().push(PendingDecode {
                url: url.clone(),
                reply: tx,
            });
            Some(rx)
        };

        async move {
            if let Some(reply) = reply {
                match reply.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(LoadError::Backend("decode abandoned".to_string())),
                }
            }
            Ok(Box::new(spawn_voice(&script, &url)) as Box<dyn Voice>)
        }
        .boxed()
    }

    fn unlock(&self) -> Result<(), PlaybackError> {
        self.script.unlock_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.reject_unlock.load(Ordering::SeqCst) {
            Err(PlaybackError::Unlock("scripted rejection".to_string()))
        } else {
            Ok(())
        }
    }

    fn stop_all(&self) {
        self.script.stop_all_calls.fetch_add(1, Ordering::SeqCst);
        for (_, state) in self.script.voices.lock().unwrap().iter() {
            state.lock().unwrap().playing = false;
        }
    }
}

struct ScriptedVoice {
    state: Arc<Mutex<VoiceState>>,
    duration: Duration,
    script: Arc<Script>,
}

impl Voice for ScriptedVoice {
    fn play(&mut self) {
        self.state.lock().unwrap().playing = true;
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().playing = false;
    }

    fn seek(&mut self, position: Duration) {
        let mut state = self.state.lock().unwrap();
        state.position = position.min(self.duration);
        state.finished = false;
    }

    fn position(&self) -> Duration {
        self.state.lock().unwrap().position
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().unwrap().volume = volume;
    }

    fn is_finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }

    fn release(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.released = true;
        state.playing = false;
    }
}

impl Drop for ScriptedVoice {
    fn drop(&mut self) {
        self.script.live_voices.fetch_sub(1, Ordering::SeqCst);
    }
}
