use super::backend::AudioBackend;
use super::handle::AudioTrackHandle;
use super::track::{DualRole, PlayerMode, Song, SongId, TrackRole};
use crate::error::LoadError;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The handles that belong to one song.
#[derive(Debug, Clone)]
pub enum TrackSet {
    Classic(AudioTrackHandle),
    Dual {
        before: AudioTrackHandle,
        after: AudioTrackHandle,
    },
}

impl TrackSet {
    /// The clock all position math reads from: "before" when both exist
    pub fn canonical(&self) -> &AudioTrackHandle {
        match self {
            TrackSet::Classic(handle) => handle,
            TrackSet::Dual { before, .. } => before,
        }
    }

    pub fn dual(&self, role: DualRole) -> Option<&AudioTrackHandle> {
        match (self, role) {
            (TrackSet::Dual { before, .. }, DualRole::Before) => Some(before),
            (TrackSet::Dual { after, .. }, DualRole::After) => Some(after),
            (TrackSet::Classic(_), _) => None,
        }
    }

    pub fn is_dual(&self) -> bool {
        matches!(self, TrackSet::Dual { .. })
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioTrackHandle> {
        let (first, second) = match self {
            TrackSet::Classic(handle) => (handle, None),
            TrackSet::Dual { before, after } => (before, Some(after)),
        };
        std::iter::once(first).chain(second)
    }

    pub fn play_all(&self) {
        self.iter().for_each(AudioTrackHandle::play);
    }

    pub fn pause_all(&self) {
        self.iter().for_each(AudioTrackHandle::pause);
    }

    pub fn stop_all(&self) {
        self.iter().for_each(AudioTrackHandle::stop);
    }

    pub fn unload_all(&self) {
        for handle in self.iter() {
            handle.stop();
            handle.unload();
        }
    }

    /// Put every handle on the same absolute position
    pub fn seek_all(&self, seconds: f64) {
        for handle in self.iter() {
            handle.seek_to(seconds);
        }
    }
}

/// Result of one load attempt, delivered back to the owner's event loop.
#[derive(Debug)]
pub struct LoadOutcome {
    pub generation: u64,
    pub song_id: SongId,
    pub tracks: TrackSet,
    pub result: Result<(), LoadError>,
}

/// An attempt that has been started but not yet matched with its outcome.
#[derive(Debug)]
pub struct PendingLoad {
    generation: u64,
    song_id: SongId,
    tracks: TrackSet,
    task: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl PendingLoad {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn song_id(&self) -> &SongId {
        &self.song_id
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    /// Abort the task and unload every handle this attempt created, which
    /// also raises the stop flag of any decode still running.
    /// Safe to call any number of times.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if !self.cancelled {
            self.cancelled = true;
            self.tracks.unload_all();
            debug!("Cancelled load of {} (generation {})", self.song_id, self.generation);
        }
    }
}

/// Loads a song's track(s) as one unit.
///
/// Dual songs are joined: the attempt only succeeds once both before and
/// after resolve, and fails as a whole if either fails. At most one attempt
/// is in flight; starting another cancels the previous one first.
pub struct DualTrackLoader {
    backend: Arc<dyn AudioBackend>,
    outcomes_tx: mpsc::UnboundedSender<LoadOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<LoadOutcome>,
    in_flight: Option<PendingLoad>,
}

impl DualTrackLoader {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            outcomes_tx,
            outcomes_rx,
            in_flight: None,
        }
    }

    pub fn in_flight(&self) -> Option<&PendingLoad> {
        self.in_flight.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start loading `song`. Must run inside a tokio runtime.
    pub fn start_load(
        &mut self,
        song: &Song,
        mode: PlayerMode,
        generation: u64,
    ) -> Result<&PendingLoad, LoadError> {
        // The superseded attempt is torn down before any new handle exists
        self.cancel();

        let (tracks, load) = self.prepare(song, mode, generation)?;

        let tx = self.outcomes_tx.clone();
        let song_id = song.id.clone();
        let outcome_tracks = tracks.clone();
        let outcome_song = song_id.clone();
        let task = tokio::spawn(async move {
            let result = load.await;
            let _ = tx.send(LoadOutcome {
                generation,
                song_id: outcome_song,
                tracks: outcome_tracks,
                result,
            });
        });

        info!(
            "Loading '{}' by {} ({} track(s), generation {})",
            song.display_title(),
            song.display_artist(),
            if tracks.is_dual() { 2 } else { 1 },
            generation
        );

        Ok(self.in_flight.insert(PendingLoad {
            generation,
            song_id,
            tracks,
            task: Some(task),
            cancelled: false,
        }))
    }

    fn prepare(
        &self,
        song: &Song,
        mode: PlayerMode,
        clock: u64,
    ) -> Result<(TrackSet, BoxFuture<'static, Result<(), LoadError>>), LoadError> {
        let backend = self.backend.as_ref();

        if mode.is_dual() {
            let before_url = song
                .source_url(TrackRole::Before)
                .ok_or(LoadError::MissingTrack("before"))?;
            let after_url = song
                .source_url(TrackRole::After)
                .ok_or(LoadError::MissingTrack("after"))?;

            let before = AudioTrackHandle::new(TrackRole::Before);
            let after = AudioTrackHandle::new(TrackRole::After);
            let joined = future::try_join(
                before.load(backend, before_url, clock),
                after.load(backend, after_url, clock),
            )
            .map(|result| result.map(|_| ()))
            .boxed();

            Ok((TrackSet::Dual { before, after }, joined))
        } else {
            let url = song
                .source_url(TrackRole::Classic)
                .ok_or(LoadError::MissingTrack("classic"))?;
            let handle = AudioTrackHandle::new(TrackRole::Classic);
            let load = handle.load(backend, url, clock).boxed();
            Ok((TrackSet::Classic(handle), load))
        }
    }

    /// Cancel whatever is in flight. No-op when idle.
    pub fn cancel(&mut self) {
        if let Some(mut pending) = self.in_flight.take() {
            pending.cancel();
        }
    }

    /// Match an outcome against the in-flight attempt.
    ///
    /// Stale outcomes return `None` after their handles are released. A
    /// current failure also releases its handles, so a partial pair is never
    /// handed out.
    pub fn finish(&mut self, outcome: LoadOutcome) -> Option<Result<TrackSet, LoadError>> {
        let is_current = self
            .in_flight
            .as_ref()
            .is_some_and(|pending| pending.generation == outcome.generation);

        if !is_current {
            debug!(
                "Discarding stale load of {} (generation {})",
                outcome.song_id, outcome.generation
            );
            outcome.tracks.unload_all();
            return None;
        }

        self.in_flight = None;
        match outcome.result {
            Ok(()) => Some(Ok(outcome.tracks)),
            Err(e) => {
                warn!("Load of {} failed: {}", outcome.song_id, e);
                outcome.tracks.unload_all();
                Some(Err(e))
            }
        }
    }

    pub fn try_next_outcome(&mut self) -> Option<LoadOutcome> {
        self.outcomes_rx.try_recv().ok()
    }

    pub async fn next_outcome(&mut self) -> Option<LoadOutcome> {
        self.outcomes_rx.recv().await
    }
}

impl Drop for DualTrackLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}
