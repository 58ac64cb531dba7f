// Play analytics - one event per new song load, fire and forget
// The player never fails because a sink did

#[cfg(feature = "analytics")]
pub mod database;

#[cfg(feature = "analytics")]
pub use database::{PlayEvent, PlayLog};

use crate::audio::track::SongId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Where the player is embedded. Decides whether attribution is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum PlaySource {
    LandingPage,
    #[default]
    Embed,
    Dashboard,
}

impl PlaySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaySource::LandingPage => "landingPage",
            PlaySource::Embed => "embed",
            PlaySource::Dashboard => "dashboard",
        }
    }

    /// The dashboard preview is the owner's own view, no branding there
    pub fn shows_attribution(&self) -> bool {
        !matches!(self, PlaySource::Dashboard)
    }
}

impl fmt::Display for PlaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn track_play(&self, player_id: &str, song_id: &SongId, source: PlaySource) -> crate::Result<()>;
}

struct PlayRecord {
    player_id: String,
    song_id: SongId,
    source: PlaySource,
}

/// Front of a writer task that feeds plays to a sink off the caller's thread.
#[derive(Clone)]
pub struct PlayRecorder {
    tx: mpsc::UnboundedSender<PlayRecord>,
}

impl PlayRecorder {
    /// Start the writer. Must run inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn AnalyticsSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PlayRecord>();

        tokio::spawn(async move {
            while let Some(play) = rx.recv().await {
                let sink = Arc::clone(&sink);
                let song_id = play.song_id.clone();
                let written = tokio::task::spawn_blocking(move || {
                    sink.track_play(&play.player_id, &play.song_id, play.source)
                })
                .await;

                match written {
                    Ok(Ok(())) => debug!("Recorded play of {}", song_id),
                    Ok(Err(e)) => warn!("Analytics sink failed for {}: {}", song_id, e),
                    Err(e) => warn!("Analytics write for {} panicked: {}", song_id, e),
                }
            }
            debug!("Analytics writer stopped");
        });

        Self { tx }
    }

    /// Queue one play. Never blocks and never fails the caller.
    pub fn record(&self, player_id: &str, song_id: &SongId, source: PlaySource) {
        let play = PlayRecord {
            player_id: player_id.to_string(),
            song_id: song_id.clone(),
            source,
        };
        if self.tx.send(play).is_err() {
            warn!("Analytics writer is gone, dropping play of {}", song_id);
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Keeps every call; can be told to fail
    #[derive(Default)]
    pub struct RecordingSink {
        pub calls: Mutex<Vec<(String, SongId, PlaySource)>>,
        pub failing: AtomicBool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            let sink = Self::default();
            sink.failing.store(true, Ordering::SeqCst);
            sink
        }

        pub fn songs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, song, _)| song.to_string())
                .collect()
        }

        /// Give the writer task time to deliver `count` calls
        pub async fn wait_for(&self, count: usize) {
            for _ in 0..400 {
                if self.calls.lock().unwrap().len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    impl AnalyticsSink for RecordingSink {
        fn track_play(&self, player_id: &str, song_id: &SongId, source: PlaySource) -> crate::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((player_id.to_string(), song_id.clone(), source));
            if self.failing.load(Ordering::SeqCst) {
                Err(Error::Io(std::io::Error::other("sink offline")))
            } else {
                Ok(())
            }
        }
    }
}
