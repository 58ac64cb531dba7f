// rodio-backed audio engine
// Every song gets one deck: a single sink whose source mixes all of the song's
// decoded tracks from one cursor, so transport and gain changes hit every
// track on the same sample

use super::backend::{AudioBackend, DecodeFuture, DecodeRequest, StopFlag, Voice};
use crate::error::{Error, LoadError, PlaybackError};
use futures::FutureExt;
use rodio::buffer::SamplesBuffer;
use rodio::source::{UniformSourceIterator, Zero};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::debug;

// Frames mixed per lock of the deck; transport changes land on these boundaries
const MIX_FRAMES: usize = 256;
// Decoded samples between two looks at the stop flag
const STOP_CHECK_SAMPLES: usize = 1 << 15;

struct DecodedAudio {
    channels: u16,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl DecodedAudio {
    fn duration(&self) -> Duration {
        let frames = self.samples.len() as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }

    fn matches(&self, channels: u16, sample_rate: u32) -> bool {
        self.channels == channels && self.sample_rate == sample_rate
    }

    /// Resample and remix into the deck's format
    fn conform(self, channels: u16, sample_rate: u32) -> DecodedAudio {
        if self.matches(channels, sample_rate) {
            return self;
        }
        let input = SamplesBuffer::new(self.channels, self.sample_rate, self.samples);
        let samples: Vec<f32> = UniformSourceIterator::<_, f32>::new(input, channels, sample_rate).collect();
        DecodedAudio {
            channels,
            sample_rate,
            samples,
        }
    }
}

struct Lane {
    id: u64,
    samples: Vec<f32>,
    gain: f32,
}

/// Shared transport of one deck. The cursor counts interleaved samples.
struct Mix {
    channels: u16,
    lanes: Vec<Lane>,
    next_lane: u64,
    cursor: usize,
    playing: bool,
    closed: bool,
}

impl Mix {
    fn end(&self) -> usize {
        self.lanes.iter().map(|lane| lane.samples.len()).max().unwrap_or(0)
    }

    fn lane(&self, id: u64) -> Option<&Lane> {
        self.lanes.iter().find(|lane| lane.id == id)
    }

    fn lane_mut(&mut self, id: u64) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|lane| lane.id == id)
    }

    fn render(&mut self, block: &mut Vec<f32>) {
        let len = MIX_FRAMES * self.channels as usize;
        block.clear();

        let end = self.end();
        if !self.playing || self.cursor >= end {
            block.resize(len, 0.0);
            return;
        }

        for _ in 0..len {
            if self.cursor >= end {
                block.push(0.0);
                continue;
            }
            let at = self.cursor;
            let sample = self
                .lanes
                .iter()
                .map(|lane| lane.samples.get(at).map_or(0.0, |s| s * lane.gain))
                .sum();
            block.push(sample);
            self.cursor += 1;
        }
    }
}

fn lock_mix(mix: &Mutex<Mix>) -> MutexGuard<'_, Mix> {
    mix.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the sink pulls from. Never runs dry while the deck is open.
struct DeckSource {
    mix: Arc<Mutex<Mix>>,
    channels: u16,
    sample_rate: u32,
    block: Vec<f32>,
    index: usize,
}

impl Iterator for DeckSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.index >= self.block.len() {
            let mut mix = lock_mix(&self.mix);
            if mix.closed {
                return None;
            }
            mix.render(&mut self.block);
            self.index = 0;
        }
        let sample = self.block.get(self.index).copied();
        self.index += 1;
        sample
    }
}

impl Source for DeckSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// One song on the output: a sink plus the lanes mixed into it.
struct Deck {
    mix: Arc<Mutex<Mix>>,
    sink: Sink,
    channels: u16,
    sample_rate: u32,
}

impl Deck {
    fn start(sink: Sink, channels: u16, sample_rate: u32) -> Arc<Self> {
        let mix = Arc::new(Mutex::new(Mix {
            channels,
            lanes: Vec::new(),
            next_lane: 0,
            cursor: 0,
            playing: false,
            closed: false,
        }));
        sink.append(DeckSource {
            mix: Arc::clone(&mix),
            channels,
            sample_rate,
            block: Vec::new(),
            index: 0,
        });
        sink.play();

        Arc::new(Self {
            mix,
            sink,
            channels,
            sample_rate,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Mix> {
        lock_mix(&self.mix)
    }

    /// Add a lane at the shared cursor. `audio` must already be in the deck's format.
    fn attach(self: &Arc<Self>, audio: DecodedAudio) -> RodioVoice {
        let mut samples = audio.samples;
        let channels = self.channels as usize;
        samples.truncate(samples.len() - samples.len() % channels);
        let len = samples.len();

        let mut mix = self.lock();
        let id = mix.next_lane;
        mix.next_lane += 1;
        mix.lanes.push(Lane {
            id,
            samples,
            gain: 1.0,
        });

        RodioVoice {
            deck: Arc::clone(self),
            lane: id,
            len,
        }
    }

    fn close(&self) {
        {
            let mut mix = self.lock();
            mix.closed = true;
            mix.playing = false;
        }
        self.sink.stop();
    }

    fn samples_to_duration(&self, samples: usize) -> Duration {
        let frames = samples / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    fn duration_to_samples(&self, position: Duration) -> usize {
        let frames = (position.as_secs_f64() * self.sample_rate as f64).floor() as usize;
        frames.saturating_mul(self.channels as usize)
    }
}

/// One track's lane on a deck. Transport calls move the whole deck, so the
/// tracks of a song repeat the same call without drifting apart.
struct RodioVoice {
    deck: Arc<Deck>,
    lane: u64,
    len: usize,
}

impl Voice for RodioVoice {
    fn play(&mut self) {
        self.deck.lock().playing = true;
    }

    fn pause(&mut self) {
        self.deck.lock().playing = false;
    }

    fn seek(&mut self, position: Duration) {
        let target = self.deck.duration_to_samples(position);
        let mut mix = self.deck.lock();
        let end = mix.end();
        mix.cursor = target.min(end - end % self.deck.channels as usize);
    }

    fn position(&self) -> Duration {
        let cursor = self.deck.lock().cursor;
        self.deck.samples_to_duration(cursor.min(self.len))
    }

    fn duration(&self) -> Duration {
        self.deck.samples_to_duration(self.len)
    }

    fn set_volume(&mut self, volume: f32) {
        if let Some(lane) = self.deck.lock().lane_mut(self.lane) {
            lane.gain = volume;
        }
    }

    fn is_finished(&self) -> bool {
        let mix = self.deck.lock();
        mix.lane(self.lane).is_none() || mix.cursor >= self.len
    }

    fn release(&mut self) {
        let emptied = {
            let mut mix = self.deck.lock();
            mix.lanes.retain(|lane| lane.id != self.lane);
            mix.lanes.is_empty()
        };
        if emptied {
            self.deck.close();
        }
    }
}

struct DeckRack {
    stream_handle: OutputStreamHandle,
    decks: Mutex<HashMap<u64, Weak<Deck>>>,
}

impl DeckRack {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Weak<Deck>>> {
        self.decks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The deck for `clock`, opened in the given format if it does not exist yet
    fn deck_for(&self, clock: u64, channels: u16, sample_rate: u32) -> Result<Arc<Deck>, LoadError> {
        let mut decks = self.lock();
        decks.retain(|_, deck| deck.strong_count() > 0);
        if let Some(deck) = decks.get(&clock).and_then(Weak::upgrade) {
            return Ok(deck);
        }

        let sink = Sink::try_new(&self.stream_handle).map_err(|e| LoadError::Backend(e.to_string()))?;
        let deck = Deck::start(sink, channels, sample_rate);
        decks.insert(clock, Arc::downgrade(&deck));
        debug!("Opened deck {} ({} ch @ {} Hz)", clock, channels, sample_rate);
        Ok(deck)
    }

    fn close_all(&self) {
        let mut decks = self.lock();
        for deck in decks.values().filter_map(Weak::upgrade) {
            deck.close();
        }
        decks.clear();
    }
}

/// Shared side of the engine: cheap to clone into load tasks.
pub struct RodioBackend {
    rack: Arc<DeckRack>,
    unlock_duration: Duration,
}

impl AudioBackend for RodioBackend {
    fn decode(&self, request: DecodeRequest) -> DecodeFuture {
        let rack = Arc::clone(&self.rack);

        async move {
            let DecodeRequest { url, clock, stop } = request;
            if stop.is_stopped() {
                return Err(LoadError::Cancelled);
            }

            let bytes = fetch_bytes(&url).await?;
            let decode_url = url.clone();
            let decode_stop = stop.clone();
            let audio = tokio::task::spawn_blocking(move || decode_bytes(&decode_url, bytes, &decode_stop))
                .await
                .map_err(|e| LoadError::Backend(e.to_string()))??;

            let deck = rack.deck_for(clock, audio.channels, audio.sample_rate)?;
            let audio = if audio.matches(deck.channels, deck.sample_rate) {
                audio
            } else {
                debug!(
                    "Converting {} from {} ch @ {} Hz to the deck format",
                    url, audio.channels, audio.sample_rate
                );
                let (channels, sample_rate) = (deck.channels, deck.sample_rate);
                tokio::task::spawn_blocking(move || audio.conform(channels, sample_rate))
                    .await
                    .map_err(|e| LoadError::Backend(e.to_string()))?
            };

            debug!(
                "Decoded {} ({:.1}s) onto deck {}",
                url,
                audio.duration().as_secs_f64(),
                clock
            );
            Ok(Box::new(deck.attach(audio)) as Box<dyn Voice>)
        }
        .boxed()
    }

    fn unlock(&self) -> Result<(), PlaybackError> {
        let sink = Sink::try_new(&self.rack.stream_handle).map_err(|e| PlaybackError::Unlock(e.to_string()))?;
        sink.append(Zero::<f32>::new(2, 44_100).take_duration(self.unlock_duration));
        sink.detach();
        Ok(())
    }

    fn stop_all(&self) {
        self.rack.close_all();
    }
}

/// Owns the output stream; the player container keeps exactly one.
pub struct AudioEngine {
    _stream: OutputStream,
    backend: Arc<RodioBackend>,
}

impl AudioEngine {
    pub fn new(unlock_duration: Duration) -> crate::Result<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| Error::AudioOutput(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            backend: Arc::new(RodioBackend {
                rack: Arc::new(DeckRack {
                    stream_handle,
                    decks: Mutex::new(HashMap::new()),
                }),
                unlock_duration,
            }),
        })
    }

    pub fn backend(&self) -> Arc<dyn AudioBackend> {
        self.backend.clone()
    }

    pub fn stop_all(&self) {
        self.backend.stop_all();
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.backend.stop_all();
    }
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, LoadError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return fetch_remote(url).await;
    }

    let path = url.strip_prefix("file://").unwrap_or(url).to_string();
    tokio::task::spawn_blocking(move || std::fs::read(path))
        .await
        .map_err(|e| LoadError::Backend(e.to_string()))?
        .map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(feature = "remote")]
async fn fetch_remote(url: &str) -> Result<Vec<u8>, LoadError> {
    let fetch_error = |e: reqwest::Error| LoadError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    };
    let response = reqwest::get(url)
        .await
        .map_err(fetch_error)?
        .error_for_status()
        .map_err(fetch_error)?;
    let body = response.bytes().await.map_err(fetch_error)?;
    Ok(body.to_vec())
}

#[cfg(not(feature = "remote"))]
async fn fetch_remote(url: &str) -> Result<Vec<u8>, LoadError> {
    Err(LoadError::UnsupportedUrl(format!(
        "{} (build with the `remote` feature for http sources)",
        url
    )))
}

fn decode_bytes(url: &str, bytes: Vec<u8>, stop: &StopFlag) -> Result<DecodedAudio, LoadError> {
    let decode_error = |reason: String| LoadError::Decode {
        url: url.to_string(),
        reason,
    };

    let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| decode_error(e.to_string()))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();

    let mut samples = Vec::new();
    for (index, sample) in decoder.convert_samples::<f32>().enumerate() {
        if index % STOP_CHECK_SAMPLES == 0 && stop.is_stopped() {
            debug!("Decode of {} stopped after {} samples", url, index);
            return Err(LoadError::Cancelled);
        }
        samples.push(sample);
    }

    if channels == 0 || sample_rate == 0 || samples.is_empty() {
        return Err(decode_error("stream contains no audio".to_string()));
    }

    Ok(DecodedAudio {
        channels,
        sample_rate,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::queue::SourcesQueueOutput;
    use std::io::Write;

    const RATE: u32 = 8_000;

    // No two neighbours equal, so any offset between lanes shows up
    fn pattern(len: usize) -> Vec<f32> {
        (0..len).map(|i| ((i % 97) as f32 + 1.0) / 100.0).collect()
    }

    fn mono(samples: Vec<f32>) -> DecodedAudio {
        DecodedAudio {
            channels: 1,
            sample_rate: RATE,
            samples,
        }
    }

    fn idle_deck() -> (Arc<Deck>, SourcesQueueOutput<f32>) {
        let (sink, output) = Sink::new_idle();
        (Deck::start(sink, 1, RATE), output)
    }

    fn pull(output: &mut SourcesQueueOutput<f32>, count: usize) -> Vec<f32> {
        output.by_ref().take(count).collect()
    }

    fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_pair_stays_aligned_through_transport() {
        let (deck, mut output) = idle_deck();
        let mut before = deck.attach(mono(pattern(5 * RATE as usize)));
        // the second decode lands while the sink is already being pulled
        assert!(pull(&mut output, 100).iter().all(|s| *s == 0.0));
        let inverted = pattern(5 * RATE as usize).into_iter().map(|s| -s).collect();
        let mut after = deck.attach(mono(inverted));

        // an inverted copy on the same cursor cancels out exactly
        before.play();
        after.play();
        assert!(pull(&mut output, 1_000).iter().all(|s| *s == 0.0));
        assert!(before.position() > Duration::ZERO);

        for _ in 0..4 {
            before.pause();
            after.pause();
            pull(&mut output, 300);
            before.play();
            after.play();
            assert!(pull(&mut output, 1_000).iter().all(|s| *s == 0.0));
        }

        before.seek(Duration::from_secs(2));
        after.seek(Duration::from_secs(2));
        assert!(pull(&mut output, 1_000).iter().all(|s| *s == 0.0));
        assert_eq!(before.position(), after.position());

        // and it really was playing: drop one side and the other is heard
        after.set_volume(0.0);
        assert!(pull(&mut output, 1_000).iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_gains_pick_the_audible_lane() {
        let (deck, mut output) = idle_deck();
        let source = pattern(2_000);
        let mut before = deck.attach(mono(source.clone()));
        let mut after = deck.attach(mono(vec![0.5; 2_000]));

        before.set_volume(1.0);
        after.set_volume(0.0);
        before.play();
        after.play();
        assert_eq!(pull(&mut output, 512), source[..512].to_vec());
    }

    #[test]
    fn test_finished_deck_replays_after_rewind() {
        let (deck, mut output) = idle_deck();
        let mut before = deck.attach(mono(pattern(100)));
        let mut after = deck.attach(mono(pattern(80)));
        assert_eq!(before.duration(), Duration::from_secs_f64(100.0 / RATE as f64));

        before.play();
        after.play();
        assert!(!before.is_finished());
        pull(&mut output, 600);
        assert!(before.is_finished());
        assert!(after.is_finished());
        assert_eq!(after.position(), after.duration());
        assert!(pull(&mut output, 512).iter().all(|s| *s == 0.0));

        before.seek(Duration::ZERO);
        after.seek(Duration::ZERO);
        assert!(!before.is_finished());
        assert_eq!(before.position(), Duration::ZERO);
        assert!(pull(&mut output, 512).iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_releasing_every_lane_closes_the_deck() {
        let (deck, _output) = idle_deck();
        let mut before = deck.attach(mono(pattern(100)));
        let mut after = deck.attach(mono(pattern(100)));

        before.release();
        assert!(!deck.lock().closed);
        assert!(before.is_finished());
        after.release();
        assert!(deck.lock().closed);
        assert!(deck.lock().lanes.is_empty());
    }

    #[test]
    fn test_stereo_seek_lands_on_frame_boundary() {
        let (sink, _output) = Sink::new_idle();
        let deck = Deck::start(sink, 2, RATE);
        let mut voice = deck.attach(DecodedAudio {
            channels: 2,
            sample_rate: RATE,
            samples: pattern(2 * RATE as usize + 1),
        });

        assert_eq!(voice.duration(), Duration::from_secs(1));
        voice.seek(Duration::from_secs_f64(0.25));
        assert_eq!(deck.lock().cursor % 2, 0);
        assert_eq!(voice.position(), Duration::from_secs_f64(0.25));
    }

    #[test]
    fn test_conform_remixes_to_deck_channels() {
        let audio = mono(pattern(400)).conform(2, RATE);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, RATE);
        assert_eq!(audio.samples.len() % 2, 0);
        assert!((audio.samples.len() as i64 - 800).abs() <= 4);
    }

    #[test]
    fn test_decode_generated_wav() {
        let samples: Vec<i16> = (0..1_600).map(|i| ((i % 50) * 100) as i16).collect();
        let audio = decode_bytes("tone.wav", wav_bytes(2, RATE, &samples), &StopFlag::new()).unwrap();

        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, RATE);
        assert_eq!(audio.samples.len(), 1_600);
        assert!((audio.duration().as_secs_f64() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        let empty = decode_bytes("empty.wav", wav_bytes(1, RATE, &[]), &StopFlag::new());
        assert!(matches!(empty, Err(LoadError::Decode { .. })));

        let garbage = decode_bytes("noise.bin", vec![7u8; 256], &StopFlag::new());
        assert!(matches!(garbage, Err(LoadError::Decode { .. })));
    }

    #[test]
    fn test_decode_honours_stop_flag() {
        let stop = StopFlag::new();
        stop.stop();
        let samples = vec![1_000i16; 4_000];
        let result = decode_bytes("long.wav", wav_bytes(1, RATE, &samples), &stop);
        assert_eq!(result.err(), Some(LoadError::Cancelled));
    }

    #[tokio::test]
    async fn test_fetch_local_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"riff-ish").unwrap();
        let path = file.path().to_string_lossy().to_string();

        assert_eq!(fetch_bytes(&path).await.unwrap(), b"riff-ish".to_vec());
        assert_eq!(fetch_bytes(&format!("file://{}", path)).await.unwrap(), b"riff-ish".to_vec());

        let missing = fetch_bytes("file:///definitely/not/here.wav").await;
        assert!(matches!(missing, Err(LoadError::Fetch { .. })));
    }
}
