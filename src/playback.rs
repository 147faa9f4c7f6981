//! Live playback through a local [`SpeechEngine`].
//!
//! The driver is a small state machine:
//!
//! ```text
//!   Idle ──start──▶ Speaking ──(text spoken)──▶ Idle
//!                      │
//!                      └──stop──▶ Stopped ──(worker exits)──▶ Idle
//! ```
//!
//! `start` hands the text to exactly one background worker together with a
//! fresh [`CancelToken`].  The worker speaks paragraph by paragraph, checking
//! the token before every unit of speech, so a stop takes effect at the next
//! boundary (and immediately, if the engine honours [`SpeechEngine::stop`]).
//! Outcomes come back to the owning thread as [`PlaybackEvent`]s.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    engine::{SpeechEngine, DEFAULT_RATE, MAX_RATE, MIN_RATE},
    error::SpeakError,
    markers::{paragraphs, Marker},
};

/// Pause before each list item or code block.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(300);

/// Heading emphasis: this much slower (wpm) and louder.
const HEADING_RATE_DROP: u32 = 40;
const HEADING_VOLUME_BOOST: f32 = 0.2;

const PAUSE_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Speaking,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started { language: String },
    /// All text was spoken.
    Finished,
    /// The session ended because of [`PlaybackDriver::stop`].
    Stopped,
    /// The engine failed; the session is over.
    Failed(String),
}

/// Cooperative cancellation flag shared with one worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Rate (wpm) and volume (0–1): the two sliders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prosody {
    pub rate: u32,
    pub volume: f32,
}

impl Default for Prosody {
    fn default() -> Self {
        Self { rate: DEFAULT_RATE, volume: 1.0 }
    }
}

impl Prosody {
    pub fn new(rate: u32, volume: f32) -> Self {
        Self { rate: rate.clamp(MIN_RATE, MAX_RATE), volume: volume.clamp(0.0, 1.0) }
    }

    /// Prosody for a paragraph: headings are slower and louder.
    pub fn for_marker(&self, marker: Marker) -> Self {
        match marker {
            Marker::Heading(_) => Self {
                rate: self.rate.saturating_sub(HEADING_RATE_DROP).max(MIN_RATE),
                volume: (self.volume + HEADING_VOLUME_BOOST).min(1.0),
            },
            _ => *self,
        }
    }
}

/// Split on terminal punctuation (`.`, `!`, `?`, `…`) followed by whitespace.
/// The punctuation stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?' | '…') {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek() {
            if next.is_whitespace() {
                let sentence = text[start..next_idx].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next_idx;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Units of speech in one paragraph, in order.
fn speech_units(paragraph: &str, marker: Marker) -> Vec<&str> {
    match marker {
        Marker::Heading(_) | Marker::CodeBlock => vec![paragraph],
        Marker::Bullet | Marker::Numbered(_) => {
            paragraph.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
        }
        Marker::Plain => split_sentences(paragraph),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

struct Shared {
    state: Mutex<PlaybackState>,
    prosody: Mutex<Prosody>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn prosody(&self) -> MutexGuard<'_, Prosody> {
        self.prosody.lock().unwrap_or_else(|p| p.into_inner())
    }
}

struct Session {
    engine: Arc<dyn SpeechEngine>,
    shared: Arc<Shared>,
    token: CancelToken,
    pause: Duration,
    events: Sender<PlaybackEvent>,
}

impl Session {
    fn run(self, text: String) {
        let outcome = self.speak(&text);

        let event = match outcome {
            Ok(()) if self.token.is_cancelled() => PlaybackEvent::Stopped,
            Ok(()) => PlaybackEvent::Finished,
            Err(e) => {
                warn!("Playback failed: {e:#}");
                PlaybackEvent::Failed(format!("{e:#}"))
            }
        };
        info!("Playback session ended: {:?}", event);

        // State goes back to Idle before the event is visible.
        *self.shared.state() = PlaybackState::Idle;
        let _ = self.events.send(event);
    }

    fn speak(&self, text: &str) -> Result<()> {
        for paragraph in paragraphs(text) {
            if self.token.is_cancelled() {
                return Ok(());
            }
            let marker = Marker::classify(paragraph);
            // Re-read every paragraph so slider changes apply from the next one.
            let prosody = self.shared.prosody().for_marker(marker);
            self.engine.set_rate(prosody.rate);
            self.engine.set_volume(prosody.volume);

            for unit in speech_units(paragraph, marker) {
                if marker.wants_pause() {
                    self.pause();
                }
                if self.token.is_cancelled() {
                    return Ok(());
                }
                debug!("Speaking {:?}: {:?}", marker, unit);
                self.engine.say(unit)?;
            }
        }
        Ok(())
    }

    fn pause(&self) {
        let mut left = self.pause;
        while !left.is_zero() && !self.token.is_cancelled() {
            let slice = left.min(PAUSE_SLICE);
            thread::sleep(slice);
            left -= slice;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PlaybackDriver
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the playback state; all control goes through `start` / `stop` /
/// `status`.
pub struct PlaybackDriver {
    engine: Arc<dyn SpeechEngine>,
    shared: Arc<Shared>,
    voices: HashMap<String, String>,
    pause: Duration,
    events: Sender<PlaybackEvent>,
    worker: Option<JoinHandle<()>>,
    token: CancelToken,
}

impl PlaybackDriver {
    /// Create a driver and the receiver its events arrive on.
    pub fn new(engine: Arc<dyn SpeechEngine>) -> (Self, Receiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::channel();
        let driver = Self {
            engine,
            shared: Arc::new(Shared {
                state: Mutex::new(PlaybackState::Idle),
                prosody: Mutex::new(Prosody::default()),
            }),
            voices: HashMap::new(),
            pause: DEFAULT_PAUSE,
            events: tx,
            worker: None,
            token: CancelToken::default(),
        };
        (driver, rx)
    }

    /// Language code → voice name overrides.
    pub fn with_voices(mut self, voices: HashMap<String, String>) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn status(&self) -> PlaybackState {
        *self.shared.state()
    }

    pub fn prosody(&self) -> Prosody {
        *self.shared.prosody()
    }

    pub fn set_rate(&self, wpm: u32) {
        self.shared.prosody().rate = wpm.clamp(MIN_RATE, MAX_RATE);
    }

    pub fn set_volume(&self, volume: f32) {
        self.shared.prosody().volume = volume.clamp(0.0, 1.0);
    }

    /// Voice for a language: configured override, else the code itself.
    pub fn voice_for(&self, language: &str) -> String {
        self.voices.get(language).cloned().unwrap_or_else(|| language.to_string())
    }

    /// Begin speaking `text`.  Rejected while a session is speaking.
    pub fn start(&mut self, text: &str, language: &str) -> Result<(), SpeakError> {
        if self.status() == PlaybackState::Speaking {
            warn!("Playback already running, start ignored");
            return Err(SpeakError::AlreadySpeaking);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeakError::EmptyText);
        }

        // A stopped worker may still be unwinding; only one may ever run.
        self.join_worker();

        let voice = self.voice_for(language);
        self.engine.set_voice(&voice);

        let token = CancelToken::default();
        let session = Session {
            engine: Arc::clone(&self.engine),
            shared: Arc::clone(&self.shared),
            token: token.clone(),
            pause: self.pause,
            events: self.events.clone(),
        };

        *self.shared.state() = PlaybackState::Speaking;
        let owned = text.to_string();
        let spawned = thread::Builder::new()
            .name("mdspeak-playback".to_string())
            .spawn(move || session.run(owned));
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.token = token;
            }
            Err(e) => {
                *self.shared.state() = PlaybackState::Idle;
                return Err(SpeakError::EngineUnavailable(format!(
                    "cannot start playback thread: {e}"
                )));
            }
        }

        info!("Playback started (language '{}', voice '{}')", language, voice);
        let _ = self.events.send(PlaybackEvent::Started { language: language.to_string() });
        Ok(())
    }

    /// Halt the current session.
    pub fn stop(&mut self) -> Result<(), SpeakError> {
        {
            let mut state = self.shared.state();
            if *state != PlaybackState::Speaking {
                warn!("Playback not running, stop ignored");
                return Err(SpeakError::NotSpeaking);
            }
            *state = PlaybackState::Stopped;
        }
        self.token.cancel();
        self.engine.stop();
        info!("Playback stop requested");
        Ok(())
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Playback worker panicked");
                *self.shared.state() = PlaybackState::Idle;
            }
        }
    }
}

impl Drop for PlaybackDriver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.token.cancel();
            self.engine.stop();
            self.join_worker();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
