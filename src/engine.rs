//! Local speech engines used for live playback.
//!
//! [`SpeechEngine`] is the seam the playback driver talks to.  Every method
//! takes `&self`: the driver's worker thread blocks inside [`say`] while the
//! front-end thread may call [`stop`] at any moment.
//!
//! [`say`]: SpeechEngine::say
//! [`stop`]: SpeechEngine::stop

use std::{
    io::{ErrorKind, Write},
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::error::SpeakError;

/// Slowest and fastest rate exposed to the user, in words per minute.
pub const MIN_RATE: u32 = 100;
pub const MAX_RATE: u32 = 300;
pub const DEFAULT_RATE: u32 = 175;

/// How often a running utterance is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub trait SpeechEngine: Send + Sync {
    /// Speaking rate in words per minute.
    fn set_rate(&self, wpm: u32);

    /// Volume in `0.0..=1.0`.
    fn set_volume(&self, volume: f32);

    /// Voice name; espeak voices are named by language code.
    fn set_voice(&self, voice: &str);

    /// Speak `text`, blocking until it has been spoken or [`stop`] is called.
    ///
    /// [`stop`]: SpeechEngine::stop
    fn say(&self, text: &str) -> Result<()>;

    /// Halt the current utterance immediately.
    fn stop(&self);
}

/// Rate/volume/voice as last set.
#[derive(Debug, Clone)]
pub(crate) struct VoiceParams {
    pub rate: u32,
    pub volume: f32,
    pub voice: String,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self { rate: DEFAULT_RATE, volume: 1.0, voice: crate::lang::DEFAULT_LANGUAGE.to_string() }
    }
}

impl VoiceParams {
    /// espeak amplitude: 0–200, 100 is the default loudness.
    pub fn amplitude(&self) -> u32 {
        (self.volume.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EspeakCommand: one `espeak-ng` process per utterance
// ─────────────────────────────────────────────────────────────────────────────

/// Speaks through the `espeak-ng` program (or any CLI-compatible one).
///
/// Text goes in over stdin so it can never be mistaken for an option.
pub struct EspeakCommand {
    program: String,
    params: Mutex<VoiceParams>,
    child: Mutex<Option<Child>>,
    halted: AtomicBool,
}

impl EspeakCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            params: Mutex::new(VoiceParams::default()),
            child: Mutex::new(None),
            halted: AtomicBool::new(false),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns `true` if the program can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn params(&self) -> std::sync::MutexGuard<'_, VoiceParams> {
        self.params.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn spawn(&self, text: &str) -> Result<Child> {
        let params = self.params().clone();
        let mut child = Command::new(&self.program)
            .arg("-s")
            .arg(params.rate.to_string())
            .arg("-a")
            .arg(params.amplitude().to_string())
            .arg("-v")
            .arg(&params.voice)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => anyhow::Error::new(SpeakError::EngineUnavailable(
                    format!("'{}' not found on $PATH", self.program),
                )),
                _ => anyhow::Error::new(e).context(format!("Cannot start '{}'", self.program)),
            })?;

        // Dropping stdin closes it, which tells the program the text is complete.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e).with_context(|| format!("Cannot send text to '{}'", self.program));
            }
        }
        Ok(child)
    }

    /// Track `child` until it exits or `stop` kills it.
    fn wait_for(&self, child: Child) -> Result<()> {
        *self.child.lock().unwrap_or_else(|p| p.into_inner()) = Some(child);

        // A stop() that ran while the child was starting found nothing to kill.
        if self.halted.load(Ordering::SeqCst) {
            self.stop();
            return Ok(());
        }

        loop {
            {
                let mut slot = self.child.lock().unwrap_or_else(|p| p.into_inner());
                let Some(child) = slot.as_mut() else {
                    // Taken and killed by stop().
                    return Ok(());
                };
                if let Some(status) = child.try_wait().context("Cannot wait for speech process")? {
                    slot.take();
                    if status.success() || self.halted.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    bail!("'{}' exited with {}", self.program, status);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for EspeakCommand {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

impl SpeechEngine for EspeakCommand {
    fn set_rate(&self, wpm: u32) {
        self.params().rate = wpm;
    }

    fn set_volume(&self, volume: f32) {
        self.params().volume = volume;
    }

    fn set_voice(&self, voice: &str) {
        self.params().voice = voice.to_string();
    }

    fn say(&self, text: &str) -> Result<()> {
        self.halted.store(false, Ordering::SeqCst);
        let child = self.spawn(text)?;
        debug!("{} speaking {} chars", self.program, text.len());
        self.wait_for(child)
    }

    fn stop(&self) {
        self.halted.store(true, Ordering::SeqCst);
        let taken = self.child.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(mut child) = taken {
            let _ = child.kill();
            let _ = child.wait();
            debug!("{} stopped", self.program);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
