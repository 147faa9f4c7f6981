//! In-process playback through the `libespeak-ng` C library.
//!
//! Enabled by the `espeak` feature; `build.rs` finds and links the library.
//! Speech is queued with `espeak_Synth` in asynchronous playback mode and
//! [`say`](LibEspeak::say) then blocks in `espeak_Synchronize` until the audio
//! has played, which leaves another thread free to call `espeak_Cancel`.

use std::{
    ffi::CString,
    os::raw::{c_char, c_int, c_uint, c_void},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::engine::{SpeechEngine, VoiceParams};

// ─── FFI bindings ─────────────────────────────────────────────────────────────
// Linking is handled by build.rs.

extern "C" {
    /// Returns the sample rate on success, `EE_INTERNAL_ERROR` (-1) on failure.
    fn espeak_Initialize(output: c_int, buflength: c_int, path: *const c_char, options: c_int) -> c_int;

    fn espeak_SetParameter(parameter: c_int, value: c_int, relative: c_int) -> c_int;

    fn espeak_SetVoiceByName(name: *const c_char) -> c_int;

    fn espeak_Synth(
        text: *const c_void,
        size: usize,
        position: c_uint,
        position_type: c_int,
        end_position: c_uint,
        flags: c_uint,
        unique_identifier: *mut c_uint,
        user_data: *mut c_void,
    ) -> c_int;

    /// Blocks until all queued speech has been played.
    fn espeak_Synchronize() -> c_int;

    /// Stops speech immediately; safe to call from another thread.
    fn espeak_Cancel() -> c_int;
}

/// `espeak_AUDIO_OUTPUT`: play through the sound device, asynchronously.
const AUDIO_OUTPUT_PLAYBACK: c_int = 0;
const EE_OK: c_int = 0;
const ESPEAK_RATE: c_int = 1;
const ESPEAK_VOLUME: c_int = 2;
const POS_CHARACTER: c_int = 1;
const ESPEAK_CHARS_UTF8: c_uint = 1;

// ─── Global state ─────────────────────────────────────────────────────────────

/// Serialises parameter changes and synthesis submission.  espeak-ng keeps
/// global state; `espeak_Cancel` deliberately does not take this lock.
static LOCK: Mutex<()> = Mutex::new(());

static INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();

static DATA_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Set the `espeak-ng-data` directory.  Only needed when the library's
/// compiled-in path is wrong; no effect once the library is initialised.
pub fn set_data_path(path: &Path) {
    let _ = DATA_PATH.set(path.to_path_buf());
}

fn do_init() -> std::result::Result<(), String> {
    let path_cstr: Option<CString> = match DATA_PATH.get() {
        Some(p) => Some(
            CString::new(p.to_string_lossy().as_bytes())
                .map_err(|_| "espeak data path contains a null byte".to_string())?,
        ),
        None => None,
    };
    let path_ptr: *const c_char = path_cstr.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());

    let rate = unsafe { espeak_Initialize(AUDIO_OUTPUT_PLAYBACK, 0, path_ptr, 0) };
    if rate < 0 {
        return Err(format!("espeak_Initialize failed (status {})", rate));
    }
    debug!("libespeak-ng initialised at {} Hz", rate);
    Ok(())
}

fn ensure_init() -> Result<()> {
    INIT.get_or_init(do_init)
        .as_ref()
        .map(|_| ())
        .map_err(|e| anyhow!("espeak-ng: {}", e))
}

/// Returns `true` if libespeak-ng initialises successfully.
pub fn is_available() -> bool {
    let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
    ensure_init().is_ok()
}

// ─── Engine ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct LibEspeak {
    params: Mutex<VoiceParams>,
}

impl LibEspeak {
    pub fn new() -> Result<Self> {
        let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
        ensure_init()?;
        Ok(Self::default())
    }

    fn params(&self) -> std::sync::MutexGuard<'_, VoiceParams> {
        self.params.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SpeechEngine for LibEspeak {
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
        let params = self.params().clone();
        let voice = CString::new(params.voice.as_str())
            .map_err(|_| anyhow!("voice name contains a null byte"))?;
        let text_c = CString::new(text).map_err(|_| anyhow!("say: text contains a null byte"))?;

        {
            let _guard = LOCK.lock().unwrap_or_else(|p| p.into_inner());
            ensure_init()?;
            unsafe {
                if espeak_SetVoiceByName(voice.as_ptr()) != EE_OK {
                    return Err(anyhow!("espeak-ng has no voice '{}'", params.voice));
                }
                espeak_SetParameter(ESPEAK_RATE, params.rate as c_int, 0);
                espeak_SetParameter(ESPEAK_VOLUME, params.amplitude() as c_int, 0);

                let bytes = text_c.as_bytes_with_nul();
                let rc = espeak_Synth(
                    text_c.as_ptr() as *const c_void,
                    bytes.len(),
                    0,
                    POS_CHARACTER,
                    0,
                    ESPEAK_CHARS_UTF8,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                );
                if rc != EE_OK {
                    return Err(anyhow!("espeak_Synth failed (rc {})", rc));
                }
            }
        }

        unsafe { espeak_Synchronize() };
        Ok(())
    }

    fn stop(&self) {
        unsafe { espeak_Cancel() };
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability() {
        // If the crate linked (build succeeded), the library is present.
        assert!(is_available(), "libespeak-ng linked but failed to initialise");
    }

    #[test]
    fn test_rejects_null_bytes() {
        let engine = LibEspeak::new().expect("init failed");
        assert!(engine.say("a\0b").is_err());
    }
}
