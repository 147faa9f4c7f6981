//! User settings, read from a JSON file.
//!
//! Lookup order: an explicit path (the `--config` flag), then the file named
//! by `$MDSPEAK_CONFIG`, then the built-in defaults.  Every section is
//! optional, and so is every field inside a section.
//!
//! ```json
//! {
//!   "playback": { "rate": 160, "volume": 0.8, "voices": { "ru": "ru+f3" } },
//!   "export":   { "chunk_chars": 180 },
//!   "synth":    { "backend": "ssml", "ssml_url": "http://localhost:5002/api/tts" }
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    engine::{DEFAULT_RATE, MAX_RATE, MIN_RATE},
    format::{FormatterConfig, SpeechFormatter},
    lang::{LanguageDetector, DEFAULT_LANGUAGE, DEFAULT_SAMPLE_CHARS},
    playback::DEFAULT_PAUSE,
    synth::Backend,
};

/// Environment variable naming a settings file.
pub const CONFIG_ENV: &str = "MDSPEAK_CONFIG";

/// Characters per export chunk.
pub const DEFAULT_CHUNK_CHARS: usize = 100;

pub const DEFAULT_TRANSLATE_URL: &str = "https://translate.google.com/translate_tts";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub playback: PlaybackSettings,
    pub export: ExportSettings,
    pub synth: SynthSettings,
    pub language: LanguageSettings,
    pub formatter: FormatterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Words per minute, 100–300.
    pub rate: u32,
    /// 0.0–1.0.
    pub volume: f32,
    /// Program run per utterance.
    pub engine: String,
    /// Pause before list items and code blocks.
    pub pause_ms: u64,
    /// Language code → voice name.
    pub voices: HashMap<String, String>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            volume: 1.0,
            engine: "espeak-ng".to_string(),
            pause_ms: DEFAULT_PAUSE.as_millis() as u64,
            voices: HashMap::new(),
        }
    }
}

impl PlaybackSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub chunk_chars: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self { chunk_chars: DEFAULT_CHUNK_CHARS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthSettings {
    pub backend: Backend,
    pub translate_url: String,
    pub user_agent: String,
    pub ssml_url: Option<String>,
    /// Extra request headers for the ssml backend (API keys and the like).
    pub headers: BTreeMap<String, String>,
    pub timeout_secs: u64,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            translate_url: DEFAULT_TRANSLATE_URL.to_string(),
            user_agent: concat!("mdspeak/", env!("CARGO_PKG_VERSION")).to_string(),
            ssml_url: None,
            headers: BTreeMap::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageSettings {
    /// Used when detection is unreliable.
    pub default: String,
    /// Characters of text inspected.
    pub sample_chars: usize,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self { default: DEFAULT_LANGUAGE.to_string(), sample_chars: DEFAULT_SAMPLE_CHARS }
    }
}

impl Settings {
    /// Resolve and load the settings file, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path: Option<PathBuf> = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from),
        };
        match path {
            Some(p) => Self::from_file(&p),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let rate = self.playback.rate;
        if !(MIN_RATE..=MAX_RATE).contains(&rate) {
            bail!("playback.rate must be between {} and {}, got {}", MIN_RATE, MAX_RATE, rate);
        }
        let volume = self.playback.volume;
        if !(0.0..=1.0).contains(&volume) {
            bail!("playback.volume must be between 0 and 1, got {}", volume);
        }
        if self.export.chunk_chars == 0 {
            bail!("export.chunk_chars must be greater than 0");
        }
        if self.language.default.trim().is_empty() {
            bail!("language.default must not be empty");
        }
        Ok(())
    }

    pub fn formatter(&self) -> SpeechFormatter {
        SpeechFormatter::with_config(self.formatter.clone())
    }

    pub fn detector(&self) -> LanguageDetector {
        LanguageDetector::new(self.language.sample_chars, self.language.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.playback.rate, DEFAULT_RATE);
        assert_eq!(s.export.chunk_chars, DEFAULT_CHUNK_CHARS);
        assert_eq!(s.synth.backend, Backend::Translate);
        assert_eq!(s.playback.pause(), Duration::from_millis(300));
    }

    #[test]
    fn test_partial_file() {
        let file = write_config(r#"{ "playback": { "rate": 150 }, "synth": { "backend": "ssml" } }"#);
        let s = Settings::from_file(file.path()).unwrap();
        assert_eq!(s.playback.rate, 150);
        assert_eq!(s.playback.volume, 1.0);
        assert_eq!(s.synth.backend, Backend::Ssml);
        assert_eq!(s.synth.translate_url, DEFAULT_TRANSLATE_URL);
        assert!(s.formatter.annotate_headings);
    }

    #[test]
    fn test_explicit_path_wins() {
        let file = write_config(r#"{ "export": { "chunk_chars": 42 } }"#);
        let s = Settings::load(Some(file.path())).unwrap();
        assert_eq!(s.export.chunk_chars, 42);
    }

    #[test]
    fn test_out_of_range_rate() {
        let file = write_config(r#"{ "playback": { "rate": 900 } }"#);
        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("playback.rate"), "got: {err:#}");
    }

    #[test]
    fn test_out_of_range_volume() {
        let mut s = Settings::default();
        s.playback.volume = 1.5;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_zero_chunk() {
        let mut s = Settings::default();
        s.export.chunk_chars = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_chars"), "got: {err:#}");
    }

    #[test]
    fn test_malformed_json() {
        let file = write_config("{ not json");
        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"), "got: {err:#}");
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::from_file(Path::new("/no/such/mdspeak.json")).unwrap_err();
        assert!(err.to_string().contains("Cannot read"), "got: {err:#}");
    }

    #[test]
    fn test_detector_uses_language_settings() {
        let mut s = Settings::default();
        s.language.default = "de".into();
        assert_eq!(s.detector().detect("kurz"), "de");
    }
}
