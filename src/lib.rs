//! # mdspeak
//!
//! Read Markdown and plain-text documents aloud through a local speech
//! engine, or export them to a single MP3 file through a network
//! text-to-speech service.
//!
//! ## Quick start
//!
//! ```no_run
//! use mdspeak::{DocumentSet, Settings};
//!
//! let settings = Settings::load(None).unwrap();
//! let mut docs = DocumentSet::new();
//! docs.add("README.md").unwrap();
//!
//! let conversion = docs.convert(&settings.formatter(), &settings.detector()).unwrap();
//! println!("[{}]\n{}", conversion.language, conversion.text);
//! ```
//!
//! Live playback runs on a background worker:
//!
//! ```no_run
//! use std::sync::Arc;
//! use mdspeak::{EspeakCommand, PlaybackDriver, PlaybackEvent};
//!
//! let (mut driver, events) = PlaybackDriver::new(Arc::new(EspeakCommand::default()));
//! driver.start("Title (level 1)\n\nSome text. More text.", "en").unwrap();
//! while let Ok(event) = events.recv() {
//!     if !matches!(event, PlaybackEvent::Started { .. }) {
//!         break;
//!     }
//! }
//! ```
//!
//! ## Pipeline
//! 1. **Normalisation**: fenced and inline code wrapped in HTML code tags.
//! 2. **Conversion**: Markdown → HTML (pulldown-cmark) → plain text that keeps
//!    headings, list items and code fences as line syntax.
//! 3. **Formatting**: decimals, headings, list items and code rewritten into
//!    speakable markers (`(level n)`, `•`, `Item n:`, `[CODE BLOCK: …]`).
//! 4. **Language detection**: whatlang on a leading sample, `en` fallback.
//! 5. **Playback**: paragraph by paragraph on a worker thread, with prosody
//!    by marker, cancellable between units.
//! 6. **Export**: fixed-size chunks → SSML → one HTTP call each → in-order
//!    byte concatenation into the destination file.
//!
//! ## Engines
//! | Engine                   | Requirement                                        |
//! |--------------------------|----------------------------------------------------|
//! | [`EspeakCommand`]        | `espeak-ng` (or a compatible program) on `$PATH`   |
//! | `libespeak::LibEspeak`   | `espeak` feature; `libespeak-ng` at build time     |

pub mod config;
pub mod convert;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod format;
pub mod lang;
pub mod markers;
pub mod normalize;
pub mod playback;
pub mod ssml;
pub mod synth;

// In-process libespeak-ng; build.rs links the library only with this feature.
#[cfg(feature = "espeak")]
pub mod libespeak;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use config::Settings;
pub use document::{Conversion, Document, DocumentKind, DocumentSet};
pub use engine::{EspeakCommand, SpeechEngine};
pub use error::{ErrorKind, SpeakError};
pub use export::{ExportReport, Exporter};
pub use format::SpeechFormatter;
pub use lang::LanguageDetector;
pub use playback::{PlaybackDriver, PlaybackEvent, PlaybackState};
pub use synth::{Backend, Synthesizer};
