//! Export formatted text to a single MP3 file.
//!
//! ## Pipeline
//! 1. **Chunking**: the text is cut into pieces of at most `chunk_chars`
//!    characters, ignoring paragraph boundaries.
//! 2. **Markup**: each chunk gets its SSML form (see [`crate::ssml`]).
//! 3. **Synthesis**: one network call per chunk, bytes written to a
//!    temporary file.
//! 4. **Concat**: temporary files are appended in order to a staging file
//!    beside the destination and deleted as soon as they are copied.
//! 5. **Commit**: the staging file is renamed onto the destination.
//!
//! Any failure aborts the export.  Temporary and staging files are scoped
//! guards, so they are removed on every path and the destination is either
//! the complete file or untouched.

use std::{
    fs::File,
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    config::DEFAULT_CHUNK_CHARS,
    error::SpeakError,
    ssml::to_ssml,
    synth::{SynthesisRequest, Synthesizer},
};

/// Split `text` into consecutive slices of at most `max_chars` characters.
///
/// Concatenating the slices gives back `text` exactly; there are
/// `ceil(chars / max_chars)` of them.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    assert!(max_chars > 0, "chunk size must be positive");
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// What an export produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub chunks: usize,
    pub bytes: u64,
}

pub struct Exporter<'a> {
    synth: &'a dyn Synthesizer,
    chunk_chars: usize,
    temp_dir: Option<PathBuf>,
}

impl<'a> Exporter<'a> {
    pub fn new(synth: &'a dyn Synthesizer) -> Self {
        Self { synth, chunk_chars: DEFAULT_CHUNK_CHARS, temp_dir: None }
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars;
        self
    }

    /// Directory for per-chunk audio files; the system temp dir by default.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    fn temp_audio(&self) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mdspeak-chunk-").suffix(".mp3");
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }

    /// Synthesize `text` in `language` and write the audio to `dest`.
    pub fn export(&self, text: &str, language: &str, dest: &Path) -> Result<ExportReport> {
        if self.chunk_chars == 0 {
            bail!("Chunk size must be greater than 0");
        }
        if text.trim().is_empty() {
            return Err(SpeakError::EmptyText.into());
        }

        let chunks = chunk_text(text, self.chunk_chars);
        info!(
            "Exporting {} chars in {} chunk(s) via {} to {}",
            text.chars().count(),
            chunks.len(),
            self.synth.name(),
            dest.display()
        );

        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut staging = tempfile::Builder::new()
            .prefix(".mdspeak-")
            .suffix(".part")
            .tempfile_in(dir)
            .with_context(|| format!("Cannot create output file in '{}'", dir.display()))?;

        let mut bytes = 0u64;
        for (i, chunk) in chunks.iter().enumerate() {
            let index = i + 1;
            let markup = to_ssml(chunk, language);
            let request = SynthesisRequest { text: chunk, markup: &markup, language };
            let audio = self
                .synth
                .synthesize(&request)
                .map_err(|e| SpeakError::Synthesis { index, message: format!("{e:#}") })?;

            let mut part = self.temp_audio().context("Cannot create temporary audio file")?;
            part.write_all(&audio).context("Cannot write temporary audio file")?;
            bytes += append(part.as_file_mut(), staging.as_file_mut())
                .context("Cannot append audio to output file")?;
            part.close().context("Cannot delete temporary audio file")?;

            debug!("Chunk {}/{}: {} bytes", index, chunks.len(), audio.len());
        }

        staging.as_file_mut().sync_all().context("Cannot flush output file")?;
        staging
            .persist(dest)
            .map_err(|e| e.error)
            .with_context(|| format!("Cannot write '{}'", dest.display()))?;

        info!("Wrote {} bytes to {}", bytes, dest.display());
        Ok(ExportReport { path: dest.to_path_buf(), chunks: chunks.len(), bytes })
    }
}

/// Copy the whole of `part` onto the end of `out`.
fn append(part: &mut File, out: &mut File) -> io::Result<u64> {
    part.seek(SeekFrom::Start(0))?;
    io::copy(part, out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Echoes each chunk back as its "audio"; optionally fails on one call.
    #[derive(Default)]
    struct EchoSynth {
        requests: RefCell<Vec<(String, String, String)>>,
        fail_at: Option<usize>,
    }

    impl Synthesizer for EchoSynth {
        fn name(&self) -> &str {
            "echo"
        }

        fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>> {
            let mut requests = self.requests.borrow_mut();
            requests.push((
                request.text.to_string(),
                request.markup.to_string(),
                request.language.to_string(),
            ));
            if self.fail_at == Some(requests.len()) {
                bail!("HTTP 503");
            }
            Ok(request.text.as_bytes().to_vec())
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_chunk_counts() {
        let text = "a".repeat(250);
        let chunks = chunk_text(&text, 100);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![100, 100, 50]);
        assert_eq!(chunk_text(&"b".repeat(200), 100).len(), 2);
        assert_eq!(chunk_text("short", 100), vec!["short"]);
        assert!(chunk_text("", 100).is_empty());
    }

    #[test]
    fn test_chunks_count_characters_not_bytes() {
        let text = "héllo wörld ✓";
        let chunks = chunk_text(text, 4);
        assert_eq!(chunks, vec!["héll", "o wö", "rld ", "✓"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_short_text_single_call() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.mp3");
        let synth = EchoSynth::default();
        let report = Exporter::new(&synth)
            .with_temp_dir(dir.path())
            .export("Title (level 1)\n\nSome text.", "en", &dest)
            .unwrap();

        assert_eq!(report.chunks, 1);
        assert_eq!(synth.requests.borrow().len(), 1);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "Title (level 1)\n\nSome text.");
        assert_eq!(entries(dir.path()), vec!["out.mp3"]);
    }

    #[test]
    fn test_chunks_concatenated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book.mp3");
        let text: String = (0..57).map(|i| format!("Sentence {}. ", i)).collect();
        let synth = EchoSynth::default();
        let report = Exporter::new(&synth)
            .with_chunk_chars(100)
            .with_temp_dir(dir.path())
            .export(&text, "ru", &dest)
            .unwrap();

        let expected = text.chars().count().div_ceil(100);
        assert_eq!(report.chunks, expected);
        assert_eq!(synth.requests.borrow().len(), expected);
        assert_eq!(report.bytes, text.len() as u64);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), text);
        assert_eq!(entries(dir.path()), vec!["book.mp3"]);

        for (_, markup, language) in synth.requests.borrow().iter() {
            assert_eq!(language, "ru");
            assert!(markup.starts_with("<speak xml:lang=\"ru\">"), "got: {}", markup);
        }
    }

    #[test]
    fn test_failure_aborts_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.mp3");
        let synth = EchoSynth { fail_at: Some(2), ..EchoSynth::default() };
        let err = Exporter::new(&synth)
            .with_chunk_chars(10)
            .with_temp_dir(dir.path())
            .export(&"x".repeat(35), "en", &dest)
            .unwrap_err();

        match err.downcast_ref::<SpeakError>() {
            Some(SpeakError::Synthesis { index, message }) => {
                assert_eq!(*index, 2);
                assert!(message.contains("503"), "got: {}", message);
            }
            other => panic!("expected synthesis error, got {:?}", other),
        }
        // No further chunks were attempted and nothing is left behind.
        assert_eq!(synth.requests.borrow().len(), 2);
        assert!(entries(dir.path()).is_empty(), "left: {:?}", entries(dir.path()));
    }

    #[test]
    fn test_existing_destination_kept_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.mp3");
        std::fs::write(&dest, b"previous").unwrap();
        let synth = EchoSynth { fail_at: Some(1), ..EchoSynth::default() };
        assert!(Exporter::new(&synth).with_temp_dir(dir.path()).export("hello", "en", &dest).is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
    }

    #[test]
    fn test_empty_text_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let synth = EchoSynth::default();
        let err = Exporter::new(&synth).export(" \n ", "en", &dir.path().join("o.mp3")).unwrap_err();
        assert!(matches!(err.downcast_ref::<SpeakError>(), Some(SpeakError::EmptyText)), "got: {err:#}");
        assert!(synth.requests.borrow().is_empty());
    }
}
