//! Documents and the conversion that turns them into formatted speech text.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    convert::markdown_to_text,
    error::{Result, SpeakError},
    format::SpeechFormatter,
    lang::LanguageDetector,
};

/// How a document's content is turned into plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markdown,
    PlainText,
}

impl DocumentKind {
    /// Kind for a path by extension (case-insensitive), `None` if unsupported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// A file the user selected.  Immutable once read.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    kind: DocumentKind,
    content: String,
}

impl Document {
    /// Read a `.md` / `.txt` file as UTF-8.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kind = DocumentKind::from_path(path)
            .ok_or_else(|| SpeakError::UnsupportedExtension(path.to_path_buf()))?;
        let content = std::fs::read_to_string(path)
            .map_err(|source| SpeakError::Unreadable { path: path.to_path_buf(), source })?;
        Ok(Self::from_text(path, kind, &content))
    }

    /// Build a document from text already in memory.  CRLF becomes LF.
    pub fn from_text(path: impl Into<PathBuf>, kind: DocumentKind, content: &str) -> Self {
        Self { path: path.into(), kind, content: content.replace("\r\n", "\n") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Plain text of this document, before speech formatting.
    pub fn plain_text(&self) -> String {
        match self.kind {
            DocumentKind::Markdown => markdown_to_text(&self.content),
            DocumentKind::PlainText => self.content.trim().to_string(),
        }
    }
}

/// Result of converting the current document set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// All documents' formatted text, separated by blank lines.
    pub text: String,
    /// Two-letter language code.
    pub language: String,
}

/// The documents currently selected, in the order they were added.
#[derive(Debug, Default)]
pub struct DocumentSet {
    documents: Vec<Document>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and add a file.  Nothing is added if reading fails.
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<&Document> {
        let doc = Document::open(path)?;
        info!("Added {}", doc.path().display());
        self.documents.push(doc);
        Ok(&self.documents[self.documents.len() - 1])
    }

    pub fn push(&mut self, doc: Document) {
        self.documents.push(doc);
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Convert every document, format the combined text and tag its language.
    ///
    /// Each document is formatted on its own so markers never straddle two
    /// files; the results are joined with a blank line.
    pub fn convert(
        &self,
        formatter: &SpeechFormatter,
        detector: &LanguageDetector,
    ) -> Result<Conversion> {
        if self.documents.is_empty() {
            return Err(SpeakError::NoDocuments);
        }

        let text = self
            .documents
            .iter()
            .map(|doc| formatter.process(&doc.plain_text()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if text.trim().is_empty() {
            return Err(SpeakError::EmptyText);
        }

        let language = detector.detect(&text);
        info!(
            "Converted {} document(s): {} chars, language '{}'",
            self.documents.len(),
            text.chars().count(),
            language
        );
        Ok(Conversion { text, language })
    }
}
