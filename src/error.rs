//! Error taxonomy surfaced to the user.
//!
//! Three families, mirroring how the front end reports them:
//! user input mistakes, environment failures, and state conflicts.  State
//! conflicts (starting playback twice, stopping when idle) are warnings: the
//! front end prints them and carries on.

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of a [`SpeakError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    Environment,
    StateConflict,
}

#[derive(Debug, Error)]
pub enum SpeakError {
    #[error("no documents selected")]
    NoDocuments,

    #[error("unsupported file type '{}': expected .md or .txt", .0.display())]
    UnsupportedExtension(PathBuf),

    #[error("the documents are empty or contain no text")]
    EmptyText,

    #[error("cannot read '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("speech engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("synthesis failed for chunk {index}: {message}")]
    Synthesis { index: usize, message: String },

    #[error("playback is already running; stop it before starting a new one")]
    AlreadySpeaking,

    #[error("playback is already stopped")]
    NotSpeaking,
}

impl SpeakError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDocuments | Self::UnsupportedExtension(_) | Self::EmptyText => {
                ErrorKind::UserInput
            }
            Self::Unreadable { .. } | Self::EngineUnavailable(_) | Self::Synthesis { .. } => {
                ErrorKind::Environment
            }
            Self::AlreadySpeaking | Self::NotSpeaking => ErrorKind::StateConflict,
        }
    }

    /// `true` for conflicts the front end reports as a warning, not an error.
    pub fn is_warning(&self) -> bool {
        self.kind() == ErrorKind::StateConflict
    }
}

pub type Result<T> = std::result::Result<T, SpeakError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conflicts_are_warnings() {
        assert!(SpeakError::AlreadySpeaking.is_warning());
        assert!(SpeakError::NotSpeaking.is_warning());
        assert!(!SpeakError::EmptyText.is_warning());
        assert!(!SpeakError::EngineUnavailable("gone".into()).is_warning());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(SpeakError::NoDocuments.kind(), ErrorKind::UserInput);
        assert_eq!(
            SpeakError::UnsupportedExtension(PathBuf::from("a.pdf")).kind(),
            ErrorKind::UserInput
        );
        assert_eq!(
            SpeakError::Synthesis { index: 1, message: "timeout".into() }.kind(),
            ErrorKind::Environment
        );
    }

    #[test]
    fn test_messages_name_the_file() {
        let e = SpeakError::UnsupportedExtension(PathBuf::from("notes.pdf"));
        assert!(e.to_string().contains("notes.pdf"), "got: {}", e);
    }
}
