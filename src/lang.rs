//! Language detection for voice / locale selection.
//!
//! Detection runs on a short sample from the start of the formatted text.
//! It never fails: a sample that is too short, a result the detector itself
//! flags as unreliable, or a language with no two-letter code all fall back
//! to the configured default.

use tracing::{debug, warn};
use whatlang::Lang;

/// Language used when detection gives no usable answer.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Characters taken from the start of the text.
pub const DEFAULT_SAMPLE_CHARS: usize = 500;

/// Fewer letters than this and the sample is not worth guessing from.
const MIN_LETTERS: usize = 20;

/// ISO 639-1 code for the languages the speech back ends commonly voice.
fn two_letter_code(lang: Lang) -> Option<&'static str> {
    let code = match lang {
        Lang::Eng => "en",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Deu => "de",
        Lang::Fra => "fr",
        Lang::Spa => "es",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Ces => "cs",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Fin => "fi",
        Lang::Tur => "tr",
        Lang::Ell => "el",
        Lang::Hun => "hu",
        Lang::Ron => "ro",
        Lang::Bul => "bg",
        Lang::Heb => "he",
        Lang::Ara => "ar",
        Lang::Hin => "hi",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        Lang::Vie => "vi",
        Lang::Ind => "id",
        Lang::Tha => "th",
        _ => return None,
    };
    Some(code)
}

#[derive(Debug, Clone)]
pub struct LanguageDetector {
    pub sample_chars: usize,
    pub default: String,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self { sample_chars: DEFAULT_SAMPLE_CHARS, default: DEFAULT_LANGUAGE.to_string() }
    }
}

impl LanguageDetector {
    pub fn new(sample_chars: usize, default: impl Into<String>) -> Self {
        Self { sample_chars, default: default.into() }
    }

    /// Two-letter language code for `text`, or the default.
    pub fn detect(&self, text: &str) -> String {
        let sample: String = text.chars().take(self.sample_chars).collect();
        if sample.chars().filter(|c| c.is_alphabetic()).count() < MIN_LETTERS {
            debug!("Language sample too short, using '{}'", self.default);
            return self.default.clone();
        }

        let Some(info) = whatlang::detect(&sample) else {
            warn!("Language detection failed, using '{}'", self.default);
            return self.default.clone();
        };
        if !info.is_reliable() {
            warn!(
                "Unreliable language guess {} ({:.2}), using '{}'",
                info.lang().code(),
                info.confidence(),
                self.default
            );
            return self.default.clone();
        }
        match two_letter_code(info.lang()) {
            Some(code) => {
                debug!("Detected language '{}' ({:.2})", code, info.confidence());
                code.to_string()
            }
            None => {
                warn!("No two-letter code for {}, using '{}'", info.lang().code(), self.default);
                self.default.clone()
            }
        }
    }
}

/// Detect with the default sample size and fallback.
pub fn detect_language(text: &str) -> String {
    LanguageDetector::default().detect(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english() {
        let text = "The quick brown fox jumps over the lazy dog while the farmer \
                    watches from the window of his small house near the river.";
        assert_eq!(detect_language(text), "en");
    }

    #[test]
    fn test_russian() {
        let text = "Это довольно длинный текст на русском языке, который должен \
                    уверенно распознаваться детектором языка без каких-либо проблем.";
        assert_eq!(detect_language(text), "ru");
    }

    #[test]
    fn test_short_sample_falls_back() {
        assert_eq!(detect_language("ok"), DEFAULT_LANGUAGE);
        assert_eq!(detect_language(""), DEFAULT_LANGUAGE);
        assert_eq!(detect_language("1 2 3 4 5 6 7 8 9 10 11 12"), DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_custom_default() {
        let detector = LanguageDetector::new(500, "de");
        assert_eq!(detector.detect("hi"), "de");
    }

    #[test]
    fn test_only_sample_is_inspected() {
        // The first five characters are too few letters to decide on.
        let detector = LanguageDetector::new(5, "fr");
        let text = "Hello there, this is clearly a long English sentence about nothing.";
        assert_eq!(detector.detect(text), "fr");
    }
}
