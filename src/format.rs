//! Speech text formatter: turns structural cues into speakable annotations.
//!
//! Each pass is a pure string transform.  The passes run in a fixed order so
//! later ones see the output of earlier ones: decimal points first (so `1.5`
//! is never mistaken for a numbered list item), then headings, bullet and
//! numbered list lines, code, and finally whitespace.

use fancy_regex::Regex as FancyRegex;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::markers::{BULLET, CODE_BLOCK_OPEN, INLINE_CODE};

// ─────────────────────────────────────────────────────────────────────────────
// Compiled regexes (lazily initialised once)
// ─────────────────────────────────────────────────────────────────────────────

static RE_DECIMAL_POINT: Lazy<FancyRegex> = Lazy::new(|| FancyRegex::new(r"(?<=\d)\.(?=\d)").unwrap());
static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(#+)[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").unwrap());
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*+][ \t]+(.+)$").unwrap());
static RE_NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(\d+)[.)][ \t]+(.+)$").unwrap());
static RE_CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[^\n]*\n(.*?)\n?[ \t]*```[ \t]*$").unwrap()
});
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s&&[^\n]]+").unwrap());
static RE_LINE_EDGE: Lazy<Regex> = Lazy::new(|| Regex::new(r" ?\n ?").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_INNER_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Passes
// ─────────────────────────────────────────────────────────────────────────────

/// `3.14` → `3 point 14`, so the engine does not read two separate numbers.
pub fn disambiguate_decimals(text: &str, word: &str) -> String {
    RE_DECIMAL_POINT
        .replace_all(text, format!(" {} ", word).as_str())
        .into_owned()
}

/// Run `pass` over the text between fenced code blocks; the blocks are
/// copied through unchanged.
fn outside_fences(text: &str, pass: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for fence in RE_CODE_FENCE.find_iter(text) {
        out.push_str(&pass(&text[last..fence.start()]));
        out.push_str(fence.as_str());
        last = fence.end();
    }
    out.push_str(&pass(&text[last..]));
    out
}

/// `## Setup` → `Setup (level 2)`.  Lines inside code fences are left alone.
pub fn annotate_headings(text: &str) -> String {
    outside_fences(text, |part| {
        RE_HEADING
            .replace_all(part, |caps: &Captures| {
                format!("{} (level {})", caps[2].trim(), caps[1].len())
            })
            .into_owned()
    })
}

pub fn annotate_bullets(text: &str) -> String {
    outside_fences(text, |part| {
        RE_BULLET
            .replace_all(part, |caps: &Captures| format!("{} {}", BULLET, &caps[1]))
            .into_owned()
    })
}

pub fn annotate_numbered(text: &str) -> String {
    outside_fences(text, |part| {
        RE_NUMBERED
            .replace_all(part, |caps: &Captures| format!("Item {}: {}", &caps[1], &caps[2]))
            .into_owned()
    })
}

/// Fenced blocks → `[CODE BLOCK: …]`, inline spans → `code: …`.
///
/// Blank lines inside a block are collapsed so the marker stays a single
/// paragraph for the playback driver.  Back-ticks inside a block are code.
pub fn annotate_code(text: &str) -> String {
    let text = outside_fences(text, |part| {
        RE_INLINE_CODE
            .replace_all(part, |caps: &Captures| format!("{}{}", INLINE_CODE, &caps[1]))
            .into_owned()
    });
    RE_CODE_FENCE
        .replace_all(&text, |caps: &Captures| {
            let code = RE_INNER_BLANKS.replace_all(caps[1].trim(), "\n");
            format!("{} {}]", CODE_BLOCK_OPEN, code)
        })
        .into_owned()
}

/// Collapse horizontal whitespace, drop spaces around line breaks, keep at
/// most one blank line, trim.  Idempotent.
pub fn normalize_whitespace(text: &str) -> String {
    let text = RE_HSPACE.replace_all(text, " ");
    let text = RE_LINE_EDGE.replace_all(&text, "\n");
    let text = RE_BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// SpeechFormatter: full pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Which passes run, and the word spoken for a decimal point.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FormatterConfig {
    pub disambiguate_decimals: bool,
    pub decimal_word: String,
    pub annotate_headings: bool,
    pub annotate_bullets: bool,
    pub annotate_numbered: bool,
    pub annotate_code: bool,
    pub normalize_whitespace: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            disambiguate_decimals: true,
            decimal_word: "point".to_string(),
            annotate_headings: true,
            annotate_bullets: true,
            annotate_numbered: true,
            annotate_code: true,
            normalize_whitespace: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpeechFormatter {
    pub config: FormatterConfig,
}

impl SpeechFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, text: &str) -> String {
        let cfg = &self.config;
        let mut text = text.to_string();

        if cfg.disambiguate_decimals {
            text = disambiguate_decimals(&text, &cfg.decimal_word);
        }
        if cfg.annotate_headings {
            text = annotate_headings(&text);
        }
        if cfg.annotate_bullets {
            text = annotate_bullets(&text);
        }
        if cfg.annotate_numbered {
            text = annotate_numbered(&text);
        }
        if cfg.annotate_code {
            text = annotate_code(&text);
        }
        if cfg.normalize_whitespace {
            text = normalize_whitespace(&text);
        }

        text
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
