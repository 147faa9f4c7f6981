//! SSML-style markup for export chunks.
//!
//! The structural markers left by the formatter become prosody hints:
//!
//! | Marker                  | Markup                                              |
//! |-------------------------|-----------------------------------------------------|
//! | `… (level n)` heading   | `<prosody rate="slow" volume="loud">…</prosody>`    |
//! | `•` / `Item n:` line    | `<break time="300ms"/>` before the line             |
//! | `code: …` inline span   | `<break time="300ms"/>` before the span             |
//! | `[CODE BLOCK: …]` lines | break, then `<prosody pitch="low" rate="fast">`     |
//!
//! Text is XML-escaped before any tag is added.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::markers::{Marker, CODE_BLOCK_OPEN, INLINE_CODE};

static RE_INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b{}", regex::escape(INLINE_CODE))).unwrap());

pub const BREAK: &str = r#"<break time="300ms"/>"#;

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn code_line(escaped: &str) -> String {
    format!(r#"{BREAK}<prosody pitch="low" rate="fast">{escaped}</prosody>"#)
}

/// Markup for one line of formatted text outside a code block.
pub fn annotate_line(line: &str) -> String {
    let escaped = escape_xml(line);
    match Marker::classify(line) {
        Marker::Heading(_) => format!(r#"<prosody rate="slow" volume="loud">{escaped}</prosody>"#),
        Marker::Bullet | Marker::Numbered(_) => format!("{BREAK}{escaped}"),
        Marker::CodeBlock => code_line(&escaped),
        Marker::Plain => RE_INLINE_CODE
            .replace_all(&escaped, format!("{BREAK}{INLINE_CODE}").as_str())
            .into_owned(),
    }
}

/// Index of the last code line of a block opened at `lines[start]`.
///
/// The formatter keeps a block inside one paragraph, so its closing `]` is
/// the last line of that paragraph ending in `]`; code lines such as
/// `let v = [1, 2]` before it stay code.  A chunk cut mid-block runs to the
/// paragraph end.
fn code_block_end(lines: &[&str], start: usize) -> usize {
    let para_end = lines[start..]
        .iter()
        .position(|l| l.trim().is_empty())
        .map_or(lines.len(), |n| start + n);
    (start..para_end)
        .rev()
        .find(|&i| lines[i].trim_end().ends_with(']'))
        .unwrap_or(para_end - 1)
}

/// Wrap a chunk of formatted text in a `<speak>` envelope.
///
/// Chunks are cut by length, so a code block may start in an earlier chunk;
/// only lines from a `[CODE BLOCK:` opener on are treated as code here.
pub fn to_ssml(chunk: &str, language: &str) -> String {
    let lines: Vec<&str> = chunk.lines().collect();
    let mut body = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim_start().starts_with(CODE_BLOCK_OPEN) {
            let end = code_block_end(&lines, i);
            body.extend(lines[i..=end].iter().map(|l| code_line(&escape_xml(l))));
            i = end + 1;
        } else {
            body.push(annotate_line(lines[i]));
            i += 1;
        }
    }

    format!(
        "<speak xml:lang=\"{}\">{}</speak>",
        escape_xml(language),
        body.join("\n")
    )
}
