//! Markdown → HTML → plain text.
//!
//! The HTML is rendered with `pulldown-cmark` and then flattened by a small
//! tag walker.  Block elements are not simply dropped: they are re-expressed as
//! the lightweight line syntax the speech formatter understands (`#` headings,
//! `-` / `n.` list items, ``` code fences, back-tick inline code), so document
//! structure survives the trip through HTML while the output itself carries
//! no markup tags.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};

use crate::normalize::normalize_markdown;

// ─────────────────────────────────────────────────────────────────────────────
// Compiled regexes
// ─────────────────────────────────────────────────────────────────────────────

static RE_SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>").unwrap());
static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:\s[^>]*)?)/?>").unwrap());
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_START_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bstart\s*=\s*["']?(\d+)"#).unwrap());
static RE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());
static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Render Markdown to HTML (CommonMark plus tables and strikethrough).
pub fn render_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Decode the character references the renderer emits, plus numeric ones.
/// Unknown named entities are kept as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    RE_ENTITY.replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = name.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML → text
// ─────────────────────────────────────────────────────────────────────────────

/// One open list: `None` for `<ul>`, `Some(next)` for `<ol>`.
type ListFrame = Option<u64>;

#[derive(Default)]
struct TextWriter {
    out: String,
    lists: Vec<ListFrame>,
    /// Inside `<pre>` or inline `<code>`: only the closing tag is honoured.
    literal: Option<&'static str>,
    in_pre: bool,
    /// A list-item prefix was just written; a `<p>` right after it must not
    /// push the item text onto a new paragraph.
    item_open: bool,
    /// A soft line break inside a paragraph; becomes one space before the
    /// next inline content.
    pending_space: bool,
}

impl TextWriter {
    fn block_break(&mut self) {
        self.out.push_str("\n\n");
        self.pending_space = false;
    }

    /// Newline at the edge of a text run.  At a block boundary it is layout;
    /// after inline content it separates two words.
    fn soft_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn flush_space(&mut self) {
        if std::mem::take(&mut self.pending_space) && !self.out.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
    }

    fn text(&mut self, raw: &str) {
        let decoded = decode_entities(raw);
        if self.literal.is_some() {
            self.out.push_str(&decoded);
            return;
        }
        let content = decoded.trim_matches('\n');
        if decoded.starts_with('\n') {
            self.soft_break();
        }
        if !content.trim().is_empty() {
            self.flush_space();
            self.out.push_str(content);
            self.item_open = false;
        } else if !content.is_empty() && !self.out.ends_with(char::is_whitespace) {
            self.out.push_str(content);
        }
        if decoded.ends_with('\n') {
            self.soft_break();
        }
    }

    fn line_break(&mut self) {
        if !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.pending_space = false;
    }

    /// Top-level lists are separate blocks; nested ones continue the item.
    fn list_break(&mut self) {
        if self.lists.is_empty() {
            self.block_break();
        } else {
            self.line_break();
        }
    }

    fn open(&mut self, name: &str, attrs: &str) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.block_break();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
            }
            "p" => {
                if !self.item_open {
                    self.block_break();
                }
            }
            "br" => {
                self.out.push('\n');
                self.pending_space = false;
            }
            "ul" => {
                self.list_break();
                self.lists.push(None);
            }
            "ol" => {
                let start = RE_START_ATTR
                    .captures(attrs)
                    .and_then(|c| c[1].parse::<u64>().ok())
                    .unwrap_or(1);
                self.list_break();
                self.lists.push(Some(start));
            }
            "li" => {
                self.line_break();
                let depth = self.lists.len().saturating_sub(1);
                self.out.push_str(&"  ".repeat(depth));
                match self.lists.last_mut() {
                    Some(Some(next)) => {
                        self.out.push_str(&format!("{}. ", next));
                        *next += 1;
                    }
                    _ => self.out.push_str("- "),
                }
                self.item_open = true;
            }
            "pre" => {
                self.block_break();
                self.out.push_str("```\n");
                self.in_pre = true;
                self.literal = Some("pre");
            }
            "code" => {
                self.flush_space();
                self.out.push('`');
                self.literal = Some("code");
            }
            "blockquote" | "hr" | "table" | "div" => self.block_break(),
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "blockquote" | "table" | "div" => {
                self.block_break()
            }
            "ul" | "ol" => {
                self.lists.pop();
                self.list_break();
            }
            "li" => self.line_break(),
            "pre" => {
                let code_end = self.out.trim_end_matches('\n').len();
                self.out.truncate(code_end);
                self.out.push_str("\n```");
                self.block_break();
                self.in_pre = false;
            }
            "code" if !self.in_pre => self.out.push('`'),
            "td" | "th" => self.out.push(' '),
            "tr" => self.out.push('\n'),
            _ => {}
        }
        self.item_open = false;
    }

    fn finish(self) -> String {
        RE_BLANK_RUNS.replace_all(&self.out, "\n\n").trim().to_string()
    }
}

/// Strip all markup from `html`, dropping `<script>`/`<style>` content.
pub fn html_to_text(html: &str) -> String {
    let html = RE_SCRIPT_STYLE.replace_all(html, "");
    let html = RE_COMMENT.replace_all(&html, "");

    let mut writer = TextWriter::default();
    let mut last = 0;
    for caps in RE_TAG.captures_iter(&html) {
        let Some(whole) = caps.get(0) else { continue };
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();

        if let Some(literal) = writer.literal {
            // The renderer always opens `<code>` straight after `<pre>`.
            if literal == "pre" && !closing && name == "code" && html[last..whole.start()].trim().is_empty() {
                writer.literal = Some("code");
                last = whole.end();
                continue;
            }
            // Inside code only the matching closing tag (or `</pre>` wrapping
            // a `<code>`) ends the literal run; anything else is code text.
            let ends_literal = closing && (name == literal || (writer.in_pre && name == "pre"));
            if !ends_literal {
                continue;
            }
            writer.text(&html[last..whole.start()]);
            writer.literal = if name == "code" && writer.in_pre { Some("pre") } else { None };
            writer.close(&name);
            last = whole.end();
            continue;
        }

        writer.text(&html[last..whole.start()]);
        if closing {
            writer.close(&name);
        } else {
            writer.open(&name, caps.get(3).map_or("", |m| m.as_str()));
        }
        last = whole.end();
    }
    writer.text(&html[last..]);
    writer.finish()
}

/// Full Markdown → plain text conversion: normalise, render, strip.
pub fn markdown_to_text(markdown: &str) -> String {
    let normalized = normalize_markdown(markdown);
    let html = render_html(&normalized);
    html_to_text(&html)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn has_tags(text: &str) -> bool {
        RE_TAG.is_match(text)
    }

    #[test]
    fn test_heading_and_paragraph() {
        let out = markdown_to_text("# Title\n\nSome text. More text.");
        assert_eq!(out, "# Title\n\nSome text. More text.");
    }

    #[test]
    fn test_nested_heading_levels() {
        let out = markdown_to_text("### Deep\n\nbody");
        assert!(out.starts_with("### Deep"), "got: {}", out);
    }

    #[test]
    fn test_lists() {
        let out = markdown_to_text("- apples\n- pears\n\n1. first\n2. second");
        assert!(out.contains("- apples\n- pears"), "got: {}", out);
        assert!(out.contains("1. first\n2. second"), "got: {}", out);
        assert!(!has_tags(&out), "tags left: {}", out);
    }

    #[test]
    fn test_ordered_list_start() {
        let out = markdown_to_text("3. three\n4. four");
        assert!(out.contains("3. three\n4. four"), "got: {}", out);
    }

    #[test]
    fn test_loose_list_keeps_item_on_prefix_line() {
        let out = markdown_to_text("- one\n\n- two");
        assert!(out.contains("- one"), "got: {}", out);
        assert!(out.contains("- two"), "got: {}", out);
    }

    #[test]
    fn test_fenced_code_becomes_fence() {
        let out = markdown_to_text("Look:\n\n```rust\nlet v: Vec<u8> = a && b;\n```\n");
        assert!(
            out.contains("```\nlet v: Vec<u8> = a && b;\n```"),
            "got: {}",
            out
        );
    }

    #[test]
    fn test_inline_code_and_emphasis() {
        let out = markdown_to_text("Call `run()` *now*.");
        assert_eq!(out, "Call `run()` now.");
    }

    #[test]
    fn test_soft_break_after_inline_markup() {
        let out = markdown_to_text("This is **important**\nreally.\n\nRun `make`\nthen test.");
        assert_eq!(out, "This is important really.\n\nRun `make` then test.");

        let out = markdown_to_text("**x**\ny and `c`\ny\n*a*\n`b`");
        assert_eq!(out, "x y and `c` y a `b`");
    }

    #[test]
    fn test_inline_code_is_not_markdown() {
        let out = markdown_to_text("Compute `a*b*c` and `x_1` and `C:\\*path` now.");
        assert_eq!(out, "Compute `a*b*c` and `x_1` and `C:\\*path` now.");
        assert!(!has_tags(&out), "tags left: {}", out);

        let out = markdown_to_text("Type `Vec<u8>` or `a & b`.");
        assert_eq!(out, "Type `Vec<u8>` or `a & b`.");
    }

    #[test]
    fn test_entities_decoded() {
        let out = markdown_to_text("Fish & chips < 5 \"quid\"");
        assert_eq!(out, "Fish & chips < 5 \"quid\"");
    }

    #[test]
    fn test_script_and_style_dropped() {
        let out = html_to_text("<p>keep</p><script>alert(1)</script><style>p{}</style><p>this</p>");
        assert!(out.contains("keep"), "got: {}", out);
        assert!(out.contains("this"), "got: {}", out);
        assert!(!out.contains("alert"), "script kept: {}", out);
        assert!(!out.contains("p{}"), "style kept: {}", out);
    }

    #[test]
    fn test_no_markup_tags_in_output() {
        let md = "# A\n\n> quote\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n<div>raw</div>\n\n**bold** ~~gone~~";
        let out = markdown_to_text(md);
        assert!(!has_tags(&out), "tags left: {}", out);
        assert!(out.contains("raw"), "got: {}", out);
    }

    #[test]
    fn test_decode_numeric_entities() {
        assert_eq!(decode_entities("&#65;&#x42;&unknown;"), "AB&unknown;");
    }
}
