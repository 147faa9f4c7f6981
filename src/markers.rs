//! Structural markers inserted by the formatter.
//!
//! Both the playback driver and the export pipeline look at formatted text a
//! paragraph (or line) at a time and adjust pacing by what the unit *is*.

use once_cell::sync::Lazy;
use regex::Regex;

pub const BULLET: char = '•';
pub const CODE_BLOCK_OPEN: &str = "[CODE BLOCK:";
pub const INLINE_CODE: &str = "code: ";

/// `annotate_headings` output: non-blank title, one space, `(level 1..6)`.
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S.*? \(level ([1-6])\)$").unwrap());
static RE_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Item (\d+): ").unwrap());
static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Semantic role of a unit of formatted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Heading(usize),
    Bullet,
    Numbered(u64),
    CodeBlock,
    Plain,
}

impl Marker {
    /// Classify a paragraph or line by its leading (or, for headings,
    /// trailing) marker.  Only the first line is inspected, except that a
    /// heading is always a unit of its own.
    pub fn classify(unit: &str) -> Self {
        let unit = unit.trim();
        let first = unit.lines().next().unwrap_or("").trim_end();
        if first.starts_with(CODE_BLOCK_OPEN) {
            return Self::CodeBlock;
        }
        if first.len() == unit.len() {
            if let Some(caps) = RE_HEADING.captures(first) {
                return Self::Heading(caps[1].parse().unwrap_or(1));
            }
        }
        if first.starts_with(BULLET) {
            return Self::Bullet;
        }
        if let Some(caps) = RE_ITEM.captures(first) {
            return Self::Numbered(caps[1].parse().unwrap_or(0));
        }
        Self::Plain
    }

    /// List items and code blocks get a short pause before them.
    pub fn wants_pause(&self) -> bool {
        matches!(self, Self::Bullet | Self::Numbered(_) | Self::CodeBlock)
    }
}

/// Split formatted text into non-empty paragraphs on blank lines.
pub fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    RE_PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Marker::classify("Title (level 2)"), Marker::Heading(2));
        assert_eq!(Marker::classify("• apples\n• pears"), Marker::Bullet);
        assert_eq!(Marker::classify("Item 3: third"), Marker::Numbered(3));
        assert_eq!(Marker::classify("[CODE BLOCK: ls -la]"), Marker::CodeBlock);
        assert_eq!(Marker::classify("Just words."), Marker::Plain);
        assert_eq!(Marker::classify(""), Marker::Plain);
    }

    #[test]
    fn test_level_suffix_in_prose_is_not_heading() {
        assert_eq!(Marker::classify("Set it to max (level 3)\nthen continue."), Marker::Plain);
        assert_eq!(Marker::classify("Title (level 7)"), Marker::Plain);
        assert_eq!(Marker::classify("(level 2)"), Marker::Plain);
        assert_eq!(Marker::classify("Boss fight(level 2)"), Marker::Plain);
        assert_eq!(Marker::classify("  Setup (level 6)  "), Marker::Heading(6));
    }

    #[test]
    fn test_item_needs_colon() {
        assert_eq!(Marker::classify("Item 3 was lost"), Marker::Plain);
    }

    #[test]
    fn test_wants_pause() {
        assert!(Marker::Bullet.wants_pause());
        assert!(Marker::CodeBlock.wants_pause());
        assert!(!Marker::Heading(1).wants_pause());
        assert!(!Marker::Plain.wants_pause());
    }

    #[test]
    fn test_paragraphs() {
        let p: Vec<_> = paragraphs("a\nb\n\n\n c \n  \nd").collect();
        assert_eq!(p, vec!["a\nb", "c", "d"]);
    }
}
