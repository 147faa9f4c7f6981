//! Markdown normaliser: runs before HTML rendering.
//!
//! Fenced code blocks become raw `<pre><code>…</code></pre>` HTML blocks and
//! inline back-tick spans become `<code>…</code>`, so the renderer hands the
//! code text through untouched.  Fenced code is kept verbatim inside its HTML
//! block.  An inline span sits in ordinary paragraph text, so its ASCII
//! punctuation is written as numeric character references (`*` → `&#42;`)
//! that the renderer cannot read as emphasis, escapes or tags; the converter
//! decodes them again.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// A ``` fence with an optional info string, its body, and the closing fence.
static RE_FENCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[ \t]*[\w+#.\-]*[ \t]*\n(.*?)\n?[ \t]*```[ \t]*$").unwrap()
});

static RE_INLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());

/// Wrap a fenced block's body.  Blank lines around the wrapper make it a
/// standalone HTML block for the renderer.
fn wrap_fenced(caps: &Captures) -> String {
    format!("\n<pre><code>{}</code></pre>\n", &caps[1])
}

/// Punctuation → `&#N;`, everything else unchanged.
fn inert(code: &str) -> String {
    let mut out = String::with_capacity(code.len() * 2);
    for c in code.chars() {
        if c.is_ascii_punctuation() {
            out.push_str(&format!("&#{};", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

pub fn wrap_inline_code(text: &str) -> String {
    RE_INLINE
        .replace_all(text, |caps: &Captures| format!("<code>{}</code>", inert(&caps[1])))
        .into_owned()
}

/// Rewrite fenced and inline code into HTML wrappers.
///
/// Back-ticks inside a fenced block are left alone: inline replacement only
/// runs over the text between fences.
pub fn normalize_markdown(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() + 64);
    let mut last = 0;
    for caps in RE_FENCED.captures_iter(markdown) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&wrap_inline_code(&markdown[last..whole.start()]));
        out.push_str(&wrap_fenced(&caps));
        last = whole.end();
    }
    out.push_str(&wrap_inline_code(&markdown[last..]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block_wrapped_verbatim() {
        let md = "Intro\n\n```rust\nfn main() {\n    let v: Vec<u8> = vec![];\n}\n```\n\nOutro";
        let out = normalize_markdown(md);
        assert!(
            out.contains("<pre><code>fn main() {\n    let v: Vec<u8> = vec![];\n}</code></pre>"),
            "got: {}",
            out
        );
        assert!(!out.contains("```"), "fence left behind: {}", out);
        assert!(!out.contains("rust"), "language tag kept: {}", out);
    }

    #[test]
    fn test_fenced_block_without_language() {
        let out = normalize_markdown("```\nls -la\n```");
        assert!(out.contains("<pre><code>ls -la</code></pre>"), "got: {}", out);
    }

    #[test]
    fn test_inline_code() {
        assert_eq!(
            normalize_markdown("Run `cargo build` now"),
            "Run <code>cargo build</code> now"
        );
    }

    #[test]
    fn test_inline_code_punctuation_is_inert() {
        assert_eq!(wrap_inline_code("`a*b*c`"), "<code>a&#42;b&#42;c</code>");
        assert_eq!(wrap_inline_code(r"`C:\*x`"), "<code>C&#58;&#92;&#42;x</code>");
        assert_eq!(wrap_inline_code("`x_1`"), "<code>x&#95;1</code>");
    }

    #[test]
    fn test_backticks_inside_fence_untouched() {
        let out = normalize_markdown("```\necho `date`\n```\nuse `x`");
        assert!(out.contains("<pre><code>echo `date`</code></pre>"), "got: {}", out);
        assert!(out.contains("use <code>x</code>"), "got: {}", out);
    }

    #[test]
    fn test_no_code_is_noop() {
        let md = "# Title\n\nJust *prose* here.";
        assert_eq!(normalize_markdown(md), md);
    }

    #[test]
    fn test_multiple_fences() {
        let out = normalize_markdown("```\na\n```\n\ntext\n\n```py\nb\n```");
        assert_eq!(out.matches("<pre><code>").count(), 2, "got: {}", out);
    }
}
