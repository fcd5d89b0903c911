//! Markup stripping for article text.
//!
//! Feed descriptions and scraped bodies may carry arbitrary HTML. The output
//! of [`sanitize`] is plain prose: no tags survive, script/style content is
//! dropped, entities are decoded and whitespace is normalised into
//! paragraphs separated by a blank line.

use scraper::node::{Element, Node};
use scraper::{ElementRef, Html};

use crate::util::strip_control_chars;

/// Elements whose content is never visible text.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "svg", "math",
    "canvas", "head", "title", "select", "button",
];

/// Elements that start a new paragraph in the plain-text output.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Upper bound on parse passes before falling back to dropping the
/// characters that could still open markup.
const MAX_PASSES: usize = 4;

/// Strips markup from `input`, returning plain text.
///
/// Entity-encoded markup (`&lt;script&gt;`) decodes into text that looks
/// like markup, so one parse is not a fixed point. Passes repeat until the
/// text stops changing, which makes the function idempotent:
/// `sanitize(&sanitize(x)) == sanitize(x)`.
///
/// ```
/// use gracile::content::sanitize;
///
/// assert_eq!(sanitize("<script>evil()</script><p>hello</p>"), "hello");
/// assert_eq!(sanitize("plain text"), "plain text");
/// ```
pub fn sanitize(input: &str) -> String {
    let mut current = normalize_whitespace(&strip_control_chars(input));
    for _ in 0..MAX_PASSES {
        let next = strip_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }

    // Nested encodings deeper than MAX_PASSES: remove what a renderer could
    // still treat as markup.
    let flattened: String = current.chars().filter(|c| !matches!(c, '<' | '&')).collect();
    normalize_whitespace(&flattened)
}

fn strip_pass(input: &str) -> String {
    if !input.contains(['<', '&']) {
        return input.to_owned();
    }
    let fragment = Html::parse_fragment(input);
    let mut text = String::with_capacity(input.len());
    collect_text(fragment.root_element(), &|_| false, &mut text);
    normalize_whitespace(&strip_control_chars(&text))
}

/// Appends the visible text below `element` to `out`.
///
/// Subtrees of [`SKIPPED_ELEMENTS`] and of elements matching `skip`
/// contribute nothing; block elements are delimited with a newline so
/// paragraphs survive normalisation.
pub(crate) fn collect_text(
    element: ElementRef<'_>,
    skip: &dyn Fn(&Element) -> bool,
    out: &mut String,
) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) || skip(el) {
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                let is_block = BLOCK_ELEMENTS.contains(&name);
                if is_block {
                    out.push('\n');
                }
                collect_text(child_ref, skip, out);
                if is_block {
                    out.push('\n');
                } else if matches!(name, "img" | "td" | "th") {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Collapses runs of whitespace inside each line and joins the non-empty
/// lines as paragraphs separated by one blank line.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split('\n') {
        let mut words = line.split_whitespace().peekable();
        if words.peek().is_none() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        for (i, word) in words.enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_script_removed() {
        assert_eq!(sanitize("<script>evil()</script><p>hello</p>"), "hello");
    }

    #[test]
    fn test_style_and_comments_removed() {
        assert_eq!(
            sanitize("<style>p{color:red}</style><!-- note --><b>bold</b> text"),
            "bold text"
        );
    }

    #[test]
    fn test_paragraphs_preserved() {
        assert_eq!(
            sanitize("<p>First   paragraph.</p><p>Second<br>line</p>"),
            "First paragraph.\n\nSecond\n\nline"
        );
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(sanitize("Fish &amp; chips &mdash; 5&nbsp;quid"), "Fish & chips — 5 quid");
    }

    #[test]
    fn test_encoded_markup_is_stripped_too() {
        assert_eq!(sanitize("&lt;script&gt;alert(1)&lt;/script&gt;safe"), "safe");
    }

    #[test]
    fn test_lone_angle_bracket_kept_as_text() {
        assert_eq!(sanitize("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(sanitize("Just words."), "Just words.");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   \n\t  "), "");
    }

    #[test]
    fn test_control_chars_removed() {
        assert_eq!(sanitize("a\x1b[31mb\x00c"), "abc");
    }

    #[test]
    fn test_deeply_encoded_markup_terminates() {
        let input = "&amp;amp;amp;amp;amp;lt;b&amp;amp;amp;amp;amp;gt;x";
        let once = sanitize(input);
        assert!(!once.contains('<'));
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_idempotent_on_examples() {
        for input in [
            "<script>evil()</script><p>hello</p>",
            "&lt;b&gt;bold&lt;/b&gt;",
            "a &amp;lt; b",
            "<div><ul><li>one</li><li>two</li></ul></div>",
            "x &amp;amp; y",
        ] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {input:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_sanitize_idempotent(input in ".{0,200}") {
            let once = sanitize(&input);
            prop_assert_eq!(sanitize(&once), once);
        }

        #[test]
        fn prop_sanitize_markup_idempotent(
            parts in prop::collection::vec(
                prop_oneof![
                    Just("<p>".to_string()),
                    Just("</p>".to_string()),
                    Just("<script>x()</script>".to_string()),
                    Just("&lt;".to_string()),
                    Just("&gt;".to_string()),
                    Just("&amp;".to_string()),
                    Just("<br/>".to_string()),
                    "[a-z <>&;]{0,8}",
                ],
                0..20,
            )
        ) {
            let input = parts.concat();
            let once = sanitize(&input);
            prop_assert!(!once.contains("<p>"));
            prop_assert_eq!(sanitize(&once), once);
        }
    }
}
