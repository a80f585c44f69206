//! Outbound text cleanup before it reaches the chat channel.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Default cap on lines in a single outbound message.
pub const DEFAULT_MAX_LINES: usize = 4;

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static HTML_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)</?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^<>]*)?/?>").unwrap());

/// Markdown links `[label](url)` keep only the label and the url.
#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static MD_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());

/// Paired bold, italic, strikethrough and inline code spans.
#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static MD_EMPHASIS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\*\*(\S(?:[^*\n]*?\S)?)\*\*|__(\S(?:[^_\n]*?\S)?)__|\*(\S(?:[^*\n]*?\S)?)\*|~~(\S(?:[^~\n]*?\S)?)~~|`+([^`\n]+?)`+",
    )
    .unwrap()
});

/// Heading hashes, blockquote markers and list bullets at line start.
#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static MD_LINE_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:#{1,6}\s+|>\s*|[-+•]\s+|\d+[.)]\s+)").unwrap());

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());

/// Strip a code fence wrapping the whole text, including its language tag.
#[must_use]
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.len() >= 6 && trimmed.starts_with("```") && trimmed.ends_with("```") {
        let without_prefix = trimmed.strip_prefix("```").unwrap_or(trimmed);
        let without_suffix = without_prefix.strip_suffix("```").unwrap_or(without_prefix);
        return without_suffix
            .split_once('\n')
            .map_or_else(|| without_suffix.trim(), |(_, rest)| rest.trim());
    }
    trimmed
}

fn glues_span(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '/'
}

/// Unwraps emphasis spans. A span glued to a word or path on either side,
/// as in `a__b__c` or `x*y*z`, belongs to an identifier, URL or formula and
/// is kept verbatim.
fn strip_emphasis(text: &str) -> Cow<'_, str> {
    MD_EMPHASIS_REGEX.replace_all(text, |caps: &Captures<'_>| {
        let Some(whole) = caps.get(0) else {
            return String::new();
        };
        let before = text[..whole.start()].chars().next_back();
        let after = text[whole.end()..].chars().next();
        if before.is_some_and(glues_span) || after.is_some_and(glues_span) {
            return whole.as_str().to_owned();
        }
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map_or_else(String::new, |inner| inner.as_str().to_owned())
    })
}

/// Leftover unpaired `**`, `__`, `~~` or backtick runs standing alone.
fn is_stray_marker(token: &str) -> bool {
    token.len() >= 2 && token.chars().all(|c| matches!(c, '*' | '_' | '~' | '`'))
}

fn strip_wrapping_quotes(text: &str) -> &str {
    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}'), ('\'', '\'')] {
        if let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            if !inner.contains(open) && !inner.contains(close) {
                return inner.trim();
            }
        }
    }
    text
}

/// Flattens composer output into a short plain-text message.
///
/// Removes code fences, HTML tags and markdown markup, collapses runs of
/// whitespace, drops empty lines and keeps at most `max_lines` lines.
#[must_use]
pub fn sanitize_outbound(text: &str, max_lines: usize) -> String {
    let unfenced = strip_code_fence(text).replace("```", "");
    let no_html = HTML_TAG_REGEX.replace_all(&unfenced, "");
    let no_links = MD_LINK_REGEX.replace_all(&no_html, "$1 $2");
    let no_emphasis = strip_emphasis(&no_links);

    let lines: Vec<String> = no_emphasis
        .lines()
        .map(|line| {
            let line = MD_LINE_PREFIX_REGEX.replace(line, "");
            let line = WHITESPACE_REGEX.replace_all(&line, " ");
            let tokens: Vec<&str> = line.split(' ').filter(|token| !is_stray_marker(token)).collect();
            tokens.join(" ").trim().to_owned()
        })
        .filter(|line| !line.is_empty())
        .take(max_lines.max(1))
        .collect();

    strip_wrapping_quotes(lines.join("\n").trim()).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_block() {
        let input = "```text\nHi Ana, still interested?\n```";
        assert_eq!(sanitize_outbound(input, DEFAULT_MAX_LINES), "Hi Ana, still interested?");
    }

    #[test]
    fn removes_html_and_markdown() {
        let input = "<p>**Hi Ana!**</p> Just _checking_ in about `the demo`.";
        assert_eq!(
            sanitize_outbound(input, DEFAULT_MAX_LINES),
            "Hi Ana! Just _checking_ in about the demo."
        );
    }

    #[test]
    fn flattens_list_and_headings() {
        let input = "# Reminder\n\n- Meeting tomorrow\n-   at 10:00\n";
        assert_eq!(sanitize_outbound(input, DEFAULT_MAX_LINES), "Reminder\nMeeting tomorrow\nat 10:00");
    }

    #[test]
    fn limits_line_count() {
        let input = "one\ntwo\nthree\nfour\nfive";
        assert_eq!(sanitize_outbound(input, 2), "one\ntwo");
    }

    #[test]
    fn collapses_whitespace_and_quotes() {
        let input = "  \"Hello    there\t friend\"  ";
        assert_eq!(sanitize_outbound(input, DEFAULT_MAX_LINES), "Hello there friend");
    }

    #[test]
    fn keeps_link_target() {
        let input = "Book here: [calendar](https://cal.example/x)";
        assert_eq!(
            sanitize_outbound(input, DEFAULT_MAX_LINES),
            "Book here: calendar https://cal.example/x"
        );
    }

    #[test]
    fn markers_inside_words_and_urls_survive() {
        let input = "See https://x/a__b and https://x/a__b__c, call snake_case__name__v2 or 2*3*4.";
        assert_eq!(sanitize_outbound(input, DEFAULT_MAX_LINES), input);
    }

    #[test]
    fn standalone_emphasis_is_unwrapped() {
        let input = "__Ana__, this is *really* ~~late~~ **soon**: `5 * 3`";
        assert_eq!(sanitize_outbound(input, DEFAULT_MAX_LINES), "Ana, this is really late soon: 5 * 3");
    }

    #[test]
    fn unpaired_marker_runs_are_dropped() {
        assert_eq!(sanitize_outbound("Hi ** there ~~", DEFAULT_MAX_LINES), "Hi there");
        assert_eq!(sanitize_outbound("  \n ** ", DEFAULT_MAX_LINES), "");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize_outbound("   \n\n ", DEFAULT_MAX_LINES), "");
    }
}
