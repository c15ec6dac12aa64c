//! Long-description cleanup: strip reStructuredText/Markdown noise, re-wrap
//! and bound the length so it fits in a packaging manifest.

use regex::Regex;
use std::sync::LazyLock;

use crate::record::UNKNOWN;

static BADGE_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((\r*\.\. image::|:target:) https?|(:align:|:alt:))[^\n]*\n")
        .expect("valid badge regex")
});
static SHORT_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\r?\n|^).{0,8}(\r?\n|$)").expect("valid short line regex"));
static DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#\-=~`]+").expect("valid delimiter regex"));
static URLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+://[\w-]+(\.[\w-]+)*(/[^\s/]*)*").expect("valid url regex")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Strip markup noise and wrap to `width` columns.
///
/// Badge/image directives, lines of at most eight characters (titles),
/// delimiter runs and URLs are removed before whitespace is collapsed.
pub fn clean(description: &str, width: usize) -> String {
    if description == UNKNOWN {
        return UNKNOWN.to_string();
    }
    let text = BADGE_LINES.replace_all(description, "");
    let text = SHORT_LINES.replace_all(&text, "");
    let text = DELIMITERS.replace_all(&text, "");
    let text = URLS.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let wrapped = wrap(text.trim(), width);
    if wrapped.is_empty() {
        UNKNOWN.to_string()
    } else {
        wrapped
    }
}

/// Cut at the first line break at or after `threshold` bytes and mark the cut.
pub fn truncate(description: &str, threshold: usize) -> String {
    match description
        .match_indices('\n')
        .find(|(idx, _)| *idx >= threshold)
    {
        Some((idx, _)) => format!("{}\n...", &description[..idx]),
        None => description.to_string(),
    }
}

/// `clean` followed by `truncate`.
pub fn process(description: &str, width: usize, threshold: usize) -> String {
    truncate(&clean(description, width), threshold)
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}
