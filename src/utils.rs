//! Small string helpers used throughout the application:
//! - Plain-text extraction for provider titles that embed HTML
//! - Capitalization for topic headers
//! - Truncation for logging and for length-capped message entries

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Reduce provider text to a single line of plain text.
///
/// Some providers return titles with inline tags (`<b>`) or HTML entities
/// (`&amp;`); those are decoded and runs of whitespace collapsed.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(plain_text("Fed &amp; <b>ECB</b>\n hold"), "Fed & ECB hold");
/// ```
pub fn plain_text(raw: &str) -> String {
    let text = if raw.contains('<') || raw.contains('&') {
        let fragment = Html::parse_fragment(raw);
        fragment.root_element().text().collect::<String>()
    } else {
        raw.to_string()
    };
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Capitalize the first character of a string.
///
/// Used for topic headers (e.g., "forex" -> "Forex").
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let cut = floor_char_boundary(s, max);
        format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
    }
}

/// Shorten `s` to at most `max_chars` characters, ending with `…` when cut.
pub fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
