//! Render a [`NewsSet`] into ready-to-send chat messages.
//!
//! # Layout
//!
//! ```text
//! 📰 *Latest Forex News*            (Telegram, legacy Markdown)
//!
//! 1. [Dollar slips](https://n.com/a)
//! _Reuters_
//!
//! 📰 **Latest Forex News**          (Discord)
//!
//! 1. <https://n.com/a>
//! **Dollar slips** · Reuters
//! ```
//!
//! Topics without articles are omitted. Messages are packed greedily and only
//! ever split between entries; a topic that continues into the next message
//! repeats its header with a `(cont.)` marker. Lengths are measured in UTF-16
//! code units, the stricter of the two platforms' counting rules.

use crate::models::{Article, NewsSet, Platform};
use crate::utils::{ellipsize, upcase};

/// Format news for a platform using the platform's own length cap.
pub fn format(news: &NewsSet, platform: Platform) -> Vec<String> {
    format_with_limit(news, platform, platform.max_message_len())
}

/// Format news with an explicit per-message length cap.
pub fn format_with_limit(news: &NewsSet, platform: Platform, limit: usize) -> Vec<String> {
    let mut batch = Batch::new(limit);

    for (topic, articles) in news.iter().filter(|(_, a)| !a.is_empty()) {
        let opening = header(topic, platform, false);
        // The continuation header is the longest header a topic can emit.
        let cont_header = header(topic, platform, true);
        let budget = limit.saturating_sub(text_len(&cont_header));

        for (i, article) in articles.iter().enumerate() {
            let entry = fit_entry(i + 1, article, platform, budget);
            if i == 0 {
                batch.push_section_start(&opening, &entry);
            } else {
                batch.push_entry(&cont_header, &entry);
            }
        }
    }

    batch.finish()
}

/// Accumulates messages and flushes when the next piece would not fit.
struct Batch {
    limit: usize,
    current: String,
    done: Vec<String>,
}

impl Batch {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            current: String::new(),
            done: Vec::new(),
        }
    }

    fn fits(&self, extra: usize) -> bool {
        text_len(&self.current) + extra <= self.limit
    }

    fn flush(&mut self) {
        let msg = self.current.trim_end().to_string();
        if !msg.is_empty() {
            self.done.push(msg);
        }
        self.current.clear();
    }

    /// A topic header plus its first entry never get separated.
    fn push_section_start(&mut self, header: &str, entry: &str) {
        if !self.current.is_empty() && !self.fits(text_len(header) + text_len(entry)) {
            self.flush();
        }
        self.current.push_str(header);
        self.current.push_str(entry);
    }

    fn push_entry(&mut self, cont_header: &str, entry: &str) {
        if !self.fits(text_len(entry)) {
            self.flush();
            self.current.push_str(cont_header);
        }
        self.current.push_str(entry);
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.done
    }
}

fn header(topic: &str, platform: Platform, continued: bool) -> String {
    let suffix = if continued { " (cont.)" } else { "" };
    let name = format!("Latest {} News{suffix}", upcase(topic));
    match platform {
        Platform::Telegram => format!("📰 *{}*\n\n", strip_telegram(&name)),
        Platform::Discord => format!("📰 **{}**\n\n", escape_discord(&name)),
    }
}

fn entry(index: usize, title: &str, article: &Article, platform: Platform) -> String {
    match platform {
        Platform::Telegram => format!(
            "{index}. [{title}]({})\n_{}_\n\n",
            telegram_link_target(article.url()),
            strip_telegram(article.source())
        ),
        Platform::Discord => format!(
            "{index}. <{}>\n**{title}** · {}\n\n",
            article.url(),
            escape_discord(article.source())
        ),
    }
}

/// Render one entry, shortening the title if the entry alone would exceed `budget`.
fn fit_entry(index: usize, article: &Article, platform: Platform, budget: usize) -> String {
    let mut title = display_title(article.title(), platform);
    let mut rendered = entry(index, &title, article, platform);

    while text_len(&rendered) > budget && !title.is_empty() {
        let overflow = text_len(&rendered) - budget;
        let keep = title.chars().count().saturating_sub(overflow.max(1));
        title = ellipsize(&title, keep);
        if keep <= 1 {
            title.clear();
        }
        rendered = entry(index, &title, article, platform);
    }
    rendered
}

fn display_title(raw: &str, platform: Platform) -> String {
    let cleaned = match platform {
        Platform::Telegram => strip_telegram(raw),
        Platform::Discord => escape_discord(raw),
    };
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        Article::NO_TITLE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Telegram's legacy Markdown has no escape for entity delimiters, so they are removed.
pub fn strip_telegram(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '[' | ']'))
        .collect()
}

/// Legacy Markdown ends a link target at the first `)`.
fn telegram_link_target(url: &str) -> String {
    url.replace('(', "%28").replace(')', "%29")
}

/// Backslash-escape characters Discord markdown would interpret, including
/// the brackets of masked links.
pub fn escape_discord(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|' | '<' | '>' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn text_len(s: &str) -> usize {
    s.encode_utf16().count()
}
