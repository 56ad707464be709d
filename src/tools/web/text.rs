//! Visible text extraction from HTML

use scraper::Html;

/// Maximum characters returned to the model
pub const MAX_PAGE_TEXT_CHARS: usize = 8000;

/// Elements whose text is never visible
const HIDDEN: [&str; 4] = ["script", "style", "noscript", "template"];

/// Extract the readable text of a page
///
/// Script and style content is dropped, lines are trimmed, runs separated by
/// two or more spaces become separate lines, blank lines are removed and the
/// result is capped at [`MAX_PAGE_TEXT_CHARS`] characters.
#[must_use]
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut raw = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN.contains(&e.name()))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    let clean = raw
        .lines()
        .flat_map(|line| line.trim().split("  ").map(str::trim).collect::<Vec<_>>())
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    truncate_chars(&clean, MAX_PAGE_TEXT_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
