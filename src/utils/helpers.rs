use crate::constants::{DB_TIMESTAMP_FORMAT, ID_TIMESTAMP_FORMAT};
use chrono::{DateTime, Utc};
use scraper::Html;

/// Current UTC time as stored in the database.
pub fn utc_now_formatted() -> String {
    format_db_timestamp(&Utc::now())
}

/// Current UTC time as a minute resolution id, e.g. `2024-01-29-12-01`.
pub fn utc_now_simple() -> String {
    Utc::now().format(ID_TIMESTAMP_FORMAT).to_string()
}

pub fn format_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Removes every `<think>...</think>` block a reasoning model may emit.
///
/// An opening tag without a matching close is left in place with the text after it.
pub fn remove_think_tags(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let Some(end) = rest[start..].find(CLOSE) else {
            break;
        };
        output.push_str(&rest[..start]);
        rest = &rest[start + end + CLOSE.len()..];
    }
    output.push_str(rest);
    output
}

/// Strips one pair of matching outer quotes.
pub fn remove_outer_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Normalizes raw LLM output: reasoning blocks removed, trimmed, unquoted.
pub fn clean_llm_output(text: &str) -> String {
    let without_think = remove_think_tags(text);
    remove_outer_quotes(without_think.trim()).trim().to_string()
}

/// Visible text of an HTML document or fragment, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let inside_code = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if !inside_code {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_think_tags() {
        assert_eq!(
            remove_think_tags("<think>plan</think>Answer <think>more</think>done"),
            "Answer done"
        );
        assert_eq!(remove_think_tags("no tags"), "no tags");
        assert_eq!(
            remove_think_tags("keep <think>unterminated"),
            "keep <think>unterminated"
        );
        assert_eq!(
            remove_think_tags("<think>a</think>Answer <think>truncated"),
            "Answer <think>truncated"
        );
    }

    #[test]
    fn test_clean_llm_output() {
        assert_eq!(clean_llm_output("<think>x</think>\n \"A Title\" \n"), "A Title");
        assert_eq!(clean_llm_output("'quoted'"), "quoted");
        assert_eq!(clean_llm_output("\"unbalanced"), "\"unbalanced");
    }

    #[test]
    fn test_html_to_text_skips_scripts() {
        let html = "<html><head><style>p{}</style></head><body><p>Hello <b>world</b></p><script>var x;</script></body></html>";
        assert_eq!(html_to_text(html), "Hello world");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
