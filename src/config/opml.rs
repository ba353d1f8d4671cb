use super::FeedSource;
use crate::errors::Error;
use std::fs;
use std::path::Path;

use tracing::info;

/// Reads RSS/Atom subscriptions from an OPML file.
pub fn load_opml_feeds(path: &Path) -> Result<Vec<FeedSource>, Error> {
    let text = fs::read_to_string(path)?;
    let feeds = parse_opml(&text)?;
    info!("Loaded {} feeds from {}", feeds.len(), path.display());
    Ok(feeds)
}

/// Extracts `outline` elements of type rss or atom that carry an `xmlUrl`.
///
/// The feed name is taken from `title`, then `text`, then the URL host.
pub fn parse_opml(text: &str) -> Result<Vec<FeedSource>, Error> {
    let doc = roxmltree::Document::parse(text)?;

    let feeds = doc
        .descendants()
        .filter(|node| node.has_tag_name("outline"))
        .filter(|node| {
            node.attribute("type")
                .map(|t| t.eq_ignore_ascii_case("rss") || t.eq_ignore_ascii_case("atom"))
                .unwrap_or(false)
        })
        .filter_map(|node| {
            let url = node.attribute("xmlUrl")?.trim().to_string();
            if url.is_empty() {
                return None;
            }
            let name = node
                .attribute("title")
                .or_else(|| node.attribute("text"))
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    url::Url::parse(&url)
                        .ok()
                        .and_then(|u| u.host_str().map(str::to_string))
                })
                .unwrap_or_else(|| url.clone());
            Some(FeedSource { name, url })
        })
        .collect();

    Ok(feeds)
}
