use feed_rs::model::{Entry, Feed, Link};
use feed_rs::parser;

use super::{FeedEntry, FeedMeta, ParsedFeed};
use crate::content::parse_date;
use crate::util::strip_control_chars;

/// Parses an RSS/Atom document into feed metadata and its entries.
///
/// Entries keep the document order. An entry without any link is still
/// returned (with `link: None`); the pipeline decides what to do with it.
/// `base_url` resolves relative links found in the document. Entry dates
/// go through [`parse_date`], so non-RFC timestamps survive; a date it
/// cannot read is absent.
pub fn parse_feed(bytes: &[u8], base_url: Option<&str>) -> Result<ParsedFeed, parser::ParseFeedError> {
    let feed = parser::Builder::new()
        .base_uri(base_url)
        .timestamp_parser(parse_date)
        .build()
        .parse(bytes)?;
    Ok(convert(feed))
}

fn convert(feed: Feed) -> ParsedFeed {
    let meta = FeedMeta {
        title: non_empty(feed.title.map(|t| t.content)),
        link: homepage_link(&feed.links),
        image: non_empty(
            feed.logo
                .map(|i| i.uri)
                .or_else(|| feed.icon.map(|i| i.uri)),
        ),
    };

    let entries = feed.entries.into_iter().map(convert_entry).collect();

    ParsedFeed { meta, entries }
}

fn convert_entry(entry: Entry) -> FeedEntry {
    let link = entry_link(&entry.links);
    let published = entry.published.or(entry.updated);
    let description = entry
        .summary
        .map(|s| s.content)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.and_then(|c| c.body));

    FeedEntry {
        link,
        title: non_empty(entry.title.map(|t| t.content)),
        published,
        description: non_empty(description),
    }
}

/// Picks the article link of an entry: `rel="alternate"` (or no rel) wins
/// over enclosures, replies and the like.
fn entry_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| non_empty(Some(l.href.clone())))
}

/// The publisher homepage: the first link that is not the feed itself.
fn homepage_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| !matches!(l.rel.as_deref(), Some("self") | Some("hub")))
        .and_then(|l| non_empty(Some(l.href.clone())))
}

/// Normalises empty or whitespace-only strings to absent and strips
/// control characters from whatever survives.
fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let cleaned = strip_control_chars(v.trim()).into_owned();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    })
}
