//! Article page scraping and text cleanup.
//!
//! - [`page`] downloads an article behind the [`PageScraper`] trait
//! - `extract` pulls title, body, image and date out of the HTML
//! - [`sanitize`] turns any markup into plain prose

mod date;
mod extract;
mod page;
mod sanitize;

use chrono::{DateTime, Utc};

pub use date::{date_from_url, parse_date};
pub use extract::extract_page;
pub use page::{HttpPageScraper, PageScraper, ScrapeError};
pub use sanitize::sanitize;

/// What a page scrape yielded. Every optional field is `None` rather than
/// empty when the page did not provide it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedPage {
    /// Canonical URL, or the final URL after redirects.
    pub resolved_url: String,
    pub title: Option<String>,
    /// Body text, already plain but not yet passed through [`sanitize`].
    pub text: Option<String>,
    pub top_image: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    /// Scheme and host of the publishing site.
    pub source_url: Option<String>,
}
