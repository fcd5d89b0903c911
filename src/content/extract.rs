//! Heuristic extraction of article fields from a fetched HTML page.
//!
//! Each extractor returns `None` when it finds nothing usable; an empty
//! string is never reported as a value.

use chrono::{DateTime, Utc};
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

use super::date::{date_from_url, parse_date};
use super::sanitize::{collect_text, normalize_whitespace};
use super::ScrapedPage;
use crate::util::strip_control_chars;

/// Containers that usually hold the article body, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "[itemprop=articleBody]",
    "article",
    ".entry-content",
    ".post-content",
    ".article-content",
    ".article-body",
    ".story-body",
    ".post-body",
    "main .content",
    "main",
];

/// Minimum body length (in chars) for a selector match to be accepted.
/// Shorter matches are usually teasers or card grids.
const MIN_CONTENT_LEN: usize = 200;

/// Paragraphs shorter than this do not count towards a container's score.
const MIN_PARAGRAPH_LEN: usize = 25;

/// Elements never part of an article body.
const NOISE_ELEMENTS: &[&str] = &["nav", "aside", "footer", "form", "header", "menu", "dialog"];

/// class/id fragments that mark page chrome rather than content.
const NOISE_MARKERS: &[&str] = &[
    "comment", "share", "social", "related", "sidebar", "newsletter", "promo", "advert",
    "cookie", "breadcrumb", "subscribe", "footer", "masthead",
];

/// Whole lines dropped from body text.
const BOILERPLATE_LINES: &[&str] = &[
    "advertisement",
    "skip to content",
    "skip to main content",
    "loading comments...",
    "write a comment...",
    "share this:",
    "share this article",
    "share this story",
    "click to share",
    "related articles",
    "related stories",
    "read more",
    "menu",
];

/// Title separators between the headline and the site name.
const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " :: ", " » ", " · "];

/// Meta keys (property/name/itemprop, lowercased) carrying a publish date.
const DATE_META_KEYS: &[&str] = &[
    "article:published_time",
    "og:published_time",
    "article:published",
    "datepublished",
    "pubdate",
    "publishdate",
    "publish-date",
    "publish_date",
    "dc.date.issued",
    "dcterms.created",
    "dc.date",
    "parsely-pub-date",
    "sailthru.date",
    "date",
];

const IMAGE_META_KEYS: &[&str] = &[
    "og:image",
    "og:image:url",
    "og:image:secure_url",
    "twitter:image",
    "twitter:image:src",
];

struct Selectors {
    meta: Selector,
    h1: Selector,
    title: Selector,
    canonical: Selector,
    image_src: Selector,
    img: Selector,
    paragraph: Selector,
    time: Selector,
    date_published: Selector,
    content: Vec<Selector>,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).expect("static selector parses");
        Selectors {
            meta: parse("meta"),
            h1: parse("h1"),
            title: parse("title"),
            canonical: parse(r#"link[rel~="canonical"]"#),
            image_src: parse(r#"link[rel~="image_src"]"#),
            img: parse("img[src]"),
            paragraph: parse("p"),
            time: parse("time[datetime]"),
            date_published: parse(r#"[itemprop="datePublished"]"#),
            content: CONTENT_SELECTORS.iter().map(|css| parse(css)).collect(),
        }
    })
}

/// Extracts all scrapeable fields from `html`, fetched from `page_url`
/// (the final URL after redirects).
pub fn extract_page(html: &str, page_url: &Url) -> ScrapedPage {
    let doc = Html::parse_document(html);
    let metas = collect_meta(&doc);

    let canonical = canonical_url(&doc, &metas, page_url);
    let content = find_content(&doc);

    let publish_date = extract_publish_date(&doc, &metas)
        .or_else(|| date_from_url(canonical.as_str()))
        .or_else(|| date_from_url(page_url.as_str()));

    let source_url = match canonical.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
        url::Origin::Opaque(_) => None,
    };

    ScrapedPage {
        resolved_url: canonical.to_string(),
        title: extract_title(&doc, &metas, content.as_ref().map(|c| c.element)),
        text: content.as_ref().map(|c| c.text.clone()),
        top_image: extract_top_image(&doc, &metas, content.as_ref().map(|c| c.element), page_url),
        publish_date,
        source_url,
    }
}

/// Maps lowercased `property`/`name`/`itemprop` of every `<meta>` to its
/// first non-empty `content`.
fn collect_meta(doc: &Html) -> HashMap<String, String> {
    let mut metas = HashMap::new();
    for meta in doc.select(&selectors().meta) {
        let el = meta.value();
        let Some(content) = el.attr("content").and_then(clean) else {
            continue;
        };
        for key in ["property", "name", "itemprop"] {
            if let Some(k) = el.attr(key) {
                metas
                    .entry(k.trim().to_ascii_lowercase())
                    .or_insert_with(|| content.clone());
            }
        }
    }
    metas
}

fn clean(value: &str) -> Option<String> {
    let cleaned = strip_control_chars(value);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn element_text(el: ElementRef<'_>) -> Option<String> {
    let joined: String = el.text().collect::<Vec<_>>().join(" ");
    let normalized = normalize_whitespace(&joined).replace("\n\n", " ");
    clean(&normalized)
}

fn resolve_http(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

fn canonical_url(doc: &Html, metas: &HashMap<String, String>, page_url: &Url) -> Url {
    doc.select(&selectors().canonical)
        .filter_map(|l| l.value().attr("href"))
        .chain(metas.get("og:url").map(String::as_str))
        .find_map(|href| resolve_http(href, page_url))
        .unwrap_or_else(|| page_url.clone())
}

fn extract_title(
    doc: &Html,
    metas: &HashMap<String, String>,
    content: Option<ElementRef<'_>>,
) -> Option<String> {
    if let Some(title) = ["og:title", "twitter:title"]
        .iter()
        .find_map(|k| metas.get(*k).cloned())
    {
        return Some(title);
    }

    // A headline inside the body beats a page-level h1 (often the logo).
    let content_h1 = content.and_then(|c| c.select(&selectors().h1).find_map(element_text));
    if content_h1.is_some() {
        return content_h1;
    }
    let h1s: Vec<String> = doc.select(&selectors().h1).filter_map(element_text).collect();
    if h1s.len() == 1 {
        return h1s.into_iter().next();
    }

    doc.select(&selectors().title)
        .find_map(element_text)
        .map(|t| strip_site_name(&t))
        .or_else(|| h1s.into_iter().next())
}

/// "Headline | Site Name" → "Headline": keeps the longest segment.
fn strip_site_name(title: &str) -> String {
    for sep in TITLE_SEPARATORS {
        if title.contains(sep) {
            if let Some(longest) = title
                .split(sep)
                .map(str::trim)
                .max_by_key(|part| part.chars().count())
            {
                return longest.to_owned();
            }
        }
    }
    title.to_owned()
}

fn extract_publish_date(doc: &Html, metas: &HashMap<String, String>) -> Option<DateTime<Utc>> {
    if let Some(date) = DATE_META_KEYS
        .iter()
        .filter_map(|k| metas.get(*k))
        .find_map(|v| parse_date(v))
    {
        return Some(date);
    }

    let s = selectors();
    doc.select(&s.date_published)
        .chain(doc.select(&s.time))
        .find_map(|el| {
            let v = el.value();
            v.attr("datetime")
                .or_else(|| v.attr("content"))
                .and_then(parse_date)
                .or_else(|| element_text(el).and_then(|t| parse_date(&t)))
        })
}

fn extract_top_image(
    doc: &Html,
    metas: &HashMap<String, String>,
    content: Option<ElementRef<'_>>,
    page_url: &Url,
) -> Option<String> {
    let s = selectors();
    IMAGE_META_KEYS
        .iter()
        .filter_map(|k| metas.get(*k).map(String::as_str))
        .chain(doc.select(&s.image_src).filter_map(|l| l.value().attr("href")))
        .chain(
            content
                .into_iter()
                .flat_map(|c| c.select(&s.img))
                .filter_map(|img| img.value().attr("src")),
        )
        .find_map(|src| resolve_http(src, page_url))
        .map(|u| u.to_string())
}

fn is_noise(el: &Element) -> bool {
    if NOISE_ELEMENTS.contains(&el.name()) {
        return true;
    }
    let marked = |value: Option<&str>| {
        value.is_some_and(|v| {
            let v = v.to_ascii_lowercase();
            NOISE_MARKERS.iter().any(|m| v.contains(m))
        })
    };
    marked(el.attr("class")) || marked(el.id())
}

fn is_boilerplate(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    BOILERPLATE_LINES.contains(&lower.as_str())
        || lower.starts_with("image copyright")
        || lower.starts_with("sign up for")
        || lower.contains("proudly powered by wordpress")
}

struct Content<'a> {
    element: ElementRef<'a>,
    text: String,
}

fn body_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(el, &is_noise, &mut raw);
    let kept: Vec<&str> = raw.split('\n').filter(|l| !is_boilerplate(l)).collect();
    normalize_whitespace(&kept.join("\n"))
}

/// Finds the article body: a well-known container when one holds enough
/// text, otherwise the element whose paragraphs carry the most text.
fn find_content(doc: &Html) -> Option<Content<'_>> {
    let s = selectors();
    for selector in &s.content {
        for element in doc.select(selector) {
            if is_noise(element.value()) {
                continue;
            }
            let text = body_text(element);
            if text.chars().count() >= MIN_CONTENT_LEN {
                return Some(Content { element, text });
            }
        }
    }

    let mut scores = HashMap::new();
    for p in doc.select(&s.paragraph) {
        if p.ancestors().filter_map(ElementRef::wrap).any(|a| is_noise(a.value())) {
            continue;
        }
        let len = element_text(p).map_or(0, |t| t.chars().count());
        if len < MIN_PARAGRAPH_LEN {
            continue;
        }
        if let Some(parent) = p.parent().and_then(ElementRef::wrap) {
            *scores.entry(parent.id()).or_insert(0usize) += len;
        }
    }

    let best = scores.into_iter().max_by_key(|(_, score)| *score)?.0;
    let element = doc.tree.get(best).and_then(ElementRef::wrap)?;
    let text = body_text(element);
    if text.is_empty() {
        None
    } else {
        Some(Content { element, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn page_url() -> Url {
        Url::parse("https://news.example.com/2024/01/15/story?utm=1").unwrap()
    }

    fn long_paragraph(seed: &str) -> String {
        format!(
            "{seed} Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
             tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam."
        )
    }

    fn article_html() -> String {
        format!(
            r#"<!doctype html>
<html><head>
  <title>Big Story Happens | Example News</title>
  <meta property="og:title" content="Big Story Happens">
  <meta property="og:image" content="/img/lead.jpg">
  <meta property="article:published_time" content="2024-01-15T10:30:00Z">
  <link rel="canonical" href="https://news.example.com/2024/01/15/story">
  <script>var tracking = true;</script>
</head><body>
  <header><nav><a href="/">Home</a> <a href="/world">World</a></nav></header>
  <article>
    <h1>Big Story Happens</h1>
    <p>{}</p>
    <div class="share-tools">Share on Twitter</div>
    <p>Advertisement</p>
    <p>{}</p>
  </article>
  <footer>Copyright Example News</footer>
</body></html>"#,
            long_paragraph("First."),
            long_paragraph("Second.")
        )
    }

    #[test]
    fn test_extract_full_article() {
        let page = extract_page(&article_html(), &page_url());

        assert_eq!(page.title.as_deref(), Some("Big Story Happens"));
        assert_eq!(page.resolved_url, "https://news.example.com/2024/01/15/story");
        assert_eq!(page.source_url.as_deref(), Some("https://news.example.com"));
        assert_eq!(
            page.top_image.as_deref(),
            Some("https://news.example.com/img/lead.jpg")
        );
        assert_eq!(
            page.publish_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );

        let text = page.text.unwrap();
        assert!(text.starts_with("Big Story Happens\n\nFirst. Lorem ipsum"));
        assert!(text.contains("Second. Lorem ipsum"));
        assert!(!text.contains("Share on Twitter"));
        assert!(!text.contains("Advertisement"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("tracking"));
    }

    #[test]
    fn test_title_falls_back_to_title_tag_without_site_name() {
        let html = "<html><head><title>Quiet Headline - Example News</title></head><body></body></html>";
        let page = extract_page(html, &page_url());
        assert_eq!(page.title.as_deref(), Some("Quiet Headline"));
    }

    #[test]
    fn test_missing_fields_are_absent_not_empty() {
        let html = r#"<html><head><meta property="og:title" content="   "></head><body><p>short</p></body></html>"#;
        let url = Url::parse("https://example.org/about").unwrap();
        let page = extract_page(html, &url);
        assert_eq!(page.title, None);
        assert_eq!(page.text, None);
        assert_eq!(page.top_image, None);
        assert_eq!(page.publish_date, None);
        assert_eq!(page.resolved_url, "https://example.org/about");
        assert_eq!(page.source_url.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn test_content_found_without_known_container() {
        let html = format!(
            r#"<html><body>
  <div id="sidebar-widget"><p>{}</p></div>
  <div class="wrapper"><div class="x">
    <p>{}</p><p>{}</p>
  </div></div>
</body></html>"#,
            long_paragraph("Noise."),
            long_paragraph("Body one."),
            long_paragraph("Body two.")
        );
        let page = extract_page(&html, &page_url());
        let text = page.text.unwrap();
        assert!(text.starts_with("Body one."));
        assert!(text.contains("Body two."));
        assert!(!text.contains("Noise."));
    }

    #[test]
    fn test_image_from_content_when_no_meta() {
        let html = format!(
            r#"<html><body><article><img src="data:image/png;base64,AAAA"><img src="pics/a.png"><p>{}</p><p>{}</p></article></body></html>"#,
            long_paragraph("A."),
            long_paragraph("B.")
        );
        let url = Url::parse("https://example.org/posts/1").unwrap();
        let page = extract_page(&html, &url);
        assert_eq!(page.top_image.as_deref(), Some("https://example.org/posts/pics/a.png"));
    }

    #[test]
    fn test_publish_date_from_time_element_then_url() {
        let html = r#"<html><body><time datetime="2023-06-01">June 1</time></body></html>"#;
        let page = extract_page(html, &page_url());
        assert_eq!(
            page.publish_date,
            Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap())
        );

        let page = extract_page("<html></html>", &page_url());
        assert_eq!(
            page.publish_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable_meta_date_is_skipped() {
        let html = r#"<html><head><meta name="date" content="sometime"></head></html>"#;
        let url = Url::parse("https://example.org/story").unwrap();
        assert_eq!(extract_page(html, &url).publish_date, None);
    }

    #[test]
    fn test_strip_site_name() {
        assert_eq!(strip_site_name("Headline | Site"), "Headline");
        assert_eq!(strip_site_name("Site :: A much longer headline"), "A much longer headline");
        assert_eq!(strip_site_name("No separator"), "No separator");
    }
}
