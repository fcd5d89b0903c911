use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::extract::extract_page;
use super::ScrapedPage;
use crate::net::{read_limited_bytes, BodyError};
use crate::util::{validate_url, HostPolicy};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Errors that can occur while scraping an article page.
///
/// A scrape failure never aborts a pipeline run; the article falls back to
/// what its feed entry carries.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid page URL: {0}")]
    InvalidUrl(String),
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The server answered with something other than an HTML document
    #[error("Not an HTML page: {0}")]
    NotHtml(String),
}

impl From<BodyError> for ScrapeError {
    fn from(e: BodyError) -> Self {
        match e {
            BodyError::Network(e) => ScrapeError::Network(e),
            BodyError::TooLarge(_) => ScrapeError::ResponseTooLarge,
            BodyError::Incomplete { expected, received } => {
                ScrapeError::IncompleteResponse { expected, received }
            }
        }
    }
}

/// Downloads an article page and extracts its fields.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, page_url: &str) -> Result<ScrapedPage, ScrapeError>;
}

/// [`PageScraper`] backed by a single HTTP GET and the built-in extraction
/// heuristics.
#[derive(Debug, Clone)]
pub struct HttpPageScraper {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
    policy: HostPolicy,
}

impl HttpPageScraper {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_bytes: MAX_PAGE_SIZE,
            policy: HostPolicy::Public,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_host_policy(mut self, policy: HostPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn is_html(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "text/html" || essence == "application/xhtml+xml"
}

#[async_trait]
impl PageScraper for HttpPageScraper {
    async fn scrape(&self, page_url: &str) -> Result<ScrapedPage, ScrapeError> {
        let url = validate_url(page_url, self.policy)
            .map_err(|e| ScrapeError::InvalidUrl(e.to_string()))?;

        // One deadline covers the request and the body read
        let deadline = tokio::time::Instant::now() + self.timeout;
        let response = tokio::time::timeout_at(deadline, self.client.get(url.clone()).send())
            .await
            .map_err(|_| ScrapeError::Timeout)?
            .map_err(ScrapeError::Network)?;

        if !response.status().is_success() {
            return Err(ScrapeError::HttpStatus(response.status().as_u16()));
        }

        // Missing Content-Type is tolerated; plenty of small sites omit it.
        if let Some(ct) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_html(ct) {
                return Err(ScrapeError::NotHtml(ct.to_owned()));
            }
        }

        let final_url = response.url().clone();
        let bytes = tokio::time::timeout_at(deadline, read_limited_bytes(response, self.max_bytes))
            .await
            .map_err(|_| ScrapeError::Timeout)??;

        let html = String::from_utf8_lossy(&bytes);
        let page = extract_page(&html, &final_url);

        tracing::debug!(
            page = %url,
            resolved = %page.resolved_url,
            has_text = page.text.is_some(),
            bytes = bytes.len(),
            "Scraped page"
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head>
<meta property="og:title" content="Scraped Title">
<meta property="og:image" content="https://cdn.example.com/a.jpg">
</head><body><article><p>Body text that is long enough to be counted as a paragraph of content.</p></article></body></html>"#;

    fn scraper() -> HttpPageScraper {
        HttpPageScraper::new(reqwest::Client::new()).with_host_policy(HostPolicy::AllowPrivate)
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
    }

    #[tokio::test]
    async fn test_scrape_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(html(PAGE))
            .mount(&mock_server)
            .await;

        let url = format!("{}/story", mock_server.uri());
        let page = scraper().scrape(&url).await.unwrap();

        assert_eq!(page.title.as_deref(), Some("Scraped Title"));
        assert_eq!(page.top_image.as_deref(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(page.resolved_url, url);
        assert_eq!(page.source_url.as_deref(), Some(mock_server.uri().as_str()));
    }

    #[tokio::test]
    async fn test_redirect_target_is_resolved_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/short"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/long-story"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/long-story"))
            .respond_with(html(PAGE))
            .mount(&mock_server)
            .await;

        let page = scraper()
            .scrape(&format!("{}/short", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(page.resolved_url, format!("{}/long-story", mock_server.uri()));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let result = scraper().scrape(&format!("{}/story", mock_server.uri())).await;
        assert!(matches!(result, Err(ScrapeError::HttpStatus(403))));
    }

    #[tokio::test]
    async fn test_non_html_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
            )
            .mount(&mock_server)
            .await;

        let result = scraper().scrape(&format!("{}/doc.pdf", mock_server.uri())).await;
        assert!(matches!(result, Err(ScrapeError::NotHtml(ct)) if ct == "application/pdf"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html(PAGE).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let result = scraper()
            .with_timeout(Duration::from_millis(50))
            .scrape(&format!("{}/story", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(ScrapeError::Timeout)));
    }

    #[tokio::test]
    async fn test_timeout_spans_headers_and_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Each half arrives within the timeout; together they do not
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
                PAGE.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = socket.write_all(PAGE.as_bytes()).await;
        });

        let result = scraper()
            .with_timeout(Duration::from_millis(400))
            .scrape(&format!("http://{addr}/story"))
            .await;
        assert!(matches!(result, Err(ScrapeError::Timeout)));
    }

    #[tokio::test]
    async fn test_oversized_page_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html(PAGE))
            .mount(&mock_server)
            .await;

        let result = scraper()
            .with_max_bytes(32)
            .scrape(&format!("{}/story", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(ScrapeError::ResponseTooLarge)));
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("Text/HTML; charset=UTF-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/json"));
        assert!(!is_html("text/plain"));
    }
}
