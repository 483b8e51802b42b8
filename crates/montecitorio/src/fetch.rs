use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::Html;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty response body for {url}")]
    EmptyBody { url: String },
    #[error("Response for {url} is not markup (content type: {content_type})")]
    NotMarkup { url: String, content_type: String },
}

/// A fetched response body, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl Page {
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: Some("text/html".to_string()),
            body: body.into(),
        }
    }

    /// Parses the body into a navigable document tree.
    pub fn document(&self) -> Result<Html, ParseError> {
        if self.body.trim().is_empty() {
            return Err(ParseError::EmptyBody {
                url: self.url.clone(),
            });
        }

        if let Some(content_type) = &self.content_type {
            let lower = content_type.to_lowercase();
            if !lower.contains("html") && !lower.contains("xml") {
                return Err(ParseError::NotMarkup {
                    url: self.url.clone(),
                    content_type: content_type.clone(),
                });
            }
        }

        if !self.body.contains('<') {
            return Err(ParseError::NotMarkup {
                url: self.url.clone(),
                content_type: self
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        Ok(Html::parse_document(&self.body))
    }
}

/// Retrieves remote pages. One outbound request per call, no caching.
pub trait Fetch {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Page, FetchError>>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }
}

fn transport_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            source,
        }
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        log::debug!("Fetching from url: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            log::error!("{} answered with status {}", url, status);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))
            .map_err(|e| transport_error(url, e))?;

        Ok(Page {
            url: url.to_string(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    #[test]
    fn test_document_rejects_empty_body() {
        let page = Page::html("http://example.org", "   \n");
        assert!(matches!(page.document(), Err(ParseError::EmptyBody { .. })));
    }

    #[test]
    fn test_document_rejects_non_markup_content_type() {
        let page = Page {
            url: "http://example.org".to_string(),
            content_type: Some("application/pdf".to_string()),
            body: "%PDF-1.4 <binary>".to_string(),
        };
        assert!(matches!(page.document(), Err(ParseError::NotMarkup { .. })));
    }

    #[test]
    fn test_document_rejects_plain_text_without_tags() {
        let page = Page {
            url: "http://example.org".to_string(),
            content_type: None,
            body: "Service temporarily unavailable".to_string(),
        };
        assert!(matches!(page.document(), Err(ParseError::NotMarkup { .. })));
    }

    #[test]
    fn test_document_parses_html() {
        let page = Page::html(
            "http://example.org",
            "<html><body><div id=\"titolo\">Ciao</div></body></html>",
        );
        let document = page.document().expect("Should parse");
        let sel = Selector::parse("div#titolo").unwrap();
        assert_eq!(document.select(&sel).count(), 1);
    }

    #[test]
    fn test_default_user_agent_names_crate() {
        let config = FetcherConfig::default();
        assert!(config.user_agent.starts_with("montecitorio/"));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
