use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::config::SearchConfig;
use crate::error::{BridgeError, Result};
use crate::poll::SearchResult;

const RESULT_ROW_PATTERN: &str = concat!(
    r#"href=["']?(?P<link>/[a-zA-Z0-9]+)["']?>(?P<name>[^<]+)</a>"#,
    r#".*?title=["']?\d+["']?>(?P<age>[^<]+)</span>\s*<span>(?P<size>\d[^<]*)"#
);

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

pub struct Torrentz2Search {
    http: reqwest::Client,
    base_url: String,
    row: Regex,
}

impl Torrentz2Search {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let row = Regex::new(RESULT_ROW_PATTERN)
            .map_err(|err| BridgeError::Search(format!("invalid result pattern: {err}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            row,
        })
    }

    fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))
            .map_err(|err| BridgeError::Search(format!("invalid search base url: {err}")))?;
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        url.set_query(Some(&format!("f={encoded}")));
        Ok(url)
    }

    fn parse_results(&self, html: &str) -> Vec<SearchResult> {
        self.row
            .captures_iter(html)
            .map(|row| SearchResult {
                link: row["link"].to_owned(),
                name: row["name"].trim().to_owned(),
                age: row["age"].trim().to_owned(),
                size: row["size"].trim().to_owned(),
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for Torrentz2Search {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(BridgeError::Search("search query cannot be empty".to_owned()));
        }
        let url = self.search_url(query)?;
        debug!("search GET {url}");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Search(format!(
                "search returned status {}",
                status.as_u16()
            )));
        }
        let body = response.text().await?;
        let results = self.parse_results(&body);
        info!("search '{query}' found {} results", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{SearchProvider, Torrentz2Search};
    use crate::config::SearchConfig;
    use crate::error::BridgeError;

    const LISTING: &str = concat!(
        "<dl><dt><a href=/a1b2c3>Ubuntu 24.04 Desktop (amd64)</a></dt>",
        "<dd><span title=1718000000>3 months</span><span>5 GB</span><span>120</span></dd></dl>\n",
        "<dl><dt><a href=/d4e5f6>Debian_12.iso</a></dt>",
        "<dd><span title=1719000000>2 days</span><span>650 MB</span><span>9</span></dd></dl>\n"
    );

    fn provider(base_url: String) -> Torrentz2Search {
        Torrentz2Search::new(&SearchConfig {
            base_url,
            timeout_ms: 2_000,
        })
        .expect("provider")
    }

    #[test]
    fn listing_rows_are_scraped_in_order() {
        let results = provider("http://localhost".to_owned()).parse_results(LISTING);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].link, "/a1b2c3");
        assert_eq!(results[0].name, "Ubuntu 24.04 Desktop (amd64)");
        assert_eq!(results[0].age, "3 months");
        assert_eq!(results[0].size, "5 GB");
        assert_eq!(results[1].name, "Debian_12.iso");
        assert_eq!(results[1].size, "650 MB");
    }

    #[tokio::test]
    async fn query_spaces_are_sent_as_plus() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("f", "ubuntu iso"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(1)
            .mount(&server)
            .await;

        let search = provider(server.uri());
        let results = search.search(" ubuntu iso ").await.expect("search");
        assert_eq!(results.len(), 2);

        let requests = server.received_requests().await.expect("recorded requests");
        assert_eq!(requests[0].url.query(), Some("f=ubuntu+iso"));
    }

    #[tokio::test]
    async fn blank_query_fails_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider(server.uri())
            .search("   ")
            .await
            .expect_err("blank query must fail");
        assert!(matches!(err, BridgeError::Search(message) if message == "search query cannot be empty"));
    }
}
