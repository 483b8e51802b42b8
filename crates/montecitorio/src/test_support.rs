use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::fetch::{Fetch, FetchError, Page};
use crate::site::SiteConfig;
use crate::types::ReferenceCode;
use crate::utils::YearMonth;

/// Serves canned pages by URL and records every request, in order.
#[derive(Debug, Default)]
pub(crate) struct FixtureFetcher {
    pages: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

pub(crate) fn read_fixture(name: &str) -> String {
    fs::read_to_string(format!("fixtures/camera/{}", name)).expect("Failed to read fixture")
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(self, url: impl Into<String>, name: &str) -> Self {
        self.with_body(url, read_fixture(name))
    }

    pub fn with_body(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.into(), body.into());
    }

    pub fn remove(&self, url: &str) {
        self.pages.lock().unwrap().remove(url);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl Fetch for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .map(|body| Page::html(url, body.clone()))
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

pub(crate) const MARCH_2024_SUMMARY: &str = r#"<html><body>
<a class="eleres_seduta" href="/leg17/410?idSeduta=0152">Assemblea n. 152 del 15</a>
<a class="eleres_seduta" href="/leg17/410?idSeduta=0153">Assemblea n. 153 del 19</a>
</body></html>"#;

pub(crate) fn reference(code: &str) -> ReferenceCode {
    code.parse().expect("invalid reference code")
}

/// March 2024: sitting 152 on the 15th with six votations over three listing
/// pages, and sitting 153 on the 19th with no votations.
pub(crate) fn march_2024_site() -> (SiteConfig, FixtureFetcher) {
    let site = SiteConfig::camera(17);
    let ym = YearMonth::new(2024, 3).unwrap();
    let busy = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    let quiet = NaiveDate::from_ymd_opt(2024, 3, 19).unwrap();

    let mut fetcher = FixtureFetcher::new()
        .with_body(site.summary_url(ym), MARCH_2024_SUMMARY)
        .with_fixture(site.votation_listing_url(1, busy), "votations_page_1.html")
        .with_fixture(site.votation_listing_url(2, busy), "votations_page_2.html")
        .with_fixture(site.votation_listing_url(3, busy), "votations_page_3.html")
        .with_fixture(site.votation_listing_url(1, quiet), "votations_none.html");

    for n in 1..=6 {
        fetcher = fetcher.with_fixture(
            site.votation_detail_url(&ReferenceCode::new(152, n)),
            "votation_detail.html",
        );
    }

    (site, fetcher)
}
