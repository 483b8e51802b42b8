use std::pin::pin;

use chrono::NaiveDate;
use futures::stream::{self, Stream};
use futures::StreamExt;

use crate::fetch::{Fetch, FetchError, HttpFetcher, ParseError};
use crate::parser::{
    ExtractionError, ListingPage, parse_sitting_list, parse_votation_detail,
    parse_votation_listing,
};
use crate::site::{SiteConfig, UnsupportedHouse};
use crate::store::StoreError;
use crate::types::{
    ReferenceCode, Sitting, SittingListing, Votation, VotationDetail, VotationListing,
    VotationListingEntry,
};
use crate::utils::YearMonth;

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    UnsupportedHouse(#[from] UnsupportedHouse),
}

#[derive(Debug, Clone)]
pub struct WebScraper<F = HttpFetcher> {
    fetcher: F,
    site: SiteConfig,
    detail_concurrency: usize,
}

impl WebScraper<HttpFetcher> {
    pub fn new(site: SiteConfig) -> Result<Self, ScraperError> {
        Ok(Self::with_fetcher(HttpFetcher::new()?, site))
    }
}

impl<F: Fetch> WebScraper<F> {
    pub fn with_fetcher(fetcher: F, site: SiteConfig) -> Self {
        Self {
            fetcher,
            site,
            detail_concurrency: 1,
        }
    }

    /// Number of votation detail pages fetched at once within a sitting. Defaults to 1.
    pub fn with_detail_concurrency(mut self, detail_concurrency: usize) -> Self {
        self.detail_concurrency = detail_concurrency.max(1);
        self
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn list_sittings(&self, ym: YearMonth) -> Result<Vec<SittingListing>, ScraperError> {
        let url = self.site.summary_url(ym);
        log::info!("Parsing: {}", url);

        let page = self.fetcher.fetch(&url).await?;
        let sittings = parse_sitting_list(&page.document()?, &page.url, ym, &self.site)
            .inspect_err(|e| log::error!("Sitting listing for {} failed: {}", ym, e))?;

        log::info!("Returning {} sittings for {}", sittings.len(), ym);
        Ok(sittings)
    }

    /// Concatenates the sittings of every month in `window`, in window order.
    pub async fn list_sittings_in(
        &self,
        window: &[YearMonth],
    ) -> Result<Vec<SittingListing>, ScraperError> {
        let mut sittings = Vec::new();
        for &ym in window {
            sittings.extend(self.list_sittings(ym).await?);
        }
        Ok(sittings)
    }

    pub async fn list_recent_sittings(
        &self,
        n_months_back: u32,
    ) -> Result<Vec<SittingListing>, ScraperError> {
        self.list_sittings_in(&YearMonth::recent(n_months_back))
            .await
    }

    /// Walks the paginated votation listing of the sitting held on `date`,
    /// following the next-page control until a page no longer offers one.
    pub async fn fetch_votation_listing(
        &self,
        date: NaiveDate,
    ) -> Result<VotationListing, ScraperError> {
        let mut page_number = 1;
        let mut entries = Vec::new();

        loop {
            let url = self.site.votation_listing_url(page_number, date);
            let page = self.fetcher.fetch(&url).await?;
            let shape = parse_votation_listing(&page.document()?, &page.url, &self.site)
                .inspect_err(|e| log::error!("Votation listing page failed: {}", e))?;

            match shape {
                ListingPage::NoVotations if page_number == 1 => {
                    log::info!("No votations recorded in the sitting of {}", date);
                    return Ok(VotationListing::NoVotations);
                }
                ListingPage::NoVotations => {
                    log::warn!(
                        "Listing page {} for {} reports no votations, stopping",
                        page_number,
                        date
                    );
                    break;
                }
                ListingPage::Votations {
                    votations,
                    has_next,
                } => {
                    log::debug!(
                        "Listing page {} for {}: {} votation(s)",
                        page_number,
                        date,
                        votations.len()
                    );
                    entries.extend(votations);
                    if !has_next {
                        break;
                    }
                    page_number += 1;
                }
            }
        }

        log::info!("Found {} votations for the sitting of {}", entries.len(), date);
        Ok(VotationListing::Votations(entries))
    }

    pub async fn list_votations(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<VotationListingEntry>, ScraperError> {
        Ok(self.fetch_votation_listing(date).await?.into_entries())
    }

    pub async fn get_votation_details(
        &self,
        reference: &ReferenceCode,
    ) -> Result<VotationDetail, ScraperError> {
        let url = self.site.votation_detail_url(reference);
        let page = self.fetcher.fetch(&url).await?;
        let detail = parse_votation_detail(&page.document()?, &page.url, reference)
            .inspect_err(|e| log::error!("Votation {} detail failed: {}", reference, e))?;
        Ok(detail)
    }

    /// Fetches the detail of every entry, at most `detail_concurrency` at a time,
    /// yielding results in the order of `entries`.
    pub fn detail_stream<'a>(
        &'a self,
        entries: Vec<VotationListingEntry>,
    ) -> impl Stream<Item = (VotationListingEntry, Result<VotationDetail, ScraperError>)> + 'a {
        stream::iter(entries)
            .map(move |entry| async move {
                let detail = self.get_votation_details(&entry.reference).await;
                (entry, detail)
            })
            .buffered(self.detail_concurrency)
    }

    /// Full read: sittings of `window`, their votations and every votation's detail.
    pub async fn read(&self, window: &[YearMonth]) -> Result<Vec<Sitting>, ScraperError> {
        let listings = self.list_sittings_in(window).await?;
        let mut sittings = Vec::with_capacity(listings.len());

        for listing in listings {
            // Other sittings held the same day share the date-keyed listing.
            let entries: Vec<_> = self
                .list_votations(listing.date)
                .await?
                .into_iter()
                .filter(|e| e.reference.sitting == listing.number)
                .collect();
            let mut votations = Vec::with_capacity(entries.len());

            let mut details = pin!(self.detail_stream(entries));
            while let Some((entry, detail)) = details.next().await {
                votations.push(Votation {
                    reference: entry.reference,
                    url: entry.url,
                    detail: detail?,
                });
            }

            sittings.push(Sitting::from_listing(listing, votations));
        }

        Ok(sittings)
    }

    pub async fn read_recent(&self, n_months_back: u32) -> Result<Vec<Sitting>, ScraperError> {
        self.read(&YearMonth::recent(n_months_back)).await
    }
}
