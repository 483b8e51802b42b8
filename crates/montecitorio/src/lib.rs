mod parser;
pub mod fetch;
pub mod pipeline;
pub mod scraper;
pub mod site;
pub mod store;
pub mod types;
pub mod utils;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use fetch::{Fetch, FetchError, FetcherConfig, HttpFetcher, Page, ParseError};
pub use parser::{ExtractionError, ListingPage};
pub use pipeline::{ImportConfig, ImportReport, Importer};
pub use scraper::{ScraperError, WebScraper};
pub use site::SiteConfig;
