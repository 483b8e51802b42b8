use std::collections::BTreeSet;
use std::fmt::Display;
use std::pin::pin;

use futures::StreamExt;
use log::LevelFilter;
use serde::Serialize;

use crate::fetch::Fetch;
use crate::parser::ExtractionError;
use crate::scraper::{ScraperError, WebScraper};
use crate::store::{
    DryRunStore, SittingKey, SittingRecord, Store, VotationKey, VotationRecord,
};
use crate::types::{SittingListing, VotationListing, VotationListingEntry};
use crate::utils::YearMonth;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Run every fetch and extraction but persist nothing.
    pub dry_run: bool,
    /// Record per-unit failures and carry on instead of aborting the run.
    pub keep_going: bool,
    /// Threshold for the logger installed by the binary. The importer itself
    /// only emits through the `log` facade and never installs a logger.
    pub log_level: LevelFilter,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            keep_going: false,
            log_level: LevelFilter::Info,
        }
    }
}

impl ImportConfig {
    /// Maps a 0..=3 verbosity to a log threshold: error, warn, info, debug.
    pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
        match verbosity {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// URL or identity key of the unit that failed.
    pub unit: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub sittings_seen: usize,
    pub sittings_created: usize,
    pub sittings_skipped: usize,
    pub sittings_completed: usize,
    pub votations_imported: usize,
    pub votations_skipped: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Display for ImportReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nImport statistics:")?;
        writeln!(f, "  Sittings seen:          {}", self.sittings_seen)?;
        writeln!(f, "  Sittings created:       {}", self.sittings_created)?;
        writeln!(f, "  Sittings skipped:       {}", self.sittings_skipped)?;
        writeln!(f, "  Sittings completed:     {}", self.sittings_completed)?;
        writeln!(f, "  Votations imported:     {}", self.votations_imported)?;
        writeln!(f, "  Votations skipped:      {}", self.votations_skipped)?;
        writeln!(f, "  Failures:               {}", self.failures.len())?;
        for failure in &self.failures {
            writeln!(f, "    {}: {}", failure.unit, failure.error)?;
        }
        Ok(())
    }
}

/// Incremental import of sittings and votations into a [`Store`].
///
/// Units already flagged as imported are skipped, so a failed run is repaired
/// by running again over the same window.
pub struct Importer<'a, F, S> {
    scraper: &'a WebScraper<F>,
    store: S,
    config: ImportConfig,
}

impl<'a, F: Fetch, S: Store> Importer<'a, F, S> {
    pub fn new(scraper: &'a WebScraper<F>, store: S, config: ImportConfig) -> Self {
        Self {
            scraper,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn run(&mut self, window: &[YearMonth]) -> Result<ImportReport, ScraperError> {
        log::debug!("Import config: {:?}", self.config);

        if self.config.dry_run {
            log::info!("[dry-run] nothing will be persisted");
            let store = DryRunStore::new(&mut self.store);
            Run::new(self.scraper, store, &self.config).execute(window).await
        } else {
            Run::new(self.scraper, &mut self.store, &self.config)
                .execute(window)
                .await
        }
    }

    pub async fn run_recent(&mut self, n_months_back: u32) -> Result<ImportReport, ScraperError> {
        self.run(&YearMonth::recent(n_months_back)).await
    }
}

struct Run<'a, F, S> {
    scraper: &'a WebScraper<F>,
    store: S,
    config: &'a ImportConfig,
    report: ImportReport,
}

impl<'a, F: Fetch, S: Store> Run<'a, F, S> {
    fn new(scraper: &'a WebScraper<F>, store: S, config: &'a ImportConfig) -> Self {
        Self {
            scraper,
            store,
            config,
            report: ImportReport::default(),
        }
    }

    async fn execute(mut self, window: &[YearMonth]) -> Result<ImportReport, ScraperError> {
        for &ym in window {
            let listings = match self.scraper.list_sittings(ym).await {
                Ok(listings) => listings,
                Err(e) => {
                    self.fail(self.scraper.site().summary_url(ym), e)?;
                    continue;
                }
            };

            for listing in listings {
                if let Err(e) = self.import_sitting(&listing).await {
                    self.fail(listing.reference_url.clone(), e)?;
                }
            }
        }

        log::info!(
            "Import finished: {} sitting(s) seen, {} votation(s) imported, {} failure(s)",
            self.report.sittings_seen,
            self.report.votations_imported,
            self.report.failures.len()
        );
        Ok(self.report)
    }

    /// Aborts with `error` unless the run keeps going, in which case it is recorded.
    fn fail(&mut self, unit: String, error: ScraperError) -> Result<(), ScraperError> {
        if !self.config.keep_going {
            return Err(error);
        }
        log::error!("Failed {}: {}", unit, error);
        self.report.failures.push(ImportFailure {
            unit,
            error: error.to_string(),
        });
        Ok(())
    }

    async fn import_sitting(&mut self, listing: &SittingListing) -> Result<(), ScraperError> {
        let site = self.scraper.site();
        let key = SittingKey {
            house: site.house,
            legislature: site.legislature,
            number: listing.number,
        };
        self.report.sittings_seen += 1;

        let (mut sitting, created) = self
            .store
            .get_or_create_sitting(SittingRecord::pending(key, listing))?;
        if created {
            self.report.sittings_created += 1;
            log::info!("Created sitting n. {} of {} ({})", listing.number, listing.date, key);
        } else {
            log::info!("Found sitting n. {} of {} ({})", listing.number, listing.date, key);
        }

        if sitting.imported {
            self.report.sittings_skipped += 1;
            log::info!("Sitting {} already imported, skipping", key);
            return Ok(());
        }

        let entries = match self.scraper.fetch_votation_listing(listing.date).await? {
            VotationListing::NoVotations => {
                log::info!("No votations in sitting {}", key);
                Vec::new()
            }
            VotationListing::Votations(entries) => entries,
        };
        // The listing is keyed by date, so it also carries other sittings held that day.
        let (entries, others): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|e| e.reference.sitting == listing.number);
        if !others.is_empty() {
            log::debug!(
                "Ignoring {} votation(s) of other sittings held on {}",
                others.len(),
                listing.date
            );
        }
        let listed: BTreeSet<u32> = entries.iter().map(|e| e.reference.votation).collect();

        let mut complete = self.import_votations(key, entries).await?;

        // Votations persisted earlier but no longer listed still gate completion.
        complete &= self
            .store
            .votations_of(&key)?
            .iter()
            .filter(|v| !listed.contains(&v.key.number))
            .all(|v| v.imported);

        if complete {
            sitting.imported = true;
            self.store.save_sitting(&sitting)?;
            self.report.sittings_completed += 1;
            log::info!("Sitting {} imported", key);
        } else {
            log::warn!("Sitting {} left incomplete", key);
        }
        Ok(())
    }

    /// Returns true when every listed votation ends up imported.
    async fn import_votations(
        &mut self,
        sitting: SittingKey,
        entries: Vec<VotationListingEntry>,
    ) -> Result<bool, ScraperError> {
        let mut complete = true;
        let mut pending = Vec::new();

        for entry in entries {
            let key = VotationKey {
                sitting,
                number: entry.reference.votation,
            };
            match self.store.find_votation(&key)? {
                Some(stored) if stored.reference != entry.reference => {
                    let mismatch = ExtractionError::ReferenceMismatch {
                        key: key.to_string(),
                        stored: stored.reference,
                        scraped: entry.reference,
                    };
                    self.fail(key.to_string(), mismatch.into())?;
                    complete = false;
                }
                Some(stored) if stored.imported => {
                    log::debug!("Votation {} already imported", key);
                    self.report.votations_skipped += 1;
                }
                _ => pending.push(entry),
            }
        }

        if pending.is_empty() {
            return Ok(complete);
        }
        log::info!("Fetching {} votation detail(s) for sitting {}", pending.len(), sitting);

        let scraper = self.scraper;
        let mut details = pin!(scraper.detail_stream(pending));
        while let Some((entry, detail)) = details.next().await {
            let key = VotationKey {
                sitting,
                number: entry.reference.votation,
            };
            let detail = match detail {
                Ok(detail) => detail,
                Err(e) => {
                    self.fail(scraper.site().votation_detail_url(&entry.reference), e)?;
                    complete = false;
                    continue;
                }
            };

            let (mut record, created) = self
                .store
                .get_or_create_votation(VotationRecord::pending(key, &entry))?;
            if created {
                log::debug!("Created votation {} ({})", key, entry.reference);
            } else if record.reference != entry.reference {
                let mismatch = ExtractionError::ReferenceMismatch {
                    key: key.to_string(),
                    stored: record.reference,
                    scraped: entry.reference,
                };
                self.fail(key.to_string(), mismatch.into())?;
                complete = false;
                continue;
            }
            record.detail = Some(detail);
            record.imported = true;
            self.store.save_votation(&record)?;
            self.report.votations_imported += 1;
        }

        Ok(complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteConfig;
    use crate::store::{MemoryStore, SqliteStore};
    use crate::test_support::{FixtureFetcher, march_2024_site, read_fixture, reference};
    use crate::types::{House, ReferenceCode};
    use chrono::NaiveDate;

    fn march() -> Vec<YearMonth> {
        vec![YearMonth::new(2024, 3).unwrap()]
    }

    fn sitting_key(number: u32) -> SittingKey {
        SittingKey {
            house: House::Camera,
            legislature: 17,
            number,
        }
    }

    fn scraper() -> (SiteConfig, WebScraper<FixtureFetcher>) {
        let (site, fetcher) = march_2024_site();
        (site.clone(), WebScraper::with_fetcher(fetcher, site))
    }

    #[tokio::test]
    async fn test_first_run_imports_everything() {
        let (_, scraper) = scraper();
        let mut importer = Importer::new(&scraper, MemoryStore::new(), ImportConfig::default());

        let report = importer.run(&march()).await.expect("Import failed");

        assert_eq!(report.sittings_seen, 2);
        assert_eq!(report.sittings_created, 2);
        assert_eq!(report.sittings_completed, 2);
        assert_eq!(report.votations_imported, 6);
        assert!(report.is_success());

        let store = importer.store();
        assert!(store.sittings().all(|s| s.imported));
        assert_eq!(store.votations().count(), 6);
        assert!(store.votations().all(|v| v.imported && v.detail.is_some()));
    }

    #[tokio::test]
    async fn test_empty_sitting_is_marked_imported() {
        let (_, scraper) = scraper();
        let mut importer = Importer::new(&scraper, MemoryStore::new(), ImportConfig::default());
        importer.run(&march()).await.unwrap();

        let quiet = importer
            .store()
            .find_sitting(&sitting_key(153))
            .unwrap()
            .expect("Sitting 153 should be stored");
        assert!(quiet.imported);
        assert_eq!(quiet.date, NaiveDate::from_ymd_opt(2024, 3, 19).unwrap());
        assert!(importer.store().votations_of(&sitting_key(153)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_fetches_no_details() {
        let (_, scraper) = scraper();
        let mut store = MemoryStore::new();

        Importer::new(&scraper, &mut store, ImportConfig::default())
            .run(&march())
            .await
            .unwrap();
        scraper.fetcher().clear_requests();

        let report = Importer::new(&scraper, &mut store, ImportConfig::default())
            .run(&march())
            .await
            .unwrap();

        assert_eq!(report.sittings_skipped, 2);
        assert_eq!(report.sittings_created, 0);
        assert_eq!(report.votations_imported, 0);
        assert_eq!(scraper.fetcher().count_matching("schedaVotazione"), 0);
        assert_eq!(scraper.fetcher().count_matching("risultatidb"), 0);
        assert_eq!(store.sittings().count(), 2);
        assert_eq!(store.votations().count(), 6);
    }

    #[tokio::test]
    async fn test_failed_detail_is_repaired_by_rerun() {
        let (site, scraper) = scraper();
        let broken = site.votation_detail_url(&reference("152_4"));
        scraper.fetcher().remove(&broken);
        let mut store = MemoryStore::new();

        let err = Importer::new(&scraper, &mut store, ImportConfig::default())
            .run(&march())
            .await
            .expect_err("Missing detail page should abort the run");
        assert!(matches!(err, ScraperError::Fetch(_)));

        let busy = store.find_sitting(&sitting_key(152)).unwrap().unwrap();
        assert!(!busy.imported);
        let imported: Vec<u32> = store
            .votations_of(&sitting_key(152))
            .unwrap()
            .iter()
            .filter(|v| v.imported)
            .map(|v| v.key.number)
            .collect();
        assert_eq!(imported, [1, 2, 3]);

        scraper
            .fetcher()
            .insert(broken, read_fixture("votation_detail.html"));
        scraper.fetcher().clear_requests();

        let report = Importer::new(&scraper, &mut store, ImportConfig::default())
            .run(&march())
            .await
            .expect("Rerun should succeed");

        assert_eq!(report.votations_skipped, 3);
        assert_eq!(report.votations_imported, 3);
        assert_eq!(scraper.fetcher().count_matching("schedaVotazione"), 3);
        assert!(store.sittings().all(|s| s.imported));
    }

    #[tokio::test]
    async fn test_keep_going_records_failure() {
        let (site, scraper) = scraper();
        let broken = site.votation_detail_url(&reference("152_4"));
        scraper.fetcher().remove(&broken);

        let config = ImportConfig {
            keep_going: true,
            ..ImportConfig::default()
        };
        let mut importer = Importer::new(&scraper, MemoryStore::new(), config);
        let report = importer.run(&march()).await.expect("keep_going never aborts");

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, broken);
        assert_eq!(report.votations_imported, 5);
        assert_eq!(report.sittings_completed, 1);

        let store = importer.store();
        assert!(!store.find_sitting(&sitting_key(152)).unwrap().unwrap().imported);
        assert!(store.find_sitting(&sitting_key(153)).unwrap().unwrap().imported);
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let (_, scraper) = scraper();
        let config = ImportConfig {
            dry_run: true,
            ..ImportConfig::default()
        };
        let mut importer = Importer::new(&scraper, MemoryStore::new(), config);

        let report = importer.run(&march()).await.unwrap();

        assert_eq!(report.sittings_created, 2);
        assert_eq!(report.votations_imported, 6);
        assert_eq!(scraper.fetcher().count_matching("schedaVotazione"), 6);
        assert_eq!(importer.store().sittings().count(), 0);
        assert_eq!(importer.store().votations().count(), 0);
    }

    #[tokio::test]
    async fn test_sittings_sharing_a_day_keep_their_own_votations() {
        let site = SiteConfig::camera(17);
        let ym = YearMonth::new(2024, 3).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let summary = r#"<html><body>
<a class="eleres_seduta" href="/leg17/410?idSeduta=0152">Assemblea n. 152 del 15</a>
<a class="eleres_seduta" href="/leg17/410?idSeduta=0153">Assemblea n. 153 del 15</a>
</body></html>"#;

        let mut fetcher = FixtureFetcher::new()
            .with_body(site.summary_url(ym), summary)
            .with_fixture(site.votation_listing_url(1, day), "votations_shared_day.html");
        for code in ["152_1", "153_1"] {
            fetcher = fetcher.with_fixture(
                site.votation_detail_url(&reference(code)),
                "votation_detail.html",
            );
        }
        let scraper = WebScraper::with_fetcher(fetcher, site);
        let mut importer = Importer::new(&scraper, MemoryStore::new(), ImportConfig::default());

        let report = importer.run(&[ym]).await.expect("Import failed");

        assert_eq!(report.votations_imported, 2);
        assert_eq!(report.sittings_completed, 2);
        assert_eq!(scraper.fetcher().count_matching("schedaVotazione"), 2);
        for number in [152, 153] {
            let references: Vec<String> = importer
                .store()
                .votations_of(&sitting_key(number))
                .unwrap()
                .iter()
                .map(|v| v.reference.to_string())
                .collect();
            assert_eq!(references, [format!("{}_1", number)]);
        }
    }

    #[tokio::test]
    async fn test_reference_mismatch_is_not_overwritten() {
        let (_, scraper) = scraper();
        let mut store = MemoryStore::new();
        let stale = VotationRecord {
            key: VotationKey {
                sitting: sitting_key(152),
                number: 2,
            },
            reference: ReferenceCode::new(152, 9),
            detail_url: String::new(),
            detail: None,
            imported: true,
        };
        store.save_votation(&stale).unwrap();

        let err = Importer::new(&scraper, &mut store, ImportConfig::default())
            .run(&march())
            .await
            .expect_err("Mismatched reference should fail");

        assert!(matches!(
            err,
            ScraperError::Extraction(ExtractionError::ReferenceMismatch { .. })
        ));
        assert_eq!(store.find_votation(&stale.key).unwrap(), Some(stale.clone()));
        assert_eq!(scraper.fetcher().count_matching("schedaVotazione"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_details_keep_listing_order() {
        let (site, fetcher) = march_2024_site();
        let scraper = WebScraper::with_fetcher(fetcher, site).with_detail_concurrency(4);
        let mut importer = Importer::new(&scraper, MemoryStore::new(), ImportConfig::default());

        let report = importer.run(&march()).await.unwrap();

        assert_eq!(report.votations_imported, 6);
        let numbers: Vec<u32> = importer
            .store()
            .votations_of(&sitting_key(152))
            .unwrap()
            .iter()
            .map(|v| v.detail.as_ref().map_or(0, |d| d.number))
            .collect();
        assert_eq!(numbers, [1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_import_into_sqlite() {
        let (_, scraper) = scraper();
        let store = SqliteStore::in_memory().expect("Failed to open sqlite");
        let mut importer = Importer::new(&scraper, store, ImportConfig::default());

        importer.run(&march()).await.expect("Import failed");

        let store = importer.into_store();
        assert!(store.find_sitting(&sitting_key(152)).unwrap().unwrap().imported);
        let votations = store.votations_of(&sitting_key(152)).unwrap();
        assert_eq!(votations.len(), 6);
        assert_eq!(
            votations[5].detail.as_ref().map(|d| d.member_votes.len()),
            Some(7)
        );
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(ImportConfig::level_for_verbosity(0), LevelFilter::Error);
        assert_eq!(ImportConfig::level_for_verbosity(2), LevelFilter::Info);
        assert_eq!(ImportConfig::level_for_verbosity(9), LevelFilter::Debug);
    }
}
