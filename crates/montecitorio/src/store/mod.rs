mod dry_run;
mod memory;
mod sqlite;

pub use dry_run::DryRunStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::fmt::Display;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{House, ReferenceCode, SittingListing, VotationDetail, VotationListingEntry};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SittingKey {
    pub house: House,
    pub legislature: u32,
    pub number: u32,
}

impl Display for SittingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.house.code(), self.legislature, self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VotationKey {
    pub sitting: SittingKey,
    pub number: u32,
}

impl Display for VotationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.sitting, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SittingRecord {
    pub key: SittingKey,
    pub date: NaiveDate,
    pub reference_url: String,
    pub imported: bool,
}

impl SittingRecord {
    pub fn pending(key: SittingKey, listing: &SittingListing) -> Self {
        Self {
            key,
            date: listing.date,
            reference_url: listing.reference_url.clone(),
            imported: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotationRecord {
    pub key: VotationKey,
    pub reference: ReferenceCode,
    pub detail_url: String,
    pub detail: Option<VotationDetail>,
    pub imported: bool,
}

impl VotationRecord {
    pub fn pending(key: VotationKey, entry: &VotationListingEntry) -> Self {
        Self {
            key,
            reference: entry.reference,
            detail_url: entry.url.clone(),
            detail: None,
            imported: false,
        }
    }
}

/// Upsert contract the import pipeline relies on.
///
/// `get_or_create_*` returns the persisted record for the identity key carried
/// by `defaults`, creating it from `defaults` when absent. The boolean is true
/// when the record was created by this call.
pub trait Store {
    fn find_sitting(&self, key: &SittingKey) -> Result<Option<SittingRecord>, StoreError>;

    fn get_or_create_sitting(
        &mut self,
        defaults: SittingRecord,
    ) -> Result<(SittingRecord, bool), StoreError>;

    fn save_sitting(&mut self, record: &SittingRecord) -> Result<(), StoreError>;

    fn find_votation(&self, key: &VotationKey) -> Result<Option<VotationRecord>, StoreError>;

    fn get_or_create_votation(
        &mut self,
        defaults: VotationRecord,
    ) -> Result<(VotationRecord, bool), StoreError>;

    fn save_votation(&mut self, record: &VotationRecord) -> Result<(), StoreError>;

    /// Every persisted votation of a sitting, ordered by votation number.
    fn votations_of(&self, sitting: &SittingKey) -> Result<Vec<VotationRecord>, StoreError>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn find_sitting(&self, key: &SittingKey) -> Result<Option<SittingRecord>, StoreError> {
        (**self).find_sitting(key)
    }

    fn get_or_create_sitting(
        &mut self,
        defaults: SittingRecord,
    ) -> Result<(SittingRecord, bool), StoreError> {
        (**self).get_or_create_sitting(defaults)
    }

    fn save_sitting(&mut self, record: &SittingRecord) -> Result<(), StoreError> {
        (**self).save_sitting(record)
    }

    fn find_votation(&self, key: &VotationKey) -> Result<Option<VotationRecord>, StoreError> {
        (**self).find_votation(key)
    }

    fn get_or_create_votation(
        &mut self,
        defaults: VotationRecord,
    ) -> Result<(VotationRecord, bool), StoreError> {
        (**self).get_or_create_votation(defaults)
    }

    fn save_votation(&mut self, record: &VotationRecord) -> Result<(), StoreError> {
        (**self).save_votation(record)
    }

    fn votations_of(&self, sitting: &SittingKey) -> Result<Vec<VotationRecord>, StoreError> {
        (**self).votations_of(sitting)
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn find_sitting(&self, key: &SittingKey) -> Result<Option<SittingRecord>, StoreError> {
        (**self).find_sitting(key)
    }

    fn get_or_create_sitting(
        &mut self,
        defaults: SittingRecord,
    ) -> Result<(SittingRecord, bool), StoreError> {
        (**self).get_or_create_sitting(defaults)
    }

    fn save_sitting(&mut self, record: &SittingRecord) -> Result<(), StoreError> {
        (**self).save_sitting(record)
    }

    fn find_votation(&self, key: &VotationKey) -> Result<Option<VotationRecord>, StoreError> {
        (**self).find_votation(key)
    }

    fn get_or_create_votation(
        &mut self,
        defaults: VotationRecord,
    ) -> Result<(VotationRecord, bool), StoreError> {
        (**self).get_or_create_votation(defaults)
    }

    fn save_votation(&mut self, record: &VotationRecord) -> Result<(), StoreError> {
        (**self).save_votation(record)
    }

    fn votations_of(&self, sitting: &SittingKey) -> Result<Vec<VotationRecord>, StoreError> {
        (**self).votations_of(sitting)
    }
}

/// Opens the import database at `path`.
///
/// A dry run never creates the file or migrates its schema: an existing
/// database is opened read-only and a missing one is stood in for by an empty
/// [`MemoryStore`].
pub fn open_store(path: &Path, dry_run: bool) -> Result<Box<dyn Store>, StoreError> {
    if !dry_run {
        return Ok(Box::new(SqliteStore::open(path)?));
    }
    if path.exists() {
        Ok(Box::new(SqliteStore::open_read_only(path)?))
    } else {
        log::info!(
            "[dry-run] {} does not exist, starting from an empty store",
            path.display()
        );
        Ok(Box::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("montecitorio-{}-{}.db", name, std::process::id()))
    }

    fn sitting_key() -> SittingKey {
        SittingKey {
            house: House::Camera,
            legislature: 17,
            number: 152,
        }
    }

    #[test]
    fn test_dry_run_store_leaves_no_file_behind() {
        let path = temp_db("dry-run-missing");
        let _ = std::fs::remove_file(&path);

        let store = open_store(&path, true).expect("Dry run should open");

        assert!(store.find_sitting(&sitting_key()).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_store_is_created_outside_dry_run() {
        let path = temp_db("real-run");
        let _ = std::fs::remove_file(&path);

        let store = open_store(&path, false).expect("Failed to create store");
        drop(store);
        let created = path.exists();
        let _ = std::fs::remove_file(&path);

        assert!(created);
    }
}
