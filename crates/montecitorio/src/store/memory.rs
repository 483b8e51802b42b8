use std::collections::BTreeMap;

use super::{SittingKey, SittingRecord, Store, StoreError, VotationKey, VotationRecord};

/// Keeps every record in memory. Used by tests and throwaway runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    sittings: BTreeMap<SittingKey, SittingRecord>,
    votations: BTreeMap<VotationKey, VotationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sittings(&self) -> impl Iterator<Item = &SittingRecord> {
        self.sittings.values()
    }

    pub fn votations(&self) -> impl Iterator<Item = &VotationRecord> {
        self.votations.values()
    }
}

impl Store for MemoryStore {
    fn find_sitting(&self, key: &SittingKey) -> Result<Option<SittingRecord>, StoreError> {
        Ok(self.sittings.get(key).cloned())
    }

    fn get_or_create_sitting(
        &mut self,
        defaults: SittingRecord,
    ) -> Result<(SittingRecord, bool), StoreError> {
        if let Some(existing) = self.sittings.get(&defaults.key) {
            return Ok((existing.clone(), false));
        }
        self.sittings.insert(defaults.key, defaults.clone());
        Ok((defaults, true))
    }

    fn save_sitting(&mut self, record: &SittingRecord) -> Result<(), StoreError> {
        self.sittings.insert(record.key, record.clone());
        Ok(())
    }

    fn find_votation(&self, key: &VotationKey) -> Result<Option<VotationRecord>, StoreError> {
        Ok(self.votations.get(key).cloned())
    }

    fn get_or_create_votation(
        &mut self,
        defaults: VotationRecord,
    ) -> Result<(VotationRecord, bool), StoreError> {
        if let Some(existing) = self.votations.get(&defaults.key) {
            return Ok((existing.clone(), false));
        }
        self.votations.insert(defaults.key, defaults.clone());
        Ok((defaults, true))
    }

    fn save_votation(&mut self, record: &VotationRecord) -> Result<(), StoreError> {
        self.votations.insert(record.key, record.clone());
        Ok(())
    }

    fn votations_of(&self, sitting: &SittingKey) -> Result<Vec<VotationRecord>, StoreError> {
        Ok(self
            .votations
            .values()
            .filter(|v| &v.key.sitting == sitting)
            .cloned()
            .collect())
    }
}
