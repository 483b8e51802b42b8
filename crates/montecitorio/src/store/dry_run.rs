use super::{SittingKey, SittingRecord, Store, StoreError, VotationKey, VotationRecord};

/// Forwards reads to the wrapped store and turns every write into a no-op.
///
/// `get_or_create_*` degrades to a lookup: an absent record is reported as
/// created and handed back from `defaults`, but nothing is persisted.
#[derive(Debug)]
pub struct DryRunStore<S> {
    inner: S,
}

impl<S: Store> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Store> Store for DryRunStore<S> {
    fn find_sitting(&self, key: &SittingKey) -> Result<Option<SittingRecord>, StoreError> {
        self.inner.find_sitting(key)
    }

    fn get_or_create_sitting(
        &mut self,
        defaults: SittingRecord,
    ) -> Result<(SittingRecord, bool), StoreError> {
        match self.inner.find_sitting(&defaults.key)? {
            Some(existing) => Ok((existing, false)),
            None => {
                log::debug!("[dry-run] would create sitting {}", defaults.key);
                Ok((defaults, true))
            }
        }
    }

    fn save_sitting(&mut self, record: &SittingRecord) -> Result<(), StoreError> {
        log::debug!(
            "[dry-run] skipping save of sitting {} (imported: {})",
            record.key,
            record.imported
        );
        Ok(())
    }

    fn find_votation(&self, key: &VotationKey) -> Result<Option<VotationRecord>, StoreError> {
        self.inner.find_votation(key)
    }

    fn get_or_create_votation(
        &mut self,
        defaults: VotationRecord,
    ) -> Result<(VotationRecord, bool), StoreError> {
        match self.inner.find_votation(&defaults.key)? {
            Some(existing) => Ok((existing, false)),
            None => {
                log::debug!("[dry-run] would create votation {}", defaults.key);
                Ok((defaults, true))
            }
        }
    }

    fn save_votation(&mut self, record: &VotationRecord) -> Result<(), StoreError> {
        log::debug!(
            "[dry-run] skipping save of votation {} (imported: {})",
            record.key,
            record.imported
        );
        Ok(())
    }

    fn votations_of(&self, sitting: &SittingKey) -> Result<Vec<VotationRecord>, StoreError> {
        self.inner.votations_of(sitting)
    }
}
