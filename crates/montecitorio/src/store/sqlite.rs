use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::{SittingKey, SittingRecord, Store, StoreError, VotationKey, VotationRecord};
use crate::types::{ReferenceCode, ReferenceCodeError, VotationDetail};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sittings (
    house TEXT NOT NULL,
    legislature INTEGER NOT NULL,
    number INTEGER NOT NULL,
    date TEXT NOT NULL,
    reference_url TEXT NOT NULL,
    is_imported INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (house, legislature, number)
);

CREATE TABLE IF NOT EXISTS votations (
    house TEXT NOT NULL,
    legislature INTEGER NOT NULL,
    sitting_number INTEGER NOT NULL,
    number INTEGER NOT NULL,
    reference_code TEXT NOT NULL,
    detail_url TEXT NOT NULL,
    detail TEXT,
    is_imported INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (house, legislature, sitting_number, number),
    FOREIGN KEY (house, legislature, sitting_number)
        REFERENCES sittings (house, legislature, number)
);
";

/// Relational store keyed by the sitting and votation identity keys.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

struct VotationRow {
    number: u32,
    reference_code: String,
    detail_url: String,
    detail: Option<String>,
    imported: bool,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        log::debug!("Opening store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an existing database without creating it or migrating its schema.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        log::debug!("Opening store at {} read-only", path.display());
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn votation_record(sitting: SittingKey, row: VotationRow) -> Result<VotationRecord, StoreError> {
        let key = VotationKey {
            sitting,
            number: row.number,
        };
        let reference: ReferenceCode =
            row.reference_code
                .parse()
                .map_err(|e: ReferenceCodeError| StoreError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
        let detail = row
            .detail
            .as_deref()
            .map(serde_json::from_str::<VotationDetail>)
            .transpose()?;

        Ok(VotationRecord {
            key,
            reference,
            detail_url: row.detail_url,
            detail,
            imported: row.imported,
        })
    }

    fn votation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VotationRow> {
        Ok(VotationRow {
            number: row.get(0)?,
            reference_code: row.get(1)?,
            detail_url: row.get(2)?,
            detail: row.get(3)?,
            imported: row.get(4)?,
        })
    }
}

impl Store for SqliteStore {
    fn find_sitting(&self, key: &SittingKey) -> Result<Option<SittingRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT date, reference_url, is_imported FROM sittings
                 WHERE house = ?1 AND legislature = ?2 AND number = ?3",
                params![key.house.code(), key.legislature, key.number],
                |row| {
                    Ok((
                        row.get::<_, NaiveDate>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(date, reference_url, imported)| SittingRecord {
            key: *key,
            date,
            reference_url,
            imported,
        }))
    }

    fn get_or_create_sitting(
        &mut self,
        defaults: SittingRecord,
    ) -> Result<(SittingRecord, bool), StoreError> {
        let key = defaults.key;
        let inserted = self.conn.execute(
            "INSERT INTO sittings (house, legislature, number, date, reference_url, is_imported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (house, legislature, number) DO NOTHING",
            params![
                key.house.code(),
                key.legislature,
                key.number,
                defaults.date,
                defaults.reference_url,
                defaults.imported
            ],
        )?;

        let record = self.find_sitting(&key)?.ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: "sitting vanished after upsert".to_string(),
        })?;
        Ok((record, inserted == 1))
    }

    fn save_sitting(&mut self, record: &SittingRecord) -> Result<(), StoreError> {
        let key = record.key;
        self.conn.execute(
            "INSERT INTO sittings (house, legislature, number, date, reference_url, is_imported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (house, legislature, number) DO UPDATE SET
                 date = excluded.date,
                 reference_url = excluded.reference_url,
                 is_imported = excluded.is_imported",
            params![
                key.house.code(),
                key.legislature,
                key.number,
                record.date,
                record.reference_url,
                record.imported
            ],
        )?;
        Ok(())
    }

    fn find_votation(&self, key: &VotationKey) -> Result<Option<VotationRecord>, StoreError> {
        let sitting = key.sitting;
        let row = self
            .conn
            .query_row(
                "SELECT number, reference_code, detail_url, detail, is_imported FROM votations
                 WHERE house = ?1 AND legislature = ?2 AND sitting_number = ?3 AND number = ?4",
                params![
                    sitting.house.code(),
                    sitting.legislature,
                    sitting.number,
                    key.number
                ],
                Self::votation_row,
            )
            .optional()?;

        row.map(|row| Self::votation_record(sitting, row))
            .transpose()
    }

    fn get_or_create_votation(
        &mut self,
        defaults: VotationRecord,
    ) -> Result<(VotationRecord, bool), StoreError> {
        let key = defaults.key;
        let detail = defaults
            .detail
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let inserted = self.conn.execute(
            "INSERT INTO votations (house, legislature, sitting_number, number,
                                    reference_code, detail_url, detail, is_imported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (house, legislature, sitting_number, number) DO NOTHING",
            params![
                key.sitting.house.code(),
                key.sitting.legislature,
                key.sitting.number,
                key.number,
                defaults.reference.to_string(),
                defaults.detail_url,
                detail,
                defaults.imported
            ],
        )?;

        let record = self.find_votation(&key)?.ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: "votation vanished after upsert".to_string(),
        })?;
        Ok((record, inserted == 1))
    }

    fn save_votation(&mut self, record: &VotationRecord) -> Result<(), StoreError> {
        let key = record.key;
        let detail = record
            .detail
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO votations (house, legislature, sitting_number, number,
                                    reference_code, detail_url, detail, is_imported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (house, legislature, sitting_number, number) DO UPDATE SET
                 reference_code = excluded.reference_code,
                 detail_url = excluded.detail_url,
                 detail = excluded.detail,
                 is_imported = excluded.is_imported",
            params![
                key.sitting.house.code(),
                key.sitting.legislature,
                key.sitting.number,
                key.number,
                record.reference.to_string(),
                record.detail_url,
                detail,
                record.imported
            ],
        )?;
        Ok(())
    }

    fn votations_of(&self, sitting: &SittingKey) -> Result<Vec<VotationRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT number, reference_code, detail_url, detail, is_imported FROM votations
             WHERE house = ?1 AND legislature = ?2 AND sitting_number = ?3
             ORDER BY number",
        )?;

        let rows = stmt
            .query_map(
                params![sitting.house.code(), sitting.legislature, sitting.number],
                Self::votation_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| Self::votation_record(*sitting, row))
            .collect()
    }
}
