//! Secondary indices over the primary log, backed by sled. Entirely
//! rebuildable: every tree here maps a lookup key to a log byte offset (or a
//! small derived value), never to record bytes themselves, so a corrupt or
//! missing index directory is recovered by replaying the log from scratch.

use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::{Record, RecordKind, Tier};
use ledger_core::types::{PrincipalId, RecordId, Timestamp};
use std::path::Path;

pub struct Indices {
    _db: sled::Db,
    /// RecordId bytes -> log offset (u64 LE).
    by_id: sled::Tree,
    /// author bytes || created_at (i64 BE, for sort order) || id bytes -> log offset.
    by_author_time: sled::Tree,
    /// kind bytes || created_at (i64 BE) || id bytes -> log offset.
    by_kind: sled::Tree,
    /// tier byte || created_at (i64 BE) || id bytes -> log offset.
    by_tier: sled::Tree,
    /// tier byte || covering_id bytes -> log offset (reverse rollup lookup).
    by_tier_covering: sled::Tree,
    /// author bytes -> tip RecordId bytes.
    tips: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: sled::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

impl Indices {
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        Ok(Self {
            by_id: db.open_tree("by_id").map_err(storage_err)?,
            by_author_time: db.open_tree("by_author_time").map_err(storage_err)?,
            by_kind: db.open_tree("by_kind").map_err(storage_err)?,
            by_tier: db.open_tree("by_tier").map_err(storage_err)?,
            by_tier_covering: db.open_tree("by_tier_covering").map_err(storage_err)?,
            tips: db.open_tree("tips").map_err(storage_err)?,
            meta: db.open_tree("meta").map_err(storage_err)?,
            _db: db,
        })
    }

    /// Drop every tree's contents. Used before a full rebuild-from-log pass.
    pub fn clear(&self) -> LedgerResult<()> {
        for t in [
            &self.by_id,
            &self.by_author_time,
            &self.by_kind,
            &self.by_tier,
            &self.by_tier_covering,
            &self.tips,
        ] {
            t.clear().map_err(storage_err)?;
        }
        Ok(())
    }

    pub fn index_record(&self, record: &Record, offset: u64) -> LedgerResult<()> {
        let off_bytes = offset.to_le_bytes();

        self.by_id
            .insert(record.id.as_bytes(), &off_bytes)
            .map_err(storage_err)?;

        let mut author_key = record.author.0.as_bytes().to_vec();
        author_key.extend_from_slice(&record.created_at.to_be_bytes());
        author_key.extend_from_slice(record.id.as_bytes());
        self.by_author_time
            .insert(author_key, &off_bytes)
            .map_err(storage_err)?;

        let mut kind_key = record.kind.as_str().as_bytes().to_vec();
        kind_key.extend_from_slice(&record.created_at.to_be_bytes());
        kind_key.extend_from_slice(record.id.as_bytes());
        self.by_kind.insert(kind_key, &off_bytes).map_err(storage_err)?;

        let mut tier_key = vec![record.tier as u8];
        tier_key.extend_from_slice(&record.created_at.to_be_bytes());
        tier_key.extend_from_slice(record.id.as_bytes());
        self.by_tier.insert(tier_key, &off_bytes).map_err(storage_err)?;

        for covered in &record.covers {
            let mut key = vec![record.tier as u8];
            key.extend_from_slice(covered.as_bytes());
            self.by_tier_covering.insert(key, &off_bytes).map_err(storage_err)?;
        }

        self.tips
            .insert(record.author.0.as_bytes(), record.id.as_bytes())
            .map_err(storage_err)?;

        Ok(())
    }

    pub fn lookup_offset(&self, id: &RecordId) -> LedgerResult<Option<u64>> {
        Ok(self
            .by_id
            .get(id.as_bytes())
            .map_err(storage_err)?
            .map(|v| u64::from_le_bytes(v.as_ref().try_into().unwrap())))
    }

    pub fn tip_of(&self, author: &PrincipalId) -> LedgerResult<Option<RecordId>> {
        Ok(self
            .tips
            .get(author.0.as_bytes())
            .map_err(storage_err)?
            .map(|v| {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&v);
                RecordId::from_bytes(arr)
            }))
    }

    /// Offsets of records authored by `author`, in `created_at` order,
    /// optionally bounded by `[since, until)`.
    pub fn scan_author(
        &self,
        author: &PrincipalId,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
    ) -> LedgerResult<Vec<u64>> {
        let prefix = author.0.as_bytes().to_vec();
        let mut out = Vec::new();
        for item in self.by_author_time.scan_prefix(&prefix) {
            let (key, val) = item.map_err(storage_err)?;
            let ts_bytes = &key[prefix.len()..prefix.len() + 8];
            let ts = i64::from_be_bytes(ts_bytes.try_into().unwrap());
            if since.map_or(false, |s| ts < s) {
                continue;
            }
            if until.map_or(false, |u| ts >= u) {
                continue;
            }
            out.push(u64::from_le_bytes(val.as_ref().try_into().unwrap()));
        }
        Ok(out)
    }

    pub fn scan_kind(
        &self,
        kind: RecordKind,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
    ) -> LedgerResult<Vec<u64>> {
        let prefix = kind.as_str().as_bytes().to_vec();
        let mut out = Vec::new();
        for item in self.by_kind.scan_prefix(&prefix) {
            let (key, val) = item.map_err(storage_err)?;
            let ts_bytes = &key[prefix.len()..prefix.len() + 8];
            let ts = i64::from_be_bytes(ts_bytes.try_into().unwrap());
            if since.map_or(false, |s| ts < s) {
                continue;
            }
            if until.map_or(false, |u| ts >= u) {
                continue;
            }
            out.push(u64::from_le_bytes(val.as_ref().try_into().unwrap()));
        }
        Ok(out)
    }

    pub fn scan_tier(
        &self,
        tier: Tier,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
    ) -> LedgerResult<Vec<u64>> {
        let prefix = vec![tier as u8];
        let mut out = Vec::new();
        for item in self.by_tier.scan_prefix(&prefix) {
            let (key, val) = item.map_err(storage_err)?;
            let ts_bytes = &key[prefix.len()..prefix.len() + 8];
            let ts = i64::from_be_bytes(ts_bytes.try_into().unwrap());
            if since.map_or(false, |s| ts < s) {
                continue;
            }
            if until.map_or(false, |u| ts >= u) {
                continue;
            }
            out.push(u64::from_le_bytes(val.as_ref().try_into().unwrap()));
        }
        Ok(out)
    }

    /// Find the rollup record (at `tier`) that covers `covered_id`, if any.
    pub fn find_covering(&self, tier: Tier, covered_id: &RecordId) -> LedgerResult<Option<u64>> {
        let mut key = vec![tier as u8];
        key.extend_from_slice(covered_id.as_bytes());
        Ok(self
            .by_tier_covering
            .get(key)
            .map_err(storage_err)?
            .map(|v| u64::from_le_bytes(v.as_ref().try_into().unwrap())))
    }

    pub fn height(&self) -> LedgerResult<u64> {
        Ok(self.by_id.len() as u64)
    }

    pub fn put_meta(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        self.meta.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self
            .meta
            .get(key.as_bytes())
            .map_err(storage_err)?
            .map(|v| v.to_vec()))
    }

    pub fn flush(&self) -> LedgerResult<()> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}
