//! `RecordStore`: the combination of the primary log and its secondary
//! indices, plus the storage-level checks that don't depend on consensus
//! state (duplicate id, clock skew, oversize payload). Quorum/signature/
//! chain validation happens one layer up, in `ledger-consensus`, before a
//! record ever reaches `append`.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use ledger_core::constants::{CLOCK_SKEW_TOLERANCE_SECS, MAX_PAYLOAD_BYTES};
use ledger_core::error::{LedgerError, LedgerResult};
use ledger_core::record::{Record, RecordKind, Tier};
use ledger_core::types::{PrincipalId, RecordId, Timestamp};

use crate::index::Indices;
use crate::log::Log;

pub struct RecordStore {
    log: Log,
    indices: Indices,
}

impl RecordStore {
    /// Open (creating if absent) the store rooted at `dir`: `dir/ledger.log`
    /// for the primary log, `dir/ledger.idx` for the sled secondary indices.
    pub fn open<P: AsRef<Path>>(dir: P) -> LedgerResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| LedgerError::IoError(e.to_string()))?;

        let outcome = Log::open(dir.join("ledger.log"))?;
        if outcome.truncated_bytes > 0 {
            tracing::warn!(
                bytes = outcome.truncated_bytes,
                "truncated partial frame at end of log during recovery"
            );
        }
        let log = outcome.log;
        let indices = Indices::open(dir.join("ledger.idx"))?;

        let mut store = Self { log, indices };
        store.rebuild_indices_if_stale()?;
        Ok(store)
    }

    /// If the index height disagrees with the log's record count (e.g. the
    /// index directory was deleted, or recovery truncated the log past what
    /// the index last saw), rebuild the indices from scratch by replay.
    fn rebuild_indices_if_stale(&mut self) -> LedgerResult<()> {
        let frames = self.log.read_all()?;
        let index_height = self.indices.height()?;
        if index_height as usize == frames.len() {
            return Ok(());
        }
        tracing::info!(
            log_records = frames.len(),
            index_height,
            "rebuilding secondary indices from log"
        );
        self.indices.clear()?;
        for (offset, record) in &frames {
            self.indices.index_record(record, *offset)?;
        }
        self.indices.flush()?;
        Ok(())
    }

    /// Append an already quorum-signed, chain-validated record. Performs the
    /// storage-level checks that are independent of consensus (duplicate id,
    /// clock skew, payload size) and is idempotent on `DuplicateId`.
    pub fn append(&mut self, record: &Record) -> LedgerResult<RecordId> {
        if record.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(LedgerError::PayloadTooLarge {
                size: record.payload.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs() as i64;
        let record_secs = record.created_at / 1_000_000_000;
        if record_secs - now > CLOCK_SKEW_TOLERANCE_SECS {
            return Err(LedgerError::ClockSkew {
                ts: record_secs,
                tolerance_secs: CLOCK_SKEW_TOLERANCE_SECS,
            });
        }

        if self.indices.lookup_offset(&record.id)?.is_some() {
            return Err(LedgerError::DuplicateId(record.id.to_hex()));
        }

        let expected_id = record.compute_id();
        if expected_id != record.id {
            return Err(LedgerError::Malformed(format!(
                "id mismatch: declared {}, computed {}",
                record.id, expected_id
            )));
        }

        let offset = self.log.append(record)?;
        self.indices.index_record(record, offset)?;
        self.indices.flush()?;
        Ok(record.id)
    }

    pub fn get(&self, id: &RecordId) -> LedgerResult<Option<Record>> {
        match self.indices.lookup_offset(id)? {
            Some(offset) => Ok(Some(self.log.read_at(offset)?)),
            None => Ok(None),
        }
    }

    pub fn scan_author(
        &self,
        author: &PrincipalId,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
    ) -> LedgerResult<Vec<Record>> {
        let offsets = self.indices.scan_author(author, since, until)?;
        offsets.into_iter().map(|o| self.log.read_at(o)).collect()
    }

    pub fn scan_kind(
        &self,
        kind: RecordKind,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
    ) -> LedgerResult<Vec<Record>> {
        let offsets = self.indices.scan_kind(kind, since, until)?;
        offsets.into_iter().map(|o| self.log.read_at(o)).collect()
    }

    pub fn scan_tier(
        &self,
        tier: Tier,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
    ) -> LedgerResult<Vec<Record>> {
        let offsets = self.indices.scan_tier(tier, since, until)?;
        offsets.into_iter().map(|o| self.log.read_at(o)).collect()
    }

    pub fn find_covering(&self, tier: Tier, covered_id: &RecordId) -> LedgerResult<Option<Record>> {
        match self.indices.find_covering(tier, covered_id)? {
            Some(offset) => Ok(Some(self.log.read_at(offset)?)),
            None => Ok(None),
        }
    }

    pub fn tip(&self, author: &PrincipalId) -> LedgerResult<Option<RecordId>> {
        self.indices.tip_of(author)
    }

    pub fn height(&self) -> LedgerResult<u64> {
        self.indices.height()
    }

    /// Replay every record in the log, in append order. Used by consensus
    /// and rollup state to rebuild in-memory derived state at startup.
    pub fn replay(&self) -> LedgerResult<Vec<Record>> {
        Ok(self.log.read_all()?.into_iter().map(|(_, r)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::record::{QuorumSig, Tier};
    use ledger_core::types::{Signature, ValidatorId};

    fn make_record(author: &str, prev: Option<RecordId>, nonce: u8) -> Record {
        let mut r = Record {
            id: RecordId::from_bytes([0u8; 32]),
            kind: RecordKind::VoteCast,
            author: PrincipalId(author.into()),
            tier: Tier::Page,
            created_at: 1_700_000_000_000_000_000 + nonce as i64,
            prev,
            payload: vec![nonce],
            author_sig: Signature(vec![1, 2, 3]),
            quorum_sigs: vec![QuorumSig {
                validator_id: ValidatorId("v1".into()),
                signature: Signature(vec![4, 5]),
            }],
            covers: vec![],
        };
        r.id = r.compute_id();
        r
    }

    #[test]
    fn append_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::open(dir.path()).unwrap();
        let r = make_record("p1", None, 1);
        let id = store.append(&r).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap(), r);
        assert_eq!(store.height().unwrap(), 1);
        assert_eq!(store.tip(&r.author).unwrap(), Some(id));
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::open(dir.path()).unwrap();
        let r = make_record("p1", None, 1);
        store.append(&r).unwrap();
        let err = store.append(&r).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateId(_)));
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::open(dir.path()).unwrap();
        let mut r = make_record("p1", None, 1);
        r.payload = vec![0u8; MAX_PAYLOAD_BYTES + 1];
        r.id = r.compute_id();
        let err = store.append(&r).unwrap_err();
        assert!(matches!(err, LedgerError::PayloadTooLarge { .. }));
    }

    #[test]
    fn reopen_after_partial_frame_truncates_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("ledger.log");
        {
            let mut store = RecordStore::open(dir.path()).unwrap();
            let r1 = make_record("p1", None, 1);
            store.append(&r1).unwrap();
        }
        // Corrupt the log by appending a truncated frame (length header with
        // a body shorter than declared).
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
            f.write_all(&100u32.to_le_bytes()).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }
        let store = RecordStore::open(dir.path()).unwrap();
        assert_eq!(store.height().unwrap(), 1);
    }

    #[test]
    fn scan_kind_returns_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::open(dir.path()).unwrap();
        let r1 = make_record("p1", None, 1);
        let r2 = make_record("p2", None, 2);
        store.append(&r1).unwrap();
        store.append(&r2).unwrap();
        let found = store.scan_kind(RecordKind::VoteCast, None, None).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, r1.id);
        assert_eq!(found[1].id, r2.id);
    }
}
