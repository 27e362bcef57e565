use std::path::Path;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::{debug, info, warn};

use super::model::SecretRecord;
use super::records::{RecordStore, Taken};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Leading byte of every stored record, ahead of the bincode payload.
/// v1 (0x01) held whole-second timestamps and is no longer readable.
const RECORD_V2_MARKER: u8 = 0x02;

/// redb-backed record store. Every operation runs in its own transaction;
/// redb serializes write transactions, which is what makes `take_live` atomic.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure the table exists so read transactions never fail on a fresh file.
        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl RecordStore for RedbStore {
    fn insert_if_absent(&self, record: &SecretRecord) -> Result<bool> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(SECRETS)?;
            if table.get(record.id.as_str())?.is_some() {
                false
            } else {
                table.insert(record.id.as_str(), bytes.as_slice())?;
                true
            }
        };
        if inserted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    fn take_live(&self, id: &str, now_ms: i64) -> Result<Taken> {
        let write_txn = self.db.begin_write()?;
        let taken = {
            let mut table = write_txn.open_table(SECRETS)?;

            // Copy the bytes out so the AccessGuard (which borrows `table`)
            // is dropped before the remove.
            let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => Taken::Missing,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    table.remove(id)?;
                    if record.viewed {
                        debug!(id = %id, "evicted already-viewed secret");
                        Taken::Missing
                    } else if record.is_expired(now_ms) {
                        debug!(id = %id, "lazy-evicted expired secret");
                        Taken::Expired
                    } else {
                        record.viewed = true;
                        Taken::Live(record)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(taken)
    }

    fn remove_expired(&self, now_ms: i64) -> Result<Vec<String>> {
        let write_txn = self.db.begin_write()?;
        let expired = {
            let mut table = write_txn.open_table(SECRETS)?;

            let mut ids = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                match decode(v.value()) {
                    Ok(record) if !record.viewed && record.is_expired(now_ms) => {
                        ids.push(k.value().to_owned());
                    }
                    Ok(_) => {}
                    Err(e) => warn!(id = %k.value(), error = %e, "skipping undecodable record"),
                }
            }

            for id in &ids {
                table.remove(id.as_str())?;
            }
            ids
        };
        write_txn.commit()?;

        if !expired.is_empty() {
            info!(removed = expired.len(), "swept expired secrets");
        }
        Ok(expired)
    }

    fn count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        Ok(table.len()? as usize)
    }
}

/// Encode a record as `[RECORD_V2_MARKER] + bincode(record)`.
fn encode(record: &SecretRecord) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode")?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_V2_MARKER);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<SecretRecord> {
    match bytes.split_first() {
        Some((&RECORD_V2_MARKER, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .context("bincode decode")?;
            Ok(record)
        }
        Some((marker, _)) => anyhow::bail!("unknown record format marker {marker:#04x}"),
        None => anyhow::bail!("empty record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const T0: i64 = 1_000_000;

    fn make_store() -> (RedbStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn record(id: &str, created_at: i64, ttl_seconds: u64) -> SecretRecord {
        SecretRecord {
            id: id.into(),
            ciphertext: vec![0x01, 0x02, 0xff],
            iv: "abc123".into(),
            filename: Some("notes.txt".into()),
            content_type: Some("text/plain".into()),
            size: Some(3),
            created_at,
            expires_at: created_at + ttl_seconds as i64 * 1000,
            ttl_seconds,
            viewed: false,
        }
    }

    #[test]
    fn insert_then_take_once() {
        let (s, _dir) = make_store();
        assert!(s.insert_if_absent(&record("A", T0, 30)).unwrap());

        match s.take_live("A", T0 + 1_000).unwrap() {
            Taken::Live(r) => {
                assert_eq!(r.ciphertext, vec![0x01, 0x02, 0xff]);
                assert_eq!(r.iv, "abc123");
                assert_eq!(r.filename.as_deref(), Some("notes.txt"));
                assert!(r.viewed);
            }
            other => panic!("expected live record, got {other:?}"),
        }
        assert!(matches!(s.take_live("A", T0 + 1_000).unwrap(), Taken::Missing));
        assert_eq!(s.count().unwrap(), 0);
    }

    #[test]
    fn insert_if_absent_keeps_the_original() {
        let (s, _dir) = make_store();
        assert!(s.insert_if_absent(&record("A", T0, 30)).unwrap());
        let mut other = record("A", T0 + 4_000_000, 60);
        other.iv = "different".into();
        assert!(!s.insert_if_absent(&other).unwrap());

        match s.take_live("A", T0 + 1_000).unwrap() {
            Taken::Live(r) => assert_eq!(r.iv, "abc123"),
            other => panic!("expected live record, got {other:?}"),
        }
    }

    #[test]
    fn expired_take_evicts_the_record() {
        let (s, _dir) = make_store();
        s.insert_if_absent(&record("E", T0, 1)).unwrap();
        assert!(matches!(s.take_live("E", T0 + 1_000).unwrap(), Taken::Expired));
        assert_eq!(s.count().unwrap(), 0);
        assert!(matches!(s.take_live("E", T0 + 1_000).unwrap(), Taken::Missing));
    }

    #[test]
    fn record_is_live_until_the_last_millisecond() {
        let (s, _dir) = make_store();
        s.insert_if_absent(&record("MS", T0 + 950, 1)).unwrap();
        assert!(matches!(s.take_live("MS", T0 + 1_949).unwrap(), Taken::Live(_)));
    }

    #[test]
    fn viewed_record_is_never_returned() {
        let (s, _dir) = make_store();
        let mut r = record("V", T0, 30);
        r.viewed = true;
        s.insert_if_absent(&r).unwrap();
        assert!(matches!(s.take_live("V", T0 + 1_000).unwrap(), Taken::Missing));
        assert_eq!(s.count().unwrap(), 0);
    }

    #[test]
    fn remove_expired_leaves_live_records() {
        let (s, _dir) = make_store();
        s.insert_if_absent(&record("DEAD", T0, 10)).unwrap();
        s.insert_if_absent(&record("LIVE", T0, 3600)).unwrap();

        let removed = s.remove_expired(T0 + 10_000).unwrap();
        assert_eq!(removed, vec!["DEAD".to_string()]);
        assert_eq!(s.count().unwrap(), 1);
        assert!(matches!(s.take_live("LIVE", T0 + 10_000).unwrap(), Taken::Live(_)));
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.db");
        {
            let s = RedbStore::open(&path).unwrap();
            s.insert_if_absent(&record("P", T0, 30)).unwrap();
        }
        let s = RedbStore::open(&path).unwrap();
        assert_eq!(s.count().unwrap(), 1);
        assert!(matches!(s.take_live("P", T0 + 1_000).unwrap(), Taken::Live(_)));
    }

    #[test]
    fn decode_rejects_unknown_marker() {
        let mut bytes = encode(&record("M", 0, 1)).unwrap();
        bytes[0] = 0x7f;
        assert!(decode(&bytes).is_err());
        bytes[0] = 0x01;
        assert!(decode(&bytes).is_err());
        assert!(decode(&[]).is_err());
    }
}
