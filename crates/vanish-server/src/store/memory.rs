use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::model::SecretRecord;
use super::records::{RecordStore, Taken};

/// Process-local store. Records vanish with the process; useful for tests and
/// single-instance deployments that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, SecretRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SecretRecord>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl RecordStore for MemoryStore {
    fn insert_if_absent(&self, record: &SecretRecord) -> Result<bool> {
        let mut records = self.lock()?;
        if records.contains_key(&record.id) {
            return Ok(false);
        }
        records.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    fn take_live(&self, id: &str, now_ms: i64) -> Result<Taken> {
        let mut records = self.lock()?;
        let Some(mut record) = records.remove(id) else {
            return Ok(Taken::Missing);
        };
        if record.viewed {
            return Ok(Taken::Missing);
        }
        if record.is_expired(now_ms) {
            return Ok(Taken::Expired);
        }
        record.viewed = true;
        Ok(Taken::Live(record))
    }

    fn remove_expired(&self, now_ms: i64) -> Result<Vec<String>> {
        let mut records = self.lock()?;
        let expired: Vec<String> = records
            .values()
            .filter(|r| !r.viewed && r.is_expired(now_ms))
            .map(|r| r.id.clone())
            .collect();
        for id in &expired {
            records.remove(id);
        }
        Ok(expired)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Record created at t=0 that expires at `expires_at` (ms).
    fn record(id: &str, expires_at: i64) -> SecretRecord {
        SecretRecord {
            id: id.into(),
            ciphertext: vec![0xde, 0xad],
            iv: "iv".into(),
            filename: None,
            content_type: None,
            size: None,
            created_at: 0,
            expires_at,
            ttl_seconds: (expires_at / 1000) as u64,
            viewed: false,
        }
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let s = MemoryStore::new();
        assert!(s.insert_if_absent(&record("a", 10_000)).unwrap());
        assert!(!s.insert_if_absent(&record("a", 99_000)).unwrap());
        assert_eq!(s.count().unwrap(), 1);
    }

    #[test]
    fn take_removes_the_record() {
        let s = MemoryStore::new();
        s.insert_if_absent(&record("a", 10_000)).unwrap();
        match s.take_live("a", 5_000).unwrap() {
            Taken::Live(r) => {
                assert!(r.viewed);
                assert_eq!(r.ciphertext, vec![0xde, 0xad]);
            }
            other => panic!("expected live record, got {other:?}"),
        }
        assert!(matches!(s.take_live("a", 5_000).unwrap(), Taken::Missing));
        assert_eq!(s.count().unwrap(), 0);
    }

    #[test]
    fn expired_take_evicts() {
        let s = MemoryStore::new();
        s.insert_if_absent(&record("a", 10_000)).unwrap();
        assert!(matches!(s.take_live("a", 10_000).unwrap(), Taken::Expired));
        assert_eq!(s.count().unwrap(), 0);
    }

    #[test]
    fn remove_expired_keeps_live_records() {
        let s = MemoryStore::new();
        s.insert_if_absent(&record("old", 10_000)).unwrap();
        s.insert_if_absent(&record("new", 100_000)).unwrap();
        assert_eq!(s.remove_expired(10_000).unwrap(), vec!["old".to_string()]);
        assert_eq!(s.count().unwrap(), 1);
    }
}
