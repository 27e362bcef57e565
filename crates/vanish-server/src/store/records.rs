use anyhow::Result;

use super::model::SecretRecord;

/// Outcome of [`RecordStore::take_live`].
#[derive(Debug)]
pub enum Taken {
    /// The record was live; it has been marked viewed and removed.
    Live(SecretRecord),
    /// The record existed but was past `expires_at`; it has been removed.
    Expired,
    /// No record under that id (never created, or already consumed).
    Missing,
}

/// Key-addressed durable storage for secret records.
///
/// Implementations must make `take_live` a single atomic transition: of two
/// concurrent calls for the same id, at most one may observe `Taken::Live`.
pub trait RecordStore: Send + Sync {
    /// Insert `record` unless a record with the same id exists.
    /// Returns false (and writes nothing) on an id collision.
    fn insert_if_absent(&self, record: &SecretRecord) -> Result<bool>;

    /// Fetch the record under `id` if it is live at `now_ms`, deleting it in
    /// the same transaction. Dead records found along the way are deleted too.
    fn take_live(&self, id: &str, now_ms: i64) -> Result<Taken>;

    /// Remove every unread record whose `expires_at <= now_ms`.
    /// Returns the ids that were removed.
    fn remove_expired(&self, now_ms: i64) -> Result<Vec<String>>;

    /// Number of stored records, live or not yet swept.
    fn count(&self) -> Result<usize>;
}
