use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::model::{Admission, NewSecret, SecretRecord};
use super::records::{RecordStore, Taken};
use crate::error::{Result, VaultError};

/// Attempts at finding an unused id before giving up.
const ID_ATTEMPTS: usize = 3;

/// Admission limits applied before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub max_payload_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_ttl_secs: 30,
            max_ttl_secs: 7 * 86400,
            max_payload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Lifecycle manager for secret records: admit, consume once, expire.
///
/// Holds no state of its own beyond the injected store and clock, so any
/// number of clones (or processes sharing one store) can serve requests.
#[derive(Clone)]
pub struct Vault {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    limits: Limits,
}

impl Vault {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            clock: Arc::new(SystemClock),
            limits: Limits::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Store a new secret and return the id it can be fetched under.
    pub fn admit(&self, secret: NewSecret) -> Result<Admission> {
        if secret.ciphertext.is_empty() {
            return Err(VaultError::validation("ciphertext must not be empty"));
        }
        if secret.ciphertext.len() > self.limits.max_payload_bytes {
            return Err(VaultError::validation(format!(
                "ciphertext exceeds {} byte limit",
                self.limits.max_payload_bytes
            )));
        }
        if secret.iv.trim().is_empty() {
            return Err(VaultError::validation("iv must not be empty"));
        }
        let ttl_seconds = secret.ttl_seconds.unwrap_or(self.limits.default_ttl_secs);
        if ttl_seconds == 0 {
            return Err(VaultError::validation("ttl must be a positive number of seconds"));
        }
        if ttl_seconds > self.limits.max_ttl_secs {
            return Err(VaultError::validation(format!(
                "ttl exceeds maximum of {} seconds",
                self.limits.max_ttl_secs
            )));
        }

        let created_at = self.clock.now_ms();
        let expires_at = expiry_ms(created_at, ttl_seconds)
            .ok_or_else(|| VaultError::validation("ttl is out of range"))?;

        let mut record = SecretRecord {
            id: String::new(),
            ciphertext: secret.ciphertext,
            iv: secret.iv,
            filename: secret.filename,
            content_type: secret.content_type,
            size: secret.size,
            created_at,
            expires_at,
            ttl_seconds,
            viewed: false,
        };

        for _ in 0..ID_ATTEMPTS {
            record.id = generate_id();
            if self.records.insert_if_absent(&record)? {
                debug!(id = %record.id, expires_at, "admitted secret");
                return Ok(Admission {
                    id: record.id.clone(),
                    expires_at,
                });
            }
            warn!("secret id collision, regenerating");
        }
        Err(VaultError::Storage(anyhow::anyhow!(
            "no unused id after {ID_ATTEMPTS} attempts"
        )))
    }

    /// Hand out the secret under `id` and destroy it in the same step.
    ///
    /// Unknown, already-consumed and expired ids all yield
    /// [`VaultError::NotFound`].
    pub fn consume(&self, id: &str) -> Result<SecretRecord> {
        match self.records.take_live(id, self.clock.now_ms())? {
            Taken::Live(record) => {
                debug!(id = %id, "consumed secret");
                Ok(record)
            }
            Taken::Expired | Taken::Missing => Err(VaultError::NotFound),
        }
    }

    /// Remove expired, unread records. Returns the ids removed.
    pub fn sweep(&self) -> Result<Vec<String>> {
        Ok(self.records.remove_expired(self.clock.now_ms())?)
    }

    /// Number of records currently held by the store.
    pub fn count(&self) -> Result<usize> {
        Ok(self.records.count()?)
    }

    /// Spawn a background Tokio task that calls `sweep()` every `interval`.
    pub fn spawn_sweep(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep() {
                    warn!(error = %e, "background sweep error");
                }
            }
        })
    }
}

/// `created_at + ttl`, in unix milliseconds. `None` if it does not fit.
fn expiry_ms(created_at: i64, ttl_seconds: u64) -> Option<i64> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .and_then(|ms| created_at.checked_add(ms))
}

/// 128 random bits, hex encoded.
fn generate_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}
