use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Stored in redb as bincode-encoded bytes.
/// `ciphertext` and `iv` come from the client and are never interpreted here.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SecretRecord {
    /// 128-bit random identifier, hex encoded.
    pub id: String,
    /// Client-encrypted payload.
    pub ciphertext: Vec<u8>,
    /// Client-supplied initialization vector.
    pub iv: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Size hint supplied by the sender, not checked against `ciphertext`.
    pub size: Option<u64>,
    /// Unix timestamp (milliseconds, UTC) when the record was admitted.
    pub created_at: i64,
    /// Unix timestamp (milliseconds, UTC) from which the record is unreachable.
    pub expires_at: i64,
    pub ttl_seconds: u64,
    /// Set by the consuming transaction right before the record is removed.
    pub viewed: bool,
}

impl SecretRecord {
    /// Returns true once `now_ms` has reached `expires_at`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// A record can be handed out only while unread and unexpired.
    pub fn is_live(&self, now_ms: i64) -> bool {
        !self.viewed && !self.is_expired(now_ms)
    }
}

/// Input to [`Vault::admit`](super::Vault::admit).
#[derive(Debug, Default)]
pub struct NewSecret {
    pub ciphertext: Vec<u8>,
    pub iv: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    /// Falls back to the vault's default ttl when `None`.
    pub ttl_seconds: Option<u64>,
}

/// What the sender needs to build a shareable link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub id: String,
    /// Unix milliseconds.
    pub expires_at: i64,
}
