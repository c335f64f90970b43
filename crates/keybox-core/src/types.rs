use serde::{Deserialize, Serialize};

/// Reserved id of the master-verification sentinel. Never assigned to a user entry.
pub const MASTER_ID: &str = "0";

/// Number of id characters shown in listings and accepted as an explicit new id
pub const SHORT_ID_LENGTH: usize = 7;

/// Minimum length of the master passphrase and of stored passwords
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Non-secret view of an entry, carried by errors that need to show candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: String,
    pub category: String,
    pub account: String,
    /// Unix timestamp (seconds)
    pub last_updated_at: i64,
}

impl EntrySummary {
    /// First [`SHORT_ID_LENGTH`] characters of the id
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Truncate an id to its display form.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LENGTH) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
