//! Versioned store document and format detection
//!
//! | version | shape | verifier | key |
//! |---|---|---|---|
//! | 0 | bare entry list | none | legacy |
//! | 1 | envelope + sentinel | hex MD5 | legacy |
//! | 2 | envelope + sentinel | hex SHA-1 | legacy |
//! | 3 | envelope + sentinel + salt | hex SHA-1 | scrypt |

use keybox_core::{KeyboxError, KeyboxResult};
use keybox_crypto::{generate_salt, md5_hex, sha1_hex};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::codec::{base64_bytes, null_as_default};
use crate::entry::Entry;

pub const VERSION_LEGACY: u32 = 0;
/// First version whose key is derived with scrypt over a stored salt
pub const VERSION_SALTED: u32 = 3;
pub const CURRENT_VERSION: u32 = VERSION_SALTED;

/// The structured document written for every version above 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(alias = "Version", default)]
    pub version: u32,
    #[serde(alias = "Salt", default, with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(
        alias = "Master",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub master: Option<Entry>,
    #[serde(alias = "Passwords", default, deserialize_with = "null_as_default")]
    pub passwords: Vec<Entry>,
}

impl Envelope {
    /// An empty store at the current version with a fresh salt.
    pub fn new_current() -> Self {
        Self {
            version: CURRENT_VERSION,
            salt: generate_salt(),
            master: None,
            passwords: Vec::new(),
        }
    }
}

/// What a backing blob turned out to contain.
#[derive(Debug, Clone)]
pub enum StoreDocument {
    /// Version 0: a bare list, no sentinel and no salt
    Legacy(Vec<Entry>),
    Versioned(Envelope),
}

impl StoreDocument {
    /// Parse a backing blob.
    ///
    /// Empty or whitespace-only input is a brand-new store at the current
    /// version. A JSON object is an envelope; anything else must be the
    /// legacy bare list.
    pub fn parse(data: &[u8]) -> KeyboxResult<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!("empty store, creating version {CURRENT_VERSION}");
            return Ok(StoreDocument::Versioned(Envelope::new_current()));
        }

        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(|e| KeyboxError::Format(e.to_string()))?;

        if value.is_object() {
            let envelope = Envelope::deserialize(value)
                .map_err(|e| KeyboxError::Format(format!("envelope: {e}")))?;
            return Ok(StoreDocument::Versioned(envelope));
        }

        let list = Vec::<Entry>::deserialize(value)
            .map_err(|e| KeyboxError::Format(format!("legacy entry list: {e}")))?;
        Ok(StoreDocument::Legacy(list))
    }

    pub fn version(&self) -> u32 {
        match self {
            StoreDocument::Legacy(_) => VERSION_LEGACY,
            StoreDocument::Versioned(envelope) => envelope.version,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        match self {
            StoreDocument::Legacy(passwords) => Envelope {
                version: VERSION_LEGACY,
                passwords,
                ..Default::default()
            },
            StoreDocument::Versioned(envelope) => envelope,
        }
    }

    /// Version 0 keeps the bare list shape; everything else is an envelope.
    /// Entries are ordered by id.
    pub fn from_envelope(mut envelope: Envelope) -> Self {
        envelope.passwords.sort_by(|a, b| a.id.cmp(&b.id));
        if envelope.version == VERSION_LEGACY {
            StoreDocument::Legacy(envelope.passwords)
        } else {
            StoreDocument::Versioned(envelope)
        }
    }

    pub fn encode(&self) -> KeyboxResult<Vec<u8>> {
        let encoded = match self {
            StoreDocument::Legacy(list) => serde_json::to_vec_pretty(list),
            StoreDocument::Versioned(envelope) => serde_json::to_vec_pretty(envelope),
        };
        encoded.map_err(|e| KeyboxError::Format(e.to_string()))
    }
}

/// The value a version's sentinel must decrypt to, or `None` for version 0.
pub fn verifier(version: u32, passphrase: &SecretString) -> Option<String> {
    let passphrase = passphrase.expose_secret();
    match version {
        VERSION_LEGACY => None,
        1 => Some(md5_hex(passphrase)),
        _ => Some(sha1_hex(passphrase)),
    }
}

/// Whether `version` derives its key from a stored salt.
pub fn is_salted(version: u32) -> bool {
    version >= VERSION_SALTED
}
