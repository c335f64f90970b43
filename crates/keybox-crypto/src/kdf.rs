//! Key derivation: passphrase + salt → AES-256 key

use keybox_core::{KeyboxError, KeyboxResult};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::digest::md5_hex;
use crate::{KEY_SIZE, SALT_SIZE};

/// scrypt cost: N = 2^12 = 4096
pub const SCRYPT_LOG_N: u8 = 12;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;

/// A 256-bit key derived from the master passphrase.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the field encryption key.
///
/// An empty salt selects the legacy derivation, kept only so stores written
/// before the salted format can still be opened and upgraded. New stores
/// always carry a salt.
pub fn derive_key(passphrase: &SecretString, salt: &[u8]) -> KeyboxResult<DerivedKey> {
    if salt.is_empty() {
        tracing::debug!("deriving unsalted legacy key");
        return Ok(derive_legacy_key(passphrase));
    }

    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE)
        .map_err(|e| KeyboxError::Crypto(format!("invalid scrypt params: {e}")))?;

    let mut key = [0u8; KEY_SIZE];
    scrypt::scrypt(
        passphrase.expose_secret().as_bytes(),
        salt,
        &params,
        &mut key,
    )
    .map_err(|e| KeyboxError::Crypto(format!("scrypt KDF failed: {e}")))?;

    Ok(DerivedKey::from_bytes(key))
}

/// The hex MD5 digest is exactly 32 ASCII bytes and is used verbatim as the key.
fn derive_legacy_key(passphrase: &SecretString) -> DerivedKey {
    let mut digest = md5_hex(passphrase.expose_secret());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(digest.as_bytes());
    digest.zeroize();
    DerivedKey::from_bytes(key)
}

/// Generate a random salt for the scrypt derivation.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
