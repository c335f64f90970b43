//! Hex digests used for legacy keys, master verifiers, and entry ids

use md5::Md5;
use sha1::{Digest, Sha1};

/// Lowercase hex MD5 digest of `data`.
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Md5::digest(data.as_ref()))
}

/// Lowercase hex SHA-1 digest of `data`.
pub fn sha1_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha1::digest(data.as_ref()))
}
