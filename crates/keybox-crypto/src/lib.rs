//! keybox-crypto: per-field encryption for the password box
//!
//! Key derivation:
//! ```text
//! salt empty      → key = hex(MD5(passphrase)) as 32 ASCII bytes   (legacy, stores < v3)
//! salt non-empty  → key = scrypt(passphrase, salt, N=4096, r=8, p=1, len=32)
//! ```
//!
//! Each sensitive field is encrypted independently with AES-256 in CFB mode
//! under its own random 16-byte IV. There is no authentication tag; wrong keys
//! are detected by the store's master sentinel, not by the cipher.

pub mod cipher;
pub mod digest;
pub mod kdf;

pub use cipher::{decrypt_field, encrypt_field, ensure_iv, generate_iv};
pub use digest::{md5_hex, sha1_hex};
pub use kdf::{derive_key, generate_salt, DerivedKey};

/// Size of a derived AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// AES block size, and therefore the IV size for CFB
pub const BLOCK_SIZE: usize = 16;

/// Size of a freshly generated scrypt salt
pub const SALT_SIZE: usize = 32;
