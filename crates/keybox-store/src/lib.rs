//! keybox-store: the password box engine
//!
//! A box is a single document in a [`Repository`]:
//! ```text
//! {
//!   "version": 3,
//!   "salt": "<base64>",             scrypt salt (empty before v3)
//!   "master": { "id": "0", ... },   sentinel holding the encrypted verifier
//!   "passwords": [ { ... }, ... ]   entries sorted by id
//! }
//! ```
//! Version 0 documents are a bare list of entries. Account and password are
//! only ever persisted as AES-256-CFB ciphertext with per-field IVs.

pub mod entry;
pub mod envelope;
pub mod pwbox;
pub mod repository;
pub mod resolve;

mod codec;

pub use entry::{check_password, Entry, EntryDetail, EntryPatch};
pub use envelope::{Envelope, StoreDocument, CURRENT_VERSION};
pub use pwbox::PasswordBox;
pub use repository::{FileRepository, MemRepository, Repository};
