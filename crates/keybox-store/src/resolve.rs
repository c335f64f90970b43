//! Entry id allocation and reference resolution
//!
//! A reference is either a full id or a prefix of one or more ids. Batch
//! resolution validates every reference before anything is returned, so
//! callers can mutate knowing the whole batch is sound.

use std::collections::{BTreeMap, BTreeSet};

use keybox_core::{KeyboxError, KeyboxResult};
use keybox_crypto::md5_hex;
use rand::Rng;

use crate::entry::Entry;

/// Regeneration attempts before `AllocateId` is returned.
pub const MAX_ALLOC_ATTEMPTS: usize = 10;

/// Allocate a fresh id: hex MD5 of a random non-negative 63-bit integer.
pub fn allocate_id(exists: impl Fn(&str) -> bool) -> KeyboxResult<String> {
    let mut rng = rand::thread_rng();
    for attempt in 1..=MAX_ALLOC_ATTEMPTS {
        let seed: i64 = rng.gen_range(0..=i64::MAX);
        let id = md5_hex(seed.to_string());
        if !exists(&id) {
            return Ok(id);
        }
        tracing::debug!(attempt, "id collision, regenerating");
    }
    Err(KeyboxError::AllocateId {
        attempts: MAX_ALLOC_ATTEMPTS,
    })
}

/// Entries matched by `reference`: the exact id if present, else every id
/// it prefixes. Results come back in id order.
pub fn resolve<'a>(passwords: &'a BTreeMap<String, Entry>, reference: &str) -> Vec<&'a Entry> {
    if let Some(entry) = passwords.get(reference) {
        return vec![entry];
    }
    passwords
        .range::<str, _>((std::ops::Bound::Included(reference), std::ops::Bound::Unbounded))
        .take_while(|(id, _)| id.starts_with(reference))
        .map(|(_, entry)| entry)
        .collect()
}

/// Resolve a batch of references into a deduplicated, sorted id list.
///
/// A reference with no match fails with `PasswordNotFound`; one with several
/// matches fails with `Ambiguous` unless `all` is set.
pub fn resolve_batch(
    passwords: &BTreeMap<String, Entry>,
    references: &[String],
    all: bool,
) -> KeyboxResult<Vec<String>> {
    let mut ids = BTreeSet::new();
    for reference in references {
        let matched = resolve(passwords, reference);
        match matched.len() {
            0 => return Err(KeyboxError::PasswordNotFound(reference.clone())),
            1 => {}
            _ if all => {}
            _ => {
                return Err(KeyboxError::ambiguous(
                    matched.iter().map(|e| e.summary()).collect(),
                ))
            }
        }
        ids.extend(matched.into_iter().map(|e| e.id.clone()));
    }
    Ok(ids.into_iter().collect())
}
