//! The password box: decrypted working set over a [`Repository`]
//!
//! Every mutation works on a staged copy of the store, persists it, and only
//! then replaces the in-memory state. A failure before or during the save
//! leaves memory exactly as it was.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use keybox_core::{KeyboxError, KeyboxResult, MASTER_ID, SHORT_ID_LENGTH};
use keybox_crypto::{derive_key, generate_salt, DerivedKey};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::entry::{check_password, now, Entry, EntryDetail, EntryPatch};
use crate::envelope::{is_salted, verifier, Envelope, StoreDocument, CURRENT_VERSION};
use crate::repository::Repository;
use crate::resolve::{allocate_id, resolve, resolve_batch};

/// Passphrase and the key derived from it under the current salt.
struct Session {
    passphrase: SecretString,
    key: DerivedKey,
}

#[derive(Clone, Default)]
struct StoreState {
    version: u32,
    salt: Vec<u8>,
    master: Option<Entry>,
    passwords: BTreeMap<String, Entry>,
}

#[derive(Default)]
struct BoxState {
    session: Option<Session>,
    store: StoreState,
}

impl BoxState {
    fn parts(&mut self) -> KeyboxResult<(&Session, &mut StoreState)> {
        match self.session.as_ref() {
            Some(session) => Ok((session, &mut self.store)),
            None => Err(KeyboxError::EmptyMasterPassword),
        }
    }
}

/// A password box bound to one repository.
///
/// Call [`PasswordBox::init`] before anything else; every other operation
/// fails with `EmptyMasterPassword` until it succeeds.
pub struct PasswordBox<R: Repository> {
    repo: R,
    state: RwLock<BoxState>,
}

impl<R: Repository> PasswordBox<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            state: RwLock::new(BoxState::default()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    // State is only ever replaced wholesale after a successful save, so a
    // poisoned lock still guards a consistent value.
    fn read(&self) -> RwLockReadGuard<'_, BoxState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BoxState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the store, verify `master_password`, decrypt every entry, then
    /// re-encrypt and save.
    pub fn init(&self, master_password: SecretString) -> KeyboxResult<()> {
        check_password(master_password.expose_secret())?;

        let mut state = self.write();
        let data = self.repo.load()?;
        debug!(bytes = data.len(), "loaded store");

        let envelope = StoreDocument::parse(&data)?.into_envelope();
        let key = derive_key(&master_password, &envelope.salt)?;

        let mut master = envelope.master;
        let verified = match (master.as_mut(), verifier(envelope.version, &master_password)) {
            (Some(sentinel), Some(expected)) => {
                match sentinel.decrypt(&key) {
                    Err(KeyboxError::Crypto(_)) => {
                        return Err(KeyboxError::IncorrectMasterPassword)
                    }
                    other => other?,
                }
                if sentinel.plain_password.as_str() != expected {
                    return Err(KeyboxError::IncorrectMasterPassword);
                }
                true
            }
            (None, Some(_)) if !data.is_empty() => {
                warn!(
                    version = envelope.version,
                    "master sentinel missing, it will be regenerated"
                );
                false
            }
            _ => false,
        };

        // Without a sentinel, undecodable text is the only sign of a wrong
        // passphrase. Nothing has been saved yet.
        let mut passwords = BTreeMap::new();
        for mut entry in envelope.passwords {
            match entry.decrypt(&key) {
                Err(KeyboxError::Crypto(_)) if !verified => {
                    return Err(KeyboxError::IncorrectMasterPassword)
                }
                other => other?,
            }
            passwords.insert(entry.id.clone(), entry);
        }

        let mut store = StoreState {
            version: envelope.version,
            salt: envelope.salt,
            master,
            passwords,
        };
        let session = Session {
            passphrase: master_password,
            key,
        };
        self.persist(&session, &mut store)?;

        info!(
            version = store.version,
            entries = store.passwords.len(),
            "store opened"
        );
        *state = BoxState {
            session: Some(session),
            store,
        };
        Ok(())
    }

    /// Create an entry or patch an existing one. Returns `(id, created)`.
    pub fn add(&self, patch: EntryPatch) -> KeyboxResult<(String, bool)> {
        let mut state = self.write();
        let (session, store) = state.parts()?;
        if let Some(password) = &patch.password {
            check_password(password)?;
        }

        let reference = patch.id.clone().filter(|id| !id.is_empty());
        let matched: Vec<&Entry> = match &reference {
            Some(reference) => resolve(&store.passwords, reference),
            None => Vec::new(),
        };
        if matched.len() > 1 {
            return Err(KeyboxError::ambiguous(
                matched.iter().map(|e| e.summary()).collect(),
            ));
        }

        let mut staged = store.clone();
        let (id, created) = match matched.first() {
            Some(existing) => {
                let id = existing.id.clone();
                if let Some(entry) = staged.passwords.get_mut(&id) {
                    entry.apply(patch);
                    entry.last_updated_at = now();
                }
                (id, false)
            }
            None => {
                let id = match reference {
                    Some(id) if id.len() >= SHORT_ID_LENGTH && id != MASTER_ID => id,
                    _ => allocate_id(|candidate| staged.passwords.contains_key(candidate))?,
                };
                staged
                    .passwords
                    .insert(id.clone(), Entry::from_patch(id.clone(), patch));
                (id, true)
            }
        };

        self.persist(session, &mut staged)?;
        *store = staged;
        info!(id = %keybox_core::types::short_id(&id), created, "password saved");
        Ok((id, created))
    }

    /// Remove every entry matched by `references`. Nothing is removed unless
    /// all of them resolve.
    pub fn remove(&self, references: &[String], all: bool) -> KeyboxResult<Vec<String>> {
        let mut state = self.write();
        let (session, store) = state.parts()?;
        let ids = resolve_batch(&store.passwords, references, all)?;

        let mut staged = store.clone();
        for id in &ids {
            staged.passwords.remove(id);
        }
        self.persist(session, &mut staged)?;
        *store = staged;
        info!(removed = ids.len(), "passwords removed");
        Ok(ids)
    }

    /// Remove entries whose category and decrypted account match exactly.
    pub fn remove_by_account(
        &self,
        category: &str,
        account: &str,
        all: bool,
    ) -> KeyboxResult<Vec<String>> {
        let mut state = self.write();
        let (session, store) = state.parts()?;

        let matched: Vec<&Entry> = store
            .passwords
            .values()
            .filter(|e| e.category == category && e.plain_account.as_str() == account)
            .collect();
        match matched.len() {
            0 => {
                return Err(KeyboxError::PasswordNotFoundWithAccount {
                    category: category.to_string(),
                    account: account.to_string(),
                })
            }
            1 => {}
            _ if all => {}
            _ => {
                return Err(KeyboxError::ambiguous(
                    matched.iter().map(|e| e.summary()).collect(),
                ))
            }
        }
        let ids: Vec<String> = matched.iter().map(|e| e.id.clone()).collect();

        let mut staged = store.clone();
        for id in &ids {
            staged.passwords.remove(id);
        }
        self.persist(session, &mut staged)?;
        *store = staged;
        info!(removed = ids.len(), "passwords removed by account");
        Ok(ids)
    }

    /// Remove every entry. Saves only when something was removed.
    pub fn clear(&self) -> KeyboxResult<usize> {
        let mut state = self.write();
        let (session, store) = state.parts()?;
        let count = store.passwords.len();
        if count == 0 {
            return Ok(0);
        }

        let mut staged = store.clone();
        staged.passwords.clear();
        self.persist(session, &mut staged)?;
        *store = staged;
        info!(removed = count, "store cleared");
        Ok(count)
    }

    /// Entries in id order, hidden ones only when `show_hidden`.
    pub fn list(&self, show_hidden: bool) -> KeyboxResult<Vec<Entry>> {
        let state = self.read();
        if state.session.is_none() {
            return Err(KeyboxError::EmptyMasterPassword);
        }
        Ok(state
            .store
            .passwords
            .values()
            .filter(|e| show_hidden || !e.hidden)
            .cloned()
            .collect())
    }

    /// Entries containing `word` in any searchable field, in id order.
    pub fn find(&self, word: &str, first_only: bool) -> KeyboxResult<Vec<Entry>> {
        let state = self.read();
        if state.session.is_none() {
            return Err(KeyboxError::EmptyMasterPassword);
        }
        let matches = state.store.passwords.values().filter(|e| e.matches(word));
        let found: Vec<Entry> = if first_only {
            matches.take(1).cloned().collect()
        } else {
            matches.cloned().collect()
        };
        debug!(found = found.len(), "find");
        Ok(found)
    }

    /// Like [`find`](Self::find), projected to the decrypted passwords.
    pub fn find_passwords(&self, word: &str, first_only: bool) -> KeyboxResult<Vec<String>> {
        Ok(self
            .find(word, first_only)?
            .into_iter()
            .map(|e| e.plain_password.as_str().to_owned())
            .collect())
    }

    /// Full decrypted detail for every entry matched by `references`.
    pub fn inspect(&self, references: &[String], all: bool) -> KeyboxResult<Vec<EntryDetail>> {
        let state = self.read();
        if state.session.is_none() {
            return Err(KeyboxError::EmptyMasterPassword);
        }
        let ids = resolve_batch(&state.store.passwords, references, all)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.store.passwords.get(id))
            .map(Entry::detail)
            .collect())
    }

    /// Re-key the store under `new_master_password`.
    ///
    /// Salted stores also get a fresh salt. All IVs are regenerated.
    pub fn update(&self, new_master_password: SecretString) -> KeyboxResult<()> {
        check_password(new_master_password.expose_secret())?;

        let mut state = self.write();
        let (_, store) = state.parts()?;

        let mut staged = store.clone();
        if is_salted(staged.version) {
            staged.salt = generate_salt();
        }
        staged.master = None;
        staged.passwords.values_mut().for_each(Entry::reset_ivs);

        let session = Session {
            key: derive_key(&new_master_password, &staged.salt)?,
            passphrase: new_master_password,
        };
        self.persist(&session, &mut staged)?;

        info!(version = staged.version, "master password updated");
        *state = BoxState {
            session: Some(session),
            store: staged,
        };
        Ok(())
    }

    /// Migrate to the current version. Returns `(from, to)`; a store that is
    /// already current is left untouched.
    pub fn upgrade(&self) -> KeyboxResult<(u32, u32)> {
        let mut state = self.write();
        let (session, store) = state.parts()?;
        let from = store.version;
        if from >= CURRENT_VERSION {
            debug!(version = from, "store already current");
            return Ok((from, from));
        }

        let mut staged = store.clone();
        staged.version = CURRENT_VERSION;
        if !is_salted(from) {
            staged.salt = generate_salt();
        }
        staged.master = None;
        staged.passwords.values_mut().for_each(Entry::reset_ivs);

        let passphrase = SecretString::from(session.passphrase.expose_secret().to_owned());
        let session = Session {
            key: derive_key(&passphrase, &staged.salt)?,
            passphrase,
        };
        self.persist(&session, &mut staged)?;

        info!(from, to = CURRENT_VERSION, "store upgraded");
        *state = BoxState {
            session: Some(session),
            store: staged,
        };
        Ok((from, CURRENT_VERSION))
    }

    pub fn version(&self) -> u32 {
        self.read().store.version
    }

    pub fn len(&self) -> usize {
        self.read().store.passwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encrypt `store` under the session key and save it.
    ///
    /// Regenerates the sentinel when the version needs one and it is missing
    /// or holds a stale verifier.
    fn persist(&self, session: &Session, store: &mut StoreState) -> KeyboxResult<()> {
        match verifier(store.version, &session.passphrase) {
            Some(expected) => {
                let stale = store
                    .master
                    .as_ref()
                    .map_or(true, |m| m.plain_password.as_str() != expected);
                if stale {
                    debug!(version = store.version, "generating master sentinel");
                    store.master = Some(Entry::sentinel(&expected));
                }
            }
            None => store.master = None,
        }

        if let Some(master) = store.master.as_mut() {
            master.encrypt(&session.key)?;
        }
        for entry in store.passwords.values_mut() {
            entry.encrypt(&session.key)?;
        }

        let envelope = Envelope {
            version: store.version,
            salt: store.salt.clone(),
            master: store.master.clone(),
            passwords: store.passwords.values().cloned().collect(),
        };
        let data = StoreDocument::from_envelope(envelope).encode()?;
        debug!(
            bytes = data.len(),
            version = store.version,
            entries = store.passwords.len(),
            "saving store"
        );
        self.repo.save(&data)
    }
}
