//! Password entry: plaintext metadata, encrypted account/password, identity

use chrono::{DateTime, Local, SecondsFormat, Utc};
use keybox_core::types::short_id;
use keybox_core::{EntrySummary, KeyboxError, KeyboxResult, MASTER_ID, MIN_PASSWORD_LENGTH};
use keybox_crypto::{decrypt_field, encrypt_field, ensure_iv, DerivedKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::codec::{base64_bytes, null_as_default};

/// A stored credential.
///
/// `plain_account` and `plain_password` exist only in memory; the persisted
/// form carries their ciphertext and IVs. Field names written by older tools
/// (`ID`, `Category`, `AccountIV`, ...) are accepted on read.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(alias = "ID", alias = "Id", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(alias = "Category", default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(skip)]
    pub plain_account: Zeroizing<String>,
    #[serde(skip)]
    pub plain_password: Zeroizing<String>,
    #[serde(alias = "Site", default, deserialize_with = "null_as_default")]
    pub site: String,
    #[serde(alias = "Tags", default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// Opaque extension data
    #[serde(alias = "Ext", default, deserialize_with = "null_as_default")]
    pub ext: String,
    #[serde(rename = "accountIV", alias = "AccountIV", default, with = "base64_bytes")]
    pub account_iv: Vec<u8>,
    #[serde(rename = "passwordIV", alias = "PasswordIV", default, with = "base64_bytes")]
    pub password_iv: Vec<u8>,
    #[serde(alias = "CipherAccount", default, with = "base64_bytes")]
    pub cipher_account: Vec<u8>,
    #[serde(alias = "CipherPassword", default, with = "base64_bytes")]
    pub cipher_password: Vec<u8>,
    #[serde(alias = "CreatedAt", default)]
    pub created_at: i64,
    #[serde(alias = "LastUpdatedAt", default)]
    pub last_updated_at: i64,
    #[serde(alias = "Hidden", default)]
    pub hidden: bool,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("plain_account", &"[REDACTED]")
            .field("plain_password", &"[REDACTED]")
            .field("site", &self.site)
            .field("tags", &self.tags)
            .field("created_at", &self.created_at)
            .field("last_updated_at", &self.last_updated_at)
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// Changes requested by `add`.
///
/// `None` leaves the stored value alone; `Some` replaces it, including
/// `Some(String::new())` to clear a field.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    /// Reference to an existing entry (exact id or unique prefix)
    pub id: Option<String>,
    pub category: Option<String>,
    pub account: Option<String>,
    pub password: Option<String>,
    pub site: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ext: Option<String>,
    pub hidden: Option<bool>,
}

/// Fully decrypted view returned by `inspect`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDetail {
    pub id: String,
    pub category: String,
    pub account: String,
    pub password: String,
    pub site: String,
    pub tags: Vec<String>,
    pub ext: String,
    pub hidden: bool,
    pub created_at: String,
    pub last_updated_at: String,
}

/// Reject passwords shorter than [`MIN_PASSWORD_LENGTH`] bytes.
pub fn check_password(password: &str) -> KeyboxResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(KeyboxError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

/// Render a Unix timestamp as RFC 3339 in local time.
pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|t| t.with_timezone(&Local).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

pub(crate) fn now() -> i64 {
    Utc::now().timestamp()
}

impl Entry {
    pub fn new(category: &str, account: &str, password: &str, site: &str) -> Self {
        let now = now();
        Self {
            category: category.to_string(),
            plain_account: Zeroizing::new(account.to_string()),
            plain_password: Zeroizing::new(password.to_string()),
            site: site.to_string(),
            created_at: now,
            last_updated_at: now,
            ..Default::default()
        }
    }

    /// The master-verification sentinel carrying `verifier` as its password.
    pub fn sentinel(verifier: &str) -> Self {
        let mut entry = Self::new("", "", verifier, "");
        entry.id = MASTER_ID.to_string();
        entry
    }

    /// Build a new entry with `id` from the fields set in `patch`.
    pub fn from_patch(id: String, patch: EntryPatch) -> Self {
        let mut entry = Self::new("", "", "", "");
        entry.id = id;
        entry.apply(EntryPatch { id: None, ..patch });
        entry
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Overwrite the fields set in `patch`. Tags are replaced wholesale.
    pub fn apply(&mut self, patch: EntryPatch) {
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(account) = patch.account {
            self.plain_account = Zeroizing::new(account);
        }
        if let Some(password) = patch.password {
            self.plain_password = Zeroizing::new(password);
        }
        if let Some(site) = patch.site {
            self.site = site;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(ext) = patch.ext {
            self.ext = ext;
        }
        if let Some(hidden) = patch.hidden {
            self.hidden = hidden;
        }
    }

    /// Substring match against id, category, decrypted account and password, site, or any tag.
    pub fn matches(&self, word: &str) -> bool {
        self.id.contains(word)
            || self.category.contains(word)
            || self.plain_account.contains(word)
            || self.plain_password.contains(word)
            || self.site.contains(word)
            || self.tags.iter().any(|tag| tag.contains(word))
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.id.clone(),
            category: self.category.clone(),
            account: self.plain_account.as_str().to_owned(),
            last_updated_at: self.last_updated_at,
        }
    }

    pub fn detail(&self) -> EntryDetail {
        EntryDetail {
            id: self.id.clone(),
            category: self.category.clone(),
            account: self.plain_account.as_str().to_owned(),
            password: self.plain_password.as_str().to_owned(),
            site: self.site.clone(),
            tags: self.tags.clone(),
            ext: self.ext.clone(),
            hidden: self.hidden,
            created_at: format_timestamp(self.created_at),
            last_updated_at: format_timestamp(self.last_updated_at),
        }
    }

    /// Drop both IVs so the next `encrypt` generates fresh ones.
    pub fn reset_ivs(&mut self) {
        self.account_iv.clear();
        self.password_iv.clear();
    }

    /// Encrypt account and password into their ciphertext fields.
    ///
    /// Block-sized IVs are reused; missing or malformed ones are regenerated.
    /// The entry is unchanged if encryption fails.
    pub fn encrypt(&mut self, key: &DerivedKey) -> KeyboxResult<()> {
        let mut account_iv = self.account_iv.clone();
        let mut password_iv = self.password_iv.clone();
        let fresh_account = ensure_iv(&mut account_iv);
        let fresh_password = ensure_iv(&mut password_iv);
        if fresh_account || fresh_password {
            tracing::debug!(id = %self.short_id(), "generated fresh IVs");
        }

        let cipher_account = encrypt_field(key, &account_iv, self.plain_account.as_bytes())?;
        let cipher_password = encrypt_field(key, &password_iv, self.plain_password.as_bytes())?;

        self.account_iv = account_iv;
        self.password_iv = password_iv;
        self.cipher_account = cipher_account;
        self.cipher_password = cipher_password;
        Ok(())
    }

    /// Decrypt the ciphertext fields into the plaintext fields.
    ///
    /// Fails with `LengthOfIv` when either IV is not block-sized, and with
    /// `Crypto` when a field does not decrypt to UTF-8 (usually a wrong key).
    /// The plaintext fields keep their previous values on failure.
    ///
    /// Decrypted text is never repaired: re-encrypting it under the same key
    /// and IVs reproduces the stored ciphertext exactly.
    pub fn decrypt(&mut self, key: &DerivedKey) -> KeyboxResult<()> {
        let account = decrypt_field(key, &self.account_iv, &self.cipher_account)?;
        let password = decrypt_field(key, &self.password_iv, &self.cipher_password)?;

        let account = self.utf8_field("account", account)?;
        let password = self.utf8_field("password", password)?;
        self.plain_account = account;
        self.plain_password = password;
        Ok(())
    }

    fn utf8_field(&self, field: &str, bytes: Vec<u8>) -> KeyboxResult<Zeroizing<String>> {
        let bytes = Zeroizing::new(bytes);
        match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(Zeroizing::new(text.to_owned())),
            Err(_) => Err(KeyboxError::Crypto(format!(
                "password {}: decrypted {field} is not valid UTF-8",
                self.short_id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keybox_crypto::{derive_key, BLOCK_SIZE};
    use secrecy::SecretString;

    fn legacy_key() -> DerivedKey {
        derive_key(&SecretString::from("123456"), &[]).unwrap()
    }

    #[test]
    fn test_new_entry() {
        let pw = Entry::new("category", "account", "password", "site");
        assert_eq!(pw.category, "category");
        assert_eq!(pw.plain_account.as_str(), "account");
        assert_eq!(pw.plain_password.as_str(), "password");
        assert_eq!(pw.site, "site");
        assert!(pw.id.is_empty());
        assert!(pw.account_iv.is_empty() && pw.password_iv.is_empty());
        assert_eq!(pw.created_at, pw.last_updated_at);
    }

    #[test]
    fn test_short_id() {
        let mut pw = Entry::new("category", "account", "password", "site");
        for (id, short) in [("123", "123"), ("1234567", "1234567"), ("12345678", "1234567")] {
            pw.id = id.to_string();
            assert_eq!(pw.short_id(), short);
        }
    }

    #[test]
    fn test_check_password() {
        for pw in ["", "1", "12", "123", "1234", "12345"] {
            assert!(matches!(
                check_password(pw),
                Err(KeyboxError::PasswordTooShort { min: 6 })
            ));
        }
        assert!(check_password("123456").is_ok());
        // length is measured in bytes: three 2-byte characters pass
        assert!(check_password("ééé").is_ok());
        assert!(check_password("éé").is_err());
    }

    #[test]
    fn test_encrypt_decrypt_known_vector() {
        let mut pw = Entry::new("category", "account", "password", "site");
        pw.id = "1234567".into();
        pw.account_iv = (0..BLOCK_SIZE as u8).collect();
        pw.password_iv = (0..BLOCK_SIZE as u8).map(|i| 2 * i).collect();

        pw.encrypt(&legacy_key()).unwrap();
        assert_eq!(pw.cipher_account, vec![228, 58, 249, 147, 129, 167, 175]);
        assert_eq!(
            pw.cipher_password,
            vec![158, 190, 63, 132, 121, 169, 38, 195]
        );

        pw.plain_account = Zeroizing::new(String::new());
        pw.plain_password = Zeroizing::new(String::new());
        pw.decrypt(&legacy_key()).unwrap();
        assert_eq!(pw.plain_account.as_str(), "account");
        assert_eq!(pw.plain_password.as_str(), "password");
    }

    #[test]
    fn test_encrypt_generates_and_reuses_ivs() {
        let mut pw = Entry::new("c", "a", "p", "s");
        pw.encrypt(&legacy_key()).unwrap();
        assert_eq!(pw.account_iv.len(), BLOCK_SIZE);
        assert_eq!(pw.password_iv.len(), BLOCK_SIZE);
        assert_ne!(pw.account_iv, pw.password_iv);

        let (a_iv, p_iv, ct) = (
            pw.account_iv.clone(),
            pw.password_iv.clone(),
            pw.cipher_password.clone(),
        );
        pw.encrypt(&legacy_key()).unwrap();
        assert_eq!(pw.account_iv, a_iv);
        assert_eq!(pw.password_iv, p_iv);
        assert_eq!(pw.cipher_password, ct, "same key and IV gives same ciphertext");

        pw.reset_ivs();
        pw.encrypt(&legacy_key()).unwrap();
        assert_ne!(pw.password_iv, p_iv);
    }

    #[test]
    fn test_decrypt_bad_iv_leaves_plaintext() {
        let mut pw = Entry::new("c", "account", "password", "s");
        pw.encrypt(&legacy_key()).unwrap();
        pw.password_iv.truncate(4);

        let err = pw.decrypt(&legacy_key()).unwrap_err();
        assert!(matches!(err, KeyboxError::LengthOfIv { got: 4, .. }));
        assert_eq!(pw.plain_account.as_str(), "account");
        assert_eq!(pw.plain_password.as_str(), "password");
    }

    #[test]
    fn test_decrypt_wrong_key_rejects_invalid_utf8() {
        let mut pw = Entry::new("c", "account", "password", "s");
        pw.id = "1234567".into();
        pw.account_iv = (0..BLOCK_SIZE as u8).collect();
        pw.password_iv = (0..BLOCK_SIZE as u8).map(|i| 2 * i).collect();
        pw.cipher_account = vec![0xff; 8];
        pw.cipher_password = vec![0xff; 8];

        // find a key under which the account decrypts to invalid UTF-8
        let key = (0u8..=255)
            .map(|b| DerivedKey::from_bytes([b; keybox_crypto::KEY_SIZE]))
            .find(|k| {
                let bytes = keybox_crypto::decrypt_field(k, &pw.account_iv, &pw.cipher_account);
                std::str::from_utf8(&bytes.unwrap()).is_err()
            })
            .unwrap();

        let err = pw.decrypt(&key).unwrap_err();
        assert!(matches!(err, KeyboxError::Crypto(ref m) if m.contains("1234567")));
        assert_eq!(pw.plain_account.as_str(), "account");
        assert_eq!(pw.plain_password.as_str(), "password");
    }

    #[test]
    fn test_wrong_key_roundtrip_is_byte_exact() {
        let mut pw = Entry::new("c", "a", "p", "s");
        pw.id = "1234567".into();
        pw.encrypt(&legacy_key()).unwrap();
        let (account, password) = (pw.cipher_account.clone(), pw.cipher_password.clone());

        // both single-byte fields stay ASCII under about a quarter of all keys
        let wrong = (0u8..=255)
            .map(|b| DerivedKey::from_bytes([b; keybox_crypto::KEY_SIZE]))
            .find(|k| pw.clone().decrypt(k).is_ok())
            .unwrap();

        pw.decrypt(&wrong).unwrap();
        pw.encrypt(&wrong).unwrap();
        assert_eq!(pw.cipher_account, account);
        assert_eq!(pw.cipher_password, password);
    }

    #[test]
    fn test_apply_patch() {
        let mut pw = Entry::new("category", "account", "password", "site");
        pw.tags = vec!["a".into(), "b".into()];

        pw.apply(EntryPatch {
            password: Some("new-password".into()),
            site: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(pw.category, "category");
        assert_eq!(pw.plain_account.as_str(), "account");
        assert_eq!(pw.plain_password.as_str(), "new-password");
        assert_eq!(pw.site, "", "Some(empty) clears the field");
        assert_eq!(pw.tags, vec!["a", "b"]);

        pw.apply(EntryPatch {
            tags: Some(vec!["c".into()]),
            hidden: Some(true),
            ..Default::default()
        });
        assert_eq!(pw.tags, vec!["c"]);
        assert!(pw.hidden);
    }

    #[test]
    fn test_matches() {
        let mut pw = Entry::new("email", "me@example.com", "hunter22", "mail.example.com");
        pw.id = "abcdef0123".into();
        pw.tags = vec!["work".into()];

        for word in ["abcd", "mail", "me@", "hunter", "example.com", "wor"] {
            assert!(pw.matches(word), "{word} should match");
        }
        assert!(!pw.matches("nothing"));
    }

    #[test]
    fn test_serialized_form_hides_plaintext() {
        let mut pw = Entry::new("email", "me@example.com", "hunter22", "site");
        pw.id = "1234567".into();
        pw.encrypt(&legacy_key()).unwrap();

        let json = serde_json::to_string(&pw).unwrap();
        assert!(!json.contains("me@example.com"));
        assert!(!json.contains("hunter22"));
        for field in ["\"accountIV\"", "\"passwordIV\"", "\"cipherAccount\"", "\"lastUpdatedAt\""] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn test_deserialize_legacy_field_names() {
        let json = r#"{
            "Category": "email",
            "Site": "",
            "Tags": null,
            "Ext": "",
            "ID": "1234567",
            "AccountIV": "AAECAwQFBgcICQoLDA0ODw==",
            "PasswordIV": null,
            "CipherAccount": "5Dr5k4Gnrw==",
            "CipherPassword": "",
            "CreatedAt": 1466000000,
            "LastUpdatedAt": 1466000001
        }"#;
        let pw: Entry = serde_json::from_str(json).unwrap();
        assert_eq!(pw.id, "1234567");
        assert_eq!(pw.category, "email");
        assert!(pw.tags.is_empty());
        assert_eq!(pw.account_iv, (0..16u8).collect::<Vec<_>>());
        assert!(pw.password_iv.is_empty());
        assert_eq!(pw.cipher_account, vec![228, 58, 249, 147, 129, 167, 175]);
        assert_eq!(pw.last_updated_at, 1466000001);
        assert!(!pw.hidden);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let pw = Entry::new("c", "secret-account", "secret-password", "s");
        let rendered = format!("{pw:?}");
        assert!(!rendered.contains("secret-account"));
        assert!(!rendered.contains("secret-password"));
    }

    #[test]
    fn test_sentinel() {
        let s = Entry::sentinel("verifier");
        assert_eq!(s.id, MASTER_ID);
        assert_eq!(s.plain_password.as_str(), "verifier");
    }
}
