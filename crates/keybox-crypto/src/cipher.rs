//! AES-256-CFB field encryption
//!
//! CFB is a stream mode: ciphertext has exactly the plaintext's length and no
//! padding is applied. Each field keeps its IV next to its ciphertext.

use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use keybox_core::{KeyboxError, KeyboxResult};
use rand::RngCore;

use crate::kdf::DerivedKey;
use crate::BLOCK_SIZE;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Generate a random IV of one AES block.
pub fn generate_iv() -> Vec<u8> {
    let mut iv = vec![0u8; BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Replace `iv` with a fresh random one unless it is already block-sized.
///
/// Returns `true` when a new IV was generated.
pub fn ensure_iv(iv: &mut Vec<u8>) -> bool {
    if iv.len() == BLOCK_SIZE {
        return false;
    }
    *iv = generate_iv();
    true
}

fn check_iv(iv: &[u8]) -> KeyboxResult<()> {
    if iv.len() != BLOCK_SIZE {
        return Err(KeyboxError::LengthOfIv {
            expected: BLOCK_SIZE,
            got: iv.len(),
        });
    }
    Ok(())
}

/// Encrypt one field with AES-256-CFB.
pub fn encrypt_field(key: &DerivedKey, iv: &[u8], plaintext: &[u8]) -> KeyboxResult<Vec<u8>> {
    check_iv(iv)?;
    let cipher = Aes256CfbEnc::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| KeyboxError::Crypto(format!("AES-CFB init failed: {e}")))?;

    let mut buf = plaintext.to_vec();
    cipher.encrypt(&mut buf);
    Ok(buf)
}

/// Decrypt one field with AES-256-CFB.
///
/// Fails with `LengthOfIv` when `iv` is not one block long.
pub fn decrypt_field(key: &DerivedKey, iv: &[u8], ciphertext: &[u8]) -> KeyboxResult<Vec<u8>> {
    check_iv(iv)?;
    let cipher = Aes256CfbDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| KeyboxError::Crypto(format!("AES-CFB init failed: {e}")))?;

    let mut buf = ciphertext.to_vec();
    cipher.decrypt(&mut buf);
    Ok(buf)
}
