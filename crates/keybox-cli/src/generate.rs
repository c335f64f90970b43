//! Random password generation for `keybox generate`

use anyhow::{bail, Result};
use rand::Rng;

pub const DIGITS: &str = "0123456789";
pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Character classes to draw from. With nothing selected, digits and
/// both letter cases are used.
#[derive(Debug, Clone, Default)]
pub struct Charset {
    pub digits: bool,
    pub lowercase: bool,
    pub uppercase: bool,
    pub special: bool,
    pub special_set: String,
}

impl Charset {
    pub fn alphabet(&self) -> Vec<char> {
        let none_selected = !(self.digits || self.lowercase || self.uppercase || self.special);
        let mut alphabet = String::new();
        if self.digits || none_selected {
            alphabet.push_str(DIGITS);
        }
        if self.lowercase || none_selected {
            alphabet.push_str(LOWERCASE);
        }
        if self.uppercase || none_selected {
            alphabet.push_str(UPPERCASE);
        }
        if self.special {
            alphabet.push_str(&self.special_set);
        }
        alphabet.chars().collect()
    }
}

/// Generate `count` passwords of `length` characters.
pub fn generate(charset: &Charset, length: usize, count: usize) -> Result<Vec<String>> {
    if length == 0 {
        bail!("LEN must be greater than 0");
    }
    let alphabet = charset.alphabet();
    if alphabet.is_empty() {
        bail!("charset is empty");
    }

    let mut rng = rand::thread_rng();
    Ok((0..count)
        .map(|_| {
            (0..length)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect()
        })
        .collect())
}
