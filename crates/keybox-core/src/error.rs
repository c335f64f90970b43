use thiserror::Error;

use crate::types::EntrySummary;

pub type KeyboxResult<T> = Result<T, KeyboxError>;

#[derive(Debug, Error)]
pub enum KeyboxError {
    #[error("master password is empty")]
    EmptyMasterPassword,

    #[error("password too short: at least {min} characters required")]
    PasswordTooShort { min: usize },

    #[error("IV length {got} not equal to block size {expected}")]
    LengthOfIv { expected: usize, got: usize },

    #[error("allocate id failed after {attempts} attempts")]
    AllocateId { attempts: usize },

    #[error("ambiguous: {} passwords matched\n{}", .0.len(), render_candidates(.0))]
    Ambiguous(Vec<EntrySummary>),

    #[error("password {0} not found")]
    PasswordNotFound(String),

    #[error("password by (category={category},account={account}) not found")]
    PasswordNotFoundWithAccount { category: String, account: String },

    #[error("incorrect master password")]
    IncorrectMasterPassword,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("store format error: {0}")]
    Format(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KeyboxError {
    /// Build an `Ambiguous` error with candidates ordered by id.
    pub fn ambiguous(mut candidates: Vec<EntrySummary>) -> Self {
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        KeyboxError::Ambiguous(candidates)
    }
}

fn render_candidates(candidates: &[EntrySummary]) -> String {
    candidates
        .iter()
        .map(|c| format!("  {:<10}{:<15}{}", c.short_id(), c.category, c.account))
        .collect::<Vec<_>>()
        .join("\n")
}
