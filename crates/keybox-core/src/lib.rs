pub mod config;
pub mod error;
pub mod types;

pub use error::{KeyboxError, KeyboxResult};
pub use types::{EntrySummary, MASTER_ID, MIN_PASSWORD_LENGTH, SHORT_ID_LENGTH};
