use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use bankbot_core::domain::account::{AccountNo, Pin, TransactionRecord};
use bankbot_core::store::StoreError;

pub mod account;
pub mod memory;

pub use account::SqlAccountStore;
pub use memory::InMemoryAccountStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Corrupt(message),
        }
    }
}

/// Read access to the transfer ledger.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Ledger rows touching any account owned by `username`, newest first.
    async fn list_transactions_for_user(
        &self,
        username: &str,
    ) -> Result<Vec<TransactionRecord>, RepositoryError>;
}

/// Hex SHA-256 of the PIN salted with its account number. Stored PIN columns
/// only ever hold this digest.
pub fn pin_digest(account_no: &AccountNo, pin: &Pin) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"bankbot-pin:");
    hasher.update(account_no.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(pin.expose().as_bytes());
    hex::encode(hasher.finalize())
}
