use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::account::{AccountNo, AccountRecord, AccountSummary, Pin};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("account store unavailable: {0}")]
    Unavailable(String),
    #[error("account store returned malformed data: {0}")]
    Corrupt(String),
}

/// Result of a money transfer attempt. Every variant except `Completed` leaves
/// both balances and the ledger untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed { from: AccountNo, to: AccountNo, amount: i64 },
    InvalidSender,
    IncorrectPin,
    InsufficientBalance,
    RecipientNotFound,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { from, to, amount } => {
                write!(f, "✅ Transferred ₹{amount} from {from} to {to}.")
            }
            Self::InvalidSender => f.write_str("❌ Invalid sender account"),
            Self::IncorrectPin => f.write_str("❌ Incorrect PIN"),
            Self::InsufficientBalance => f.write_str("❌ Insufficient balance"),
            Self::RecipientNotFound => f.write_str("❌ Recipient account not found"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CardBlockOutcome {
    Blocked { account_no: AccountNo },
    NoCardFound { account_no: AccountNo },
}

impl CardBlockOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

impl fmt::Display for CardBlockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked { account_no } => {
                write!(f, "✅ Card linked to account {account_no} blocked and removed.")
            }
            Self::NoCardFound { account_no } => {
                write!(f, "⚠️ No card found for account {account_no}.")
            }
        }
    }
}

/// Account facts and mutations the dialogue engine depends on.
///
/// Each call is atomic on its own: a transfer either applies both balance
/// changes and both ledger rows or none of them.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<String>, StoreError>;

    async fn list_accounts_for_user(&self, username: &str)
        -> Result<Vec<AccountSummary>, StoreError>;

    async fn get_account(&self, account_no: &AccountNo) -> Result<Option<AccountRecord>, StoreError>;

    async fn verify_account_password(
        &self,
        account_no: &AccountNo,
        pin: &Pin,
    ) -> Result<bool, StoreError>;

    async fn transfer_money(
        &self,
        from: &AccountNo,
        to: &AccountNo,
        amount: i64,
        pin: &Pin,
    ) -> Result<TransferOutcome, StoreError>;

    async fn block_card(&self, account_no: &AccountNo) -> Result<CardBlockOutcome, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::{CardBlockOutcome, TransferOutcome};
    use crate::domain::account::AccountNo;

    #[test]
    fn outcome_messages_match_user_facing_wording() {
        let completed =
            TransferOutcome::Completed { from: "700001".into(), to: "100002".into(), amount: 500 };
        assert_eq!(completed.to_string(), "✅ Transferred ₹500 from 700001 to 100002.");
        assert!(completed.is_success());
        assert_eq!(TransferOutcome::InsufficientBalance.to_string(), "❌ Insufficient balance");
        assert!(!TransferOutcome::IncorrectPin.is_success());

        let missing = CardBlockOutcome::NoCardFound { account_no: AccountNo::from("200003") };
        assert_eq!(missing.to_string(), "⚠️ No card found for account 200003.");
        assert!(!missing.is_success());
    }
}
