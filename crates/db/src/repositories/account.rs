use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use bankbot_core::domain::account::{
    AccountNo, AccountRecord, AccountSummary, LedgerDirection, Pin, TransactionRecord,
};
use bankbot_core::store::{AccountStore, CardBlockOutcome, StoreError, TransferOutcome};

use super::{pin_digest, LedgerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAccountStore {
    pool: DbPool,
}

impl SqlAccountStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Returns `false` when the user already exists.
    pub async fn create_user(&self, username: &str) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO bank_user (username, created_at) VALUES (?, ?)")
                .bind(username)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn create_account(
        &self,
        username: &str,
        account: &AccountSummary,
        pin: &Pin,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO account (account_no, username, display_name, account_type, balance, pin_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account.account_no.as_str())
        .bind(username)
        .bind(&account.display_name)
        .bind(&account.account_type)
        .bind(account.balance)
        .bind(pin_digest(&account.account_no, pin))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_card(
        &self,
        account_no: &AccountNo,
        card_number: &str,
        expiry: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO card (account_no, card_number, expiry) VALUES (?, ?, ?)")
            .bind(account_no.as_str())
            .bind(card_number)
            .bind(expiry)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_cards(&self, account_no: &AccountNo) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM card WHERE account_no = ?")
            .bind(account_no.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn transfer(
        &self,
        from: &AccountNo,
        to: &AccountNo,
        amount: i64,
        pin: &Pin,
    ) -> Result<TransferOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sender = sqlx::query("SELECT balance, pin_hash FROM account WHERE account_no = ?")
            .bind(from.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(sender) = sender else {
            return Ok(TransferOutcome::InvalidSender);
        };

        let pin_hash: String = decode(&sender, "pin_hash")?;
        if pin_hash != pin_digest(from, pin) {
            return Ok(TransferOutcome::IncorrectPin);
        }

        let balance: i64 = decode(&sender, "balance")?;
        if amount <= 0 || balance < amount {
            return Ok(TransferOutcome::InsufficientBalance);
        }

        let recipient: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM account WHERE account_no = ?")
                .bind(to.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        if recipient.is_none() {
            return Ok(TransferOutcome::RecipientNotFound);
        }

        let debited = sqlx::query(
            "UPDATE account SET balance = balance - ?1 WHERE account_no = ?2 AND balance >= ?1",
        )
        .bind(amount)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;
        if debited.rows_affected() != 1 {
            return Ok(TransferOutcome::InsufficientBalance);
        }

        sqlx::query("UPDATE account SET balance = balance + ? WHERE account_no = ?")
            .bind(amount)
            .bind(to.as_str())
            .execute(&mut *tx)
            .await?;

        let occurred_at = Utc::now().to_rfc3339();
        let entries = [
            (LedgerDirection::Debit, format!("Transfer to {to}")),
            (LedgerDirection::Credit, format!("Received from {from}")),
        ];
        for (direction, description) in entries {
            sqlx::query(
                "INSERT INTO ledger_entry (from_account, to_account, amount, direction, description, occurred_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(amount)
            .bind(direction.as_str())
            .bind(description)
            .bind(&occurred_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            event_name = "store.transfer.completed",
            from = %from,
            to = %to,
            amount,
            "transfer committed"
        );
        Ok(TransferOutcome::Completed { from: from.clone(), to: to.clone(), amount })
    }

    async fn remove_cards(
        &self,
        account_no: &AccountNo,
    ) -> Result<CardBlockOutcome, RepositoryError> {
        let removed = sqlx::query("DELETE FROM card WHERE account_no = ?")
            .bind(account_no.as_str())
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() == 0 {
            return Ok(CardBlockOutcome::NoCardFound { account_no: account_no.clone() });
        }
        tracing::info!(
            event_name = "store.card.blocked",
            account_no = %account_no,
            removed = removed.rows_affected(),
            "cards removed"
        );
        Ok(CardBlockOutcome::Blocked { account_no: account_no.clone() })
    }
}

#[async_trait]
impl AccountStore for SqlAccountStore {
    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        let users: Vec<String> =
            sqlx::query_scalar("SELECT username FROM bank_user WHERE active = 1 ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(RepositoryError::from)?;
        Ok(users)
    }

    async fn list_accounts_for_user(
        &self,
        username: &str,
    ) -> Result<Vec<AccountSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT account_no, username, display_name, account_type, balance
             FROM account WHERE username = ? ORDER BY id",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let accounts = rows
            .iter()
            .map(|row| row_to_account(row).map(|account| account.summary()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    async fn get_account(
        &self,
        account_no: &AccountNo,
    ) -> Result<Option<AccountRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT account_no, username, display_name, account_type, balance
             FROM account WHERE account_no = ?",
        )
        .bind(account_no.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(row_to_account).transpose()?)
    }

    async fn verify_account_password(
        &self,
        account_no: &AccountNo,
        pin: &Pin,
    ) -> Result<bool, StoreError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT pin_hash FROM account WHERE account_no = ?")
                .bind(account_no.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(RepositoryError::from)?;

        Ok(stored.is_some_and(|digest| digest == pin_digest(account_no, pin)))
    }

    async fn transfer_money(
        &self,
        from: &AccountNo,
        to: &AccountNo,
        amount: i64,
        pin: &Pin,
    ) -> Result<TransferOutcome, StoreError> {
        Ok(self.transfer(from, to, amount, pin).await?)
    }

    async fn block_card(&self, account_no: &AccountNo) -> Result<CardBlockOutcome, StoreError> {
        Ok(self.remove_cards(account_no).await?)
    }
}

#[async_trait]
impl LedgerRepository for SqlAccountStore {
    async fn list_transactions_for_user(
        &self,
        username: &str,
    ) -> Result<Vec<TransactionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, from_account, to_account, amount, direction, description, occurred_at
             FROM ledger_entry
             WHERE from_account IN (SELECT account_no FROM account WHERE username = ?1)
                OR to_account IN (SELECT account_no FROM account WHERE username = ?1)
             ORDER BY occurred_at DESC, id DESC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }
}

fn decode<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_account(row: &SqliteRow) -> Result<AccountRecord, RepositoryError> {
    let account_no: String = decode(row, "account_no")?;
    Ok(AccountRecord {
        account_no: AccountNo(account_no),
        username: decode(row, "username")?,
        display_name: decode(row, "display_name")?,
        account_type: decode(row, "account_type")?,
        balance: decode(row, "balance")?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<TransactionRecord, RepositoryError> {
    let from_account: String = decode(row, "from_account")?;
    let to_account: String = decode(row, "to_account")?;
    let direction: String = decode(row, "direction")?;
    let occurred_at: String = decode(row, "occurred_at")?;

    Ok(TransactionRecord {
        id: decode(row, "id")?,
        from_account: AccountNo(from_account),
        to_account: AccountNo(to_account),
        amount: decode(row, "amount")?,
        direction: direction.parse().map_err(|e: bankbot_core::DomainError| {
            RepositoryError::Decode(e.to_string())
        })?,
        description: decode(row, "description")?,
        occurred_at: parse_timestamp("occurred_at", occurred_at)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}
