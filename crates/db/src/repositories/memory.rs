use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use bankbot_core::domain::account::{
    AccountNo, AccountRecord, AccountSummary, LedgerDirection, Pin, TransactionRecord,
};
use bankbot_core::store::{AccountStore, CardBlockOutcome, StoreError, TransferOutcome};

use super::{pin_digest, LedgerRepository, RepositoryError};
use crate::fixtures::{SampleBankDataset, CARD_EXPIRY};

struct StoredAccount {
    record: AccountRecord,
    pin_hash: String,
}

#[derive(Default)]
struct Bank {
    users: Vec<String>,
    accounts: Vec<StoredAccount>,
    cards: HashMap<AccountNo, Vec<(String, String)>>,
    ledger: Vec<TransactionRecord>,
}

impl Bank {
    fn account(&self, account_no: &AccountNo) -> Option<&StoredAccount> {
        self.accounts.iter().find(|stored| &stored.record.account_no == account_no)
    }

    fn account_mut(&mut self, account_no: &AccountNo) -> Option<&mut StoredAccount> {
        self.accounts.iter_mut().find(|stored| &stored.record.account_no == account_no)
    }
}

/// Account store kept in process memory. Every operation holds the write lock
/// for its whole duration, so transfers are atomic.
#[derive(Default)]
pub struct InMemoryAccountStore {
    bank: RwLock<Bank>,
}

impl InMemoryAccountStore {
    pub fn with_sample_data() -> Result<Self, RepositoryError> {
        let mut bank = Bank::default();
        for user in SampleBankDataset::users() {
            bank.users.push(user.username.to_owned());
            let pin = user.pin()?;
            for account in user.accounts {
                let record = account.record(user.username);
                let pin_hash = pin_digest(&record.account_no, &pin);
                if account.has_card {
                    bank.cards
                        .entry(record.account_no.clone())
                        .or_default()
                        .push((account.card_number(), CARD_EXPIRY.to_owned()));
                }
                bank.accounts.push(StoredAccount { record, pin_hash });
            }
        }
        Ok(Self { bank: RwLock::new(bank) })
    }

    pub async fn create_user(&self, username: &str) -> bool {
        let mut bank = self.bank.write().await;
        if bank.users.iter().any(|existing| existing == username) {
            return false;
        }
        bank.users.push(username.to_owned());
        true
    }

    pub async fn create_account(
        &self,
        username: &str,
        account: &AccountSummary,
        pin: &Pin,
    ) -> Result<(), RepositoryError> {
        let mut bank = self.bank.write().await;
        if bank.account(&account.account_no).is_some() {
            return Err(RepositoryError::Decode(format!(
                "account {} already exists",
                account.account_no
            )));
        }
        bank.accounts.push(StoredAccount {
            record: AccountRecord {
                account_no: account.account_no.clone(),
                username: username.to_owned(),
                display_name: account.display_name.clone(),
                account_type: account.account_type.clone(),
                balance: account.balance,
            },
            pin_hash: pin_digest(&account.account_no, pin),
        });
        Ok(())
    }

    pub async fn add_card(&self, account_no: &AccountNo, card_number: &str, expiry: &str) {
        let mut bank = self.bank.write().await;
        bank.cards
            .entry(account_no.clone())
            .or_default()
            .push((card_number.to_owned(), expiry.to_owned()));
    }

    pub async fn count_cards(&self, account_no: &AccountNo) -> usize {
        self.bank.read().await.cards.get(account_no).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.bank.read().await.users.clone())
    }

    async fn list_accounts_for_user(
        &self,
        username: &str,
    ) -> Result<Vec<AccountSummary>, StoreError> {
        let bank = self.bank.read().await;
        Ok(bank
            .accounts
            .iter()
            .filter(|stored| stored.record.username == username)
            .map(|stored| stored.record.summary())
            .collect())
    }

    async fn get_account(
        &self,
        account_no: &AccountNo,
    ) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.bank.read().await.account(account_no).map(|stored| stored.record.clone()))
    }

    async fn verify_account_password(
        &self,
        account_no: &AccountNo,
        pin: &Pin,
    ) -> Result<bool, StoreError> {
        let bank = self.bank.read().await;
        Ok(bank
            .account(account_no)
            .is_some_and(|stored| stored.pin_hash == pin_digest(account_no, pin)))
    }

    async fn transfer_money(
        &self,
        from: &AccountNo,
        to: &AccountNo,
        amount: i64,
        pin: &Pin,
    ) -> Result<TransferOutcome, StoreError> {
        let mut bank = self.bank.write().await;

        let Some(sender) = bank.account(from) else {
            return Ok(TransferOutcome::InvalidSender);
        };
        if sender.pin_hash != pin_digest(from, pin) {
            return Ok(TransferOutcome::IncorrectPin);
        }
        if amount <= 0 || sender.record.balance < amount {
            return Ok(TransferOutcome::InsufficientBalance);
        }
        if bank.account(to).is_none() {
            return Ok(TransferOutcome::RecipientNotFound);
        }

        if let Some(sender) = bank.account_mut(from) {
            sender.record.balance -= amount;
        }
        if let Some(recipient) = bank.account_mut(to) {
            recipient.record.balance += amount;
        }

        let occurred_at = Utc::now();
        let next_id = bank.ledger.len() as i64 + 1;
        let entries = [
            (LedgerDirection::Debit, format!("Transfer to {to}")),
            (LedgerDirection::Credit, format!("Received from {from}")),
        ];
        for (offset, (direction, description)) in entries.into_iter().enumerate() {
            bank.ledger.push(TransactionRecord {
                id: next_id + offset as i64,
                from_account: from.clone(),
                to_account: to.clone(),
                amount,
                direction,
                description,
                occurred_at,
            });
        }

        Ok(TransferOutcome::Completed { from: from.clone(), to: to.clone(), amount })
    }

    async fn block_card(&self, account_no: &AccountNo) -> Result<CardBlockOutcome, StoreError> {
        let mut bank = self.bank.write().await;
        match bank.cards.remove(account_no) {
            Some(cards) if !cards.is_empty() => {
                Ok(CardBlockOutcome::Blocked { account_no: account_no.clone() })
            }
            _ => Ok(CardBlockOutcome::NoCardFound { account_no: account_no.clone() }),
        }
    }
}

#[async_trait::async_trait]
impl LedgerRepository for InMemoryAccountStore {
    async fn list_transactions_for_user(
        &self,
        username: &str,
    ) -> Result<Vec<TransactionRecord>, RepositoryError> {
        let bank = self.bank.read().await;
        let owned = |account_no: &AccountNo| {
            bank.account(account_no).is_some_and(|stored| stored.record.username == username)
        };
        let mut entries: Vec<TransactionRecord> = bank
            .ledger
            .iter()
            .filter(|entry| owned(&entry.from_account) || owned(&entry.to_account))
            .cloned()
            .collect();
        entries.sort_by(|left, right| {
            right.occurred_at.cmp(&left.occurred_at).then(right.id.cmp(&left.id))
        });
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use bankbot_core::domain::account::{AccountNo, AccountSummary, Pin};
    use bankbot_core::store::{AccountStore, CardBlockOutcome, TransferOutcome};

    use super::InMemoryAccountStore;
    use crate::repositories::LedgerRepository;

    fn pin(raw: &str) -> Pin {
        Pin::parse(raw).expect("pin")
    }

    #[tokio::test]
    async fn sample_data_matches_seeded_users() {
        let store = InMemoryAccountStore::with_sample_data().expect("sample data");

        assert_eq!(store.list_users().await.expect("users"), vec!["Monika", "Priya", "Neha"]);
        let monika = store.list_accounts_for_user("Monika").await.expect("accounts");
        assert_eq!(monika.len(), 5);
        assert_eq!(monika[0].display_name, "Rani");
        assert_eq!(store.count_cards(&AccountNo::from("100002")).await, 0);
        assert_eq!(store.count_cards(&AccountNo::from("100001")).await, 1);
    }

    #[tokio::test]
    async fn transfer_checks_run_in_order() {
        let store = InMemoryAccountStore::with_sample_data().expect("sample data");
        let sneha = AccountNo::from("100001");
        let meera = AccountNo::from("200001");

        assert_eq!(
            store.transfer_money(&sneha, &meera, 10, &pin("9999")).await.expect("transfer"),
            TransferOutcome::IncorrectPin
        );
        assert_eq!(
            store.transfer_money(&sneha, &meera, 60_000, &pin("1234")).await.expect("transfer"),
            TransferOutcome::InsufficientBalance
        );
        assert_eq!(
            store
                .transfer_money(&sneha, &AccountNo::from("0"), 10, &pin("1234"))
                .await
                .expect("transfer"),
            TransferOutcome::RecipientNotFound
        );

        let outcome =
            store.transfer_money(&sneha, &meera, 2_000, &pin("1234")).await.expect("transfer");
        assert!(outcome.is_success());
        let sender = store.get_account(&sneha).await.expect("get").expect("exists");
        let recipient = store.get_account(&meera).await.expect("get").expect("exists");
        assert_eq!(sender.balance, 48_000);
        assert_eq!(recipient.balance, 32_000);

        let history = store.list_transactions_for_user("Priya").await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, 2, "newest entry first");
    }

    #[tokio::test]
    async fn block_card_reports_missing_cards() {
        let store = InMemoryAccountStore::with_sample_data().expect("sample data");
        let account = AccountNo::from("200002");

        assert_eq!(
            store.block_card(&account).await.expect("block"),
            CardBlockOutcome::NoCardFound { account_no: account.clone() }
        );

        store.add_card(&account, "40000002", "01/31").await;
        assert!(store.block_card(&account).await.expect("block").is_success());
        assert_eq!(store.count_cards(&account).await, 0);
    }

    #[tokio::test]
    async fn created_accounts_are_listed_and_unique() {
        let store = InMemoryAccountStore::default();
        assert!(store.create_user("Asha").await);
        assert!(!store.create_user("Asha").await);

        let account = AccountSummary {
            account_no: AccountNo::from("300001"),
            display_name: "Kavya".to_owned(),
            account_type: "savings".to_owned(),
            balance: 100,
        };
        store.create_account("Asha", &account, &pin("4321")).await.expect("create");
        assert!(store.create_account("Asha", &account, &pin("4321")).await.is_err());

        assert_eq!(store.list_accounts_for_user("Asha").await.expect("accounts"), vec![account]);
        assert!(store
            .verify_account_password(&AccountNo::from("300001"), &pin("4321"))
            .await
            .expect("verify"));
    }
}
