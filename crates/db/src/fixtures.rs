use chrono::Utc;

use bankbot_core::domain::account::{AccountNo, AccountRecord, Pin};

use crate::connection::DbPool;
use crate::repositories::{pin_digest, RepositoryError};

pub struct SampleUser {
    pub username: &'static str,
    pub pin: &'static str,
    pub accounts: &'static [SampleAccount],
}

pub struct SampleAccount {
    pub account_no: &'static str,
    pub display_name: &'static str,
    pub account_type: &'static str,
    pub balance: i64,
    pub has_card: bool,
}

const SAMPLE_USERS: &[SampleUser] = &[
    SampleUser {
        username: "Monika",
        pin: "1111",
        accounts: &[
            SampleAccount {
                account_no: "700001",
                display_name: "Rani",
                account_type: "savings",
                balance: 90_000,
                has_card: true,
            },
            SampleAccount {
                account_no: "700002",
                display_name: "Malar",
                account_type: "current",
                balance: 35_000,
                has_card: true,
            },
            SampleAccount {
                account_no: "700003",
                display_name: "Arun",
                account_type: "checking",
                balance: 25_000,
                has_card: true,
            },
            SampleAccount {
                account_no: "700004",
                display_name: "Raj",
                account_type: "business",
                balance: 45_000,
                has_card: true,
            },
            SampleAccount {
                account_no: "700005",
                display_name: "Pravin",
                account_type: "savings",
                balance: 30_000,
                has_card: true,
            },
        ],
    },
    SampleUser {
        username: "Priya",
        pin: "1234",
        accounts: &[
            SampleAccount {
                account_no: "100001",
                display_name: "Sneha",
                account_type: "savings",
                balance: 50_000,
                has_card: true,
            },
            SampleAccount {
                account_no: "100002",
                display_name: "Divya",
                account_type: "current",
                balance: 20_000,
                has_card: false,
            },
            SampleAccount {
                account_no: "100003",
                display_name: "Rahul",
                account_type: "checking",
                balance: 15_000,
                has_card: false,
            },
        ],
    },
    SampleUser {
        username: "Neha",
        pin: "5678",
        accounts: &[
            SampleAccount {
                account_no: "200001",
                display_name: "Meera",
                account_type: "savings",
                balance: 30_000,
                has_card: true,
            },
            SampleAccount {
                account_no: "200002",
                display_name: "Shalini",
                account_type: "business",
                balance: 18_000,
                has_card: false,
            },
            SampleAccount {
                account_no: "200003",
                display_name: "Suresh",
                account_type: "current",
                balance: 22_000,
                has_card: false,
            },
        ],
    },
];

pub const CARD_EXPIRY: &str = "12/30";

impl SampleAccount {
    /// `4000` followed by the last four digits of the account number.
    pub fn card_number(&self) -> String {
        let tail = &self.account_no[self.account_no.len().saturating_sub(4)..];
        format!("4000{tail}")
    }

    pub fn record(&self, username: &str) -> AccountRecord {
        AccountRecord {
            account_no: AccountNo::from(self.account_no),
            username: username.to_owned(),
            display_name: self.display_name.to_owned(),
            account_type: self.account_type.to_owned(),
            balance: self.balance,
        }
    }
}

impl SampleUser {
    pub fn pin(&self) -> Result<Pin, RepositoryError> {
        Pin::parse(self.pin).map_err(|error| RepositoryError::Decode(error.to_string()))
    }
}

/// Three demo customers with named accounts, the same PIN on every account of
/// a user, and cards on a subset of the accounts.
pub struct SampleBankDataset;

impl SampleBankDataset {
    pub fn users() -> &'static [SampleUser] {
        SAMPLE_USERS
    }

    /// Inserts whatever part of the dataset is missing. Existing rows, including
    /// balances changed by earlier transfers, are left alone.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        let created_at = Utc::now().to_rfc3339();
        let mut result = SeedResult::default();

        for user in SAMPLE_USERS {
            let inserted =
                sqlx::query("INSERT OR IGNORE INTO bank_user (username, created_at) VALUES (?, ?)")
                    .bind(user.username)
                    .bind(&created_at)
                    .execute(&mut *tx)
                    .await?;
            result.users_seeded += inserted.rows_affected() as usize;

            let pin = user.pin()?;
            for account in user.accounts {
                let account_no = AccountNo::from(account.account_no);
                let inserted = sqlx::query(
                    "INSERT OR IGNORE INTO account (account_no, username, display_name, account_type, balance, pin_hash, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(account.account_no)
                .bind(user.username)
                .bind(account.display_name)
                .bind(account.account_type)
                .bind(account.balance)
                .bind(pin_digest(&account_no, &pin))
                .bind(&created_at)
                .execute(&mut *tx)
                .await?;
                result.accounts_seeded += inserted.rows_affected() as usize;

                if inserted.rows_affected() == 1 && account.has_card {
                    sqlx::query(
                        "INSERT OR IGNORE INTO card (account_no, card_number, expiry) VALUES (?, ?, ?)",
                    )
                    .bind(account.account_no)
                    .bind(account.card_number())
                    .bind(CARD_EXPIRY)
                    .execute(&mut *tx)
                    .await?;
                    result.cards_seeded += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(result)
    }

    /// Checks that every sample user and account exists with its expected owner.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in SAMPLE_USERS {
            let user_exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bank_user WHERE username = ?1)")
                    .bind(user.username)
                    .fetch_one(pool)
                    .await?;
            checks.push((user.username, user_exists == 1));

            for account in user.accounts {
                let account_exists: i64 = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM account WHERE account_no = ?1 AND username = ?2 AND display_name = ?3)",
                )
                .bind(account.account_no)
                .bind(user.username)
                .bind(account.display_name)
                .fetch_one(pool)
                .await?;
                checks.push((account.account_no, account_exists == 1));
            }
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub users_seeded: usize,
    pub accounts_seeded: usize,
    pub cards_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn card_numbers_use_last_four_digits() {
        let account = &SAMPLE_USERS[1].accounts[0];
        assert_eq!(account.card_number(), "40000001");
    }

    #[test]
    fn sample_pins_parse() {
        for user in SampleBankDataset::users() {
            assert!(user.pin().is_ok(), "{} has an invalid pin", user.username);
        }
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = SampleBankDataset::load(&pool).await.expect("first load");
        assert_eq!(first, SeedResult { users_seeded: 3, accounts_seeded: 11, cards_seeded: 7 });

        let second = SampleBankDataset::load(&pool).await.expect("second load");
        assert_eq!(second, SeedResult::default());

        let verification = SampleBankDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);
        assert_eq!(verification.checks.len(), 14);
    }

    #[tokio::test]
    async fn verify_reports_missing_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let verification = SampleBankDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, present)| !present));
    }
}
