use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountNo(pub String);

impl AccountNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountNo {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One row of a user's account listing, as shown in account pickers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_no: AccountNo,
    pub display_name: String,
    pub account_type: String,
    pub balance: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_no: AccountNo,
    pub username: String,
    pub display_name: String,
    pub account_type: String,
    pub balance: i64,
}

impl AccountRecord {
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            account_no: self.account_no.clone(),
            display_name: self.display_name.clone(),
            account_type: self.account_type.clone(),
            balance: self.balance,
        }
    }
}

/// A four digit account password. The digits never appear in `Debug` output.
#[derive(Clone)]
pub struct Pin(SecretString);

impl Pin {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let candidate = raw.trim();
        if candidate.len() == 4 && candidate.bytes().all(|byte| byte.is_ascii_digit()) {
            Ok(Self(SecretString::from(candidate.to_owned())))
        } else {
            Err(DomainError::InvalidPin)
        }
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl PartialEq for Pin {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Pin {}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

/// Parses a transfer amount typed by a user.
///
/// Thousands separators are accepted and fractional parts are truncated, so
/// `"1,250.75"` becomes `1250`. Anything that does not truncate to a positive
/// whole number is rejected.
pub fn parse_amount(raw: &str) -> Result<i64, DomainError> {
    let cleaned = raw.trim().replace(',', "");
    let value = cleaned
        .parse::<f64>()
        .map_err(|_| DomainError::InvalidAmount(raw.trim().to_owned()))?;

    if !value.is_finite() || value < 1.0 || value >= i64::MAX as f64 {
        return Err(DomainError::InvalidAmount(raw.trim().to_owned()));
    }

    Ok(value.trunc() as i64)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerDirection {
    Debit,
    Credit,
}

impl LedgerDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::str::FromStr for LedgerDirection {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown ledger direction `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub from_account: AccountNo,
    pub to_account: AccountNo,
    pub amount: i64,
    pub direction: LedgerDirection,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{parse_amount, Pin};
    use crate::errors::DomainError;

    #[test]
    fn pin_requires_exactly_four_ascii_digits() {
        assert!(Pin::parse("1234").is_ok());
        assert!(Pin::parse(" 0000 ").is_ok());
        assert_eq!(Pin::parse("123"), Err(DomainError::InvalidPin));
        assert_eq!(Pin::parse("12345"), Err(DomainError::InvalidPin));
        assert_eq!(Pin::parse("12a4"), Err(DomainError::InvalidPin));
        assert_eq!(Pin::parse("١٢٣٤"), Err(DomainError::InvalidPin));
    }

    #[test]
    fn pin_debug_output_is_redacted() {
        let pin = Pin::parse("4821").expect("valid pin");
        let debug = format!("{pin:?}");
        assert!(!debug.contains("4821"));
    }

    #[test]
    fn amount_accepts_separators_and_truncates_decimals() {
        assert_eq!(parse_amount("5000"), Ok(5000));
        assert_eq!(parse_amount(" 12,500 "), Ok(12500));
        assert_eq!(parse_amount("1,250.75"), Ok(1250));
    }

    #[test]
    fn amount_rejects_non_positive_or_unparsable_input() {
        for raw in ["0", "-20", "0.5", "abc", "", "inf", "NaN"] {
            assert!(
                matches!(parse_amount(raw), Err(DomainError::InvalidAmount(_))),
                "`{raw}` should be rejected"
            );
        }
    }
}
