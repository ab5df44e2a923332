use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// The banking operations the assistant knows how to carry out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankIntent {
    TransferMoney,
    CheckBalance,
    CardBlock,
    FindAtm,
}

impl BankIntent {
    pub const ALL: [BankIntent; 4] =
        [Self::TransferMoney, Self::CheckBalance, Self::CardBlock, Self::FindAtm];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransferMoney => "transfer_money",
            Self::CheckBalance => "check_balance",
            Self::CardBlock => "card_block",
            Self::FindAtm => "find_atm",
        }
    }

    /// Label with underscores replaced by spaces, used in user-facing prompts.
    pub fn human_label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for BankIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BankIntent {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == value.trim())
            .ok_or_else(|| DomainError::InvariantViolation(format!("unsupported intent `{value}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::BankIntent;

    #[test]
    fn labels_round_trip_through_from_str() {
        for intent in BankIntent::ALL {
            assert_eq!(intent.as_str().parse::<BankIntent>(), Ok(intent));
        }
        assert!("greet".parse::<BankIntent>().is_err());
        assert_eq!(BankIntent::TransferMoney.human_label(), "transfer money");
    }
}
