use serde::{Deserialize, Serialize};

pub const UNKNOWN_MESSAGE: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    None,
    Thinking,
    Success,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    SelectAccount,
    Password,
    Amount,
    Confirm,
}

/// The input widget a client should render for the next answer. Answers given
/// through a control are sent back with `from_control = true`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Controls {
    pub fn select_account(field: &str, user: &str, options: Vec<String>) -> Self {
        Self {
            kind: ControlKind::SelectAccount,
            field: field.to_owned(),
            user: Some(user.to_owned()),
            options: Some(options),
        }
    }

    pub fn password() -> Self {
        Self::plain(ControlKind::Password, "password")
    }

    pub fn amount() -> Self {
        Self::plain(ControlKind::Amount, "amount")
    }

    pub fn confirm(field: &str) -> Self {
        Self::plain(ControlKind::Confirm, field)
    }

    fn plain(kind: ControlKind, field: &str) -> Self {
        Self { kind, field: field.to_owned(), user: None, options: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub message: String,
    pub indicator: Indicator,
    pub end_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<Controls>,
}

impl TurnResponse {
    /// Asks for the next slot of an ongoing flow.
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::ongoing(message, Indicator::Thinking)
    }

    /// Re-asks the current step after invalid input.
    pub fn retry(message: impl Into<String>) -> Self {
        Self::ongoing(message, Indicator::Error)
    }

    pub fn ongoing(message: impl Into<String>, indicator: Indicator) -> Self {
        Self { message: message.into(), indicator, end_flow: false, controls: None }
    }

    pub fn finished(message: impl Into<String>, indicator: Indicator) -> Self {
        Self { message: message.into(), indicator, end_flow: true, controls: None }
    }

    pub fn unknown() -> Self {
        Self::finished(UNKNOWN_MESSAGE, Indicator::None)
    }

    pub fn with_controls(mut self, controls: Controls) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.message == UNKNOWN_MESSAGE
    }
}
