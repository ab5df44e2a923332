//! Per-session dialogue state.
//!
//! Each flow step is an enum variant holding exactly the slots captured so
//! far, so a step cannot be reached without its prerequisites. Step numbers are
//! derived from the variant and an idle session has no flow at all.

use bankbot_core::domain::account::{AccountNo, AccountSummary, Pin};
use bankbot_core::BankIntent;

/// An account picked by display name during a flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountChoice {
    pub username: String,
    pub account_no: AccountNo,
    pub display_name: String,
}

impl AccountChoice {
    pub fn new(username: &str, account: &AccountSummary) -> Self {
        Self {
            username: username.to_owned(),
            account_no: account.account_no.clone(),
            display_name: account.display_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferStep {
    SenderUser,
    SenderAccount { sender_user: String },
    RecipientUser { sender: AccountChoice },
    RecipientAccount { sender: AccountChoice, recipient_user: String },
    Pin { sender: AccountChoice, recipient: AccountChoice },
    Amount { sender: AccountChoice, recipient: AccountChoice, pin: Pin },
    Confirm { sender: AccountChoice, recipient: AccountChoice, pin: Pin, amount: i64 },
}

impl TransferStep {
    pub fn number(&self) -> u8 {
        match self {
            Self::SenderUser => 1,
            Self::SenderAccount { .. } => 2,
            Self::RecipientUser { .. } => 3,
            Self::RecipientAccount { .. } => 4,
            Self::Pin { .. } => 5,
            Self::Amount { .. } => 6,
            Self::Confirm { .. } => 7,
        }
    }
}

/// What a single-account flow does once confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountAction {
    CheckBalance,
    BlockCard,
}

impl AccountAction {
    pub fn intent(self) -> BankIntent {
        match self {
            Self::CheckBalance => BankIntent::CheckBalance,
            Self::BlockCard => BankIntent::CardBlock,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountStep {
    User,
    Account { username: String },
    Pin { account: AccountChoice },
    Confirm { account: AccountChoice },
}

impl AccountStep {
    pub fn number(&self) -> u8 {
        match self {
            Self::User => 1,
            Self::Account { .. } => 2,
            Self::Pin { .. } => 3,
            Self::Confirm { .. } => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Transfer(TransferStep),
    Account { action: AccountAction, step: AccountStep },
}

impl Flow {
    pub fn intent(&self) -> BankIntent {
        match self {
            Self::Transfer(_) => BankIntent::TransferMoney,
            Self::Account { action, .. } => action.intent(),
        }
    }

    pub fn step(&self) -> u8 {
        match self {
            Self::Transfer(step) => step.number(),
            Self::Account { step, .. } => step.number(),
        }
    }
}

/// Signals captured from the message that opened a flow.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowHints {
    pub confidence: f64,
    /// Normalized AMOUNT entity, shown in the amount prompt.
    pub amount: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingSwitch {
    pub intent: BankIntent,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveFlow {
    pub flow: Flow,
    pub hints: FlowHints,
    pub pending_switch: Option<PendingSwitch>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DialogueState {
    active: Option<ActiveFlow>,
    intent_lock: bool,
}

impl DialogueState {
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn intent(&self) -> Option<BankIntent> {
        self.active.as_ref().map(|active| active.flow.intent())
    }

    /// 1-based step of the active flow, 0 when idle.
    pub fn step(&self) -> u8 {
        self.active.as_ref().map_or(0, |active| active.flow.step())
    }

    pub fn intent_lock(&self) -> bool {
        self.intent_lock
    }

    pub fn active(&self) -> Option<&ActiveFlow> {
        self.active.as_ref()
    }

    pub fn pending_switch(&self) -> Option<&PendingSwitch> {
        self.active.as_ref().and_then(|active| active.pending_switch.as_ref())
    }

    /// True while the active step expects a password.
    pub fn awaits_pin(&self) -> bool {
        matches!(
            self.active.as_ref().map(|active| &active.flow),
            Some(Flow::Transfer(TransferStep::Pin { .. }))
                | Some(Flow::Account { step: AccountStep::Pin { .. }, .. })
        )
    }

    pub fn reset(&mut self) {
        self.active = None;
        self.intent_lock = false;
    }

    pub(crate) fn begin(&mut self, flow: Flow, hints: FlowHints, lock: bool) {
        self.active = Some(ActiveFlow { flow, hints, pending_switch: None });
        self.intent_lock = lock;
    }

    pub(crate) fn advance_to(&mut self, flow: Flow) {
        if let Some(active) = self.active.as_mut() {
            active.flow = flow;
        }
    }

    pub(crate) fn propose_switch(&mut self, proposal: PendingSwitch) {
        if let Some(active) = self.active.as_mut() {
            active.pending_switch = Some(proposal);
        }
    }

    pub(crate) fn take_pending_switch(&mut self) -> Option<PendingSwitch> {
        self.active.as_mut().and_then(|active| active.pending_switch.take())
    }
}

/// Serializable view of a session, without any captured secrets.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SessionSnapshot {
    pub intent: Option<BankIntent>,
    pub step: u8,
    pub intent_lock: bool,
    pub pending_switch: Option<BankIntent>,
}

impl From<&DialogueState> for SessionSnapshot {
    fn from(state: &DialogueState) -> Self {
        Self {
            intent: state.intent(),
            step: state.step(),
            intent_lock: state.intent_lock(),
            pending_switch: state.pending_switch().map(|pending| pending.intent),
        }
    }
}

#[cfg(test)]
mod tests {
    use bankbot_core::domain::account::AccountNo;
    use bankbot_core::BankIntent;

    use super::{
        AccountAction, AccountChoice, AccountStep, DialogueState, Flow, FlowHints, PendingSwitch,
        TransferStep,
    };

    #[test]
    fn idle_state_has_no_intent_and_step_zero() {
        let state = DialogueState::default();
        assert!(state.is_idle());
        assert_eq!(state.intent(), None);
        assert_eq!(state.step(), 0);
        assert!(!state.intent_lock());
    }

    #[test]
    fn reset_clears_flow_lock_and_pending_switch() {
        let mut state = DialogueState::default();
        state.begin(Flow::Transfer(TransferStep::SenderUser), FlowHints::default(), true);
        state.propose_switch(PendingSwitch { intent: BankIntent::CheckBalance, confidence: 0.9 });

        assert_eq!(state.intent(), Some(BankIntent::TransferMoney));
        assert_eq!(state.step(), 1);
        assert!(state.pending_switch().is_some());

        state.reset();
        assert_eq!(state, DialogueState::default());
    }

    #[test]
    fn account_flows_map_to_their_intents() {
        let mut state = DialogueState::default();
        state.begin(
            Flow::Account {
                action: AccountAction::BlockCard,
                step: AccountStep::Account { username: "Neha".to_owned() },
            },
            FlowHints::default(),
            false,
        );
        assert_eq!(state.intent(), Some(BankIntent::CardBlock));
        assert_eq!(state.step(), 2);
        assert!(!state.awaits_pin());
    }

    #[test]
    fn password_steps_are_flagged() {
        let mut state = DialogueState::default();
        assert!(!state.awaits_pin());

        state.begin(
            Flow::Account {
                action: AccountAction::CheckBalance,
                step: AccountStep::Pin {
                    account: AccountChoice {
                        username: "Priya".to_owned(),
                        account_no: AccountNo::from("100001"),
                        display_name: "Sneha".to_owned(),
                    },
                },
            },
            FlowHints::default(),
            true,
        );
        assert!(state.awaits_pin());
    }
}
