//! Step handlers for the banking flows.
//!
//! A handler never mutates the session. It reads the current step and returns
//! what should happen next, so an invalid answer leaves the state exactly as it
//! was.

use bankbot_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use bankbot_core::domain::account::{parse_amount, AccountSummary, Pin};
use bankbot_core::store::{AccountStore, StoreError};
use bankbot_core::{BankIntent, Lexicon};

use crate::response::{Controls, Indicator, TurnResponse};
use crate::state::{AccountAction, AccountChoice, AccountStep, Flow, FlowHints, TransferStep};

const INVALID_USER: &str = "❌ Invalid user. Type a valid user name.";
const INVALID_ACCOUNT: &str = "❌ Invalid account name. Choose from the dropdown.";
const PIN_FORMAT: &str = "🔴 Password must be 4 digits. Try again.";
const PIN_MISMATCH: &str = "🔴 Incorrect password. Try again or type 'cancel' to abort.";
const ATM_PLACEHOLDER: &str = "🏧 ATM lookup placeholder. We'll add maps later.";

pub(crate) struct FlowContext<'a> {
    pub store: &'a dyn AccountStore,
    pub lexicon: &'a Lexicon,
    pub audit: &'a dyn AuditSink,
    pub session_id: &'a str,
    pub correlation_id: &'a str,
}

#[derive(Debug)]
pub(crate) enum StepOutcome {
    /// Invalid input: re-ask without touching the state.
    Stay(TurnResponse),
    Advance(Flow, TurnResponse),
    Finish(TurnResponse),
}

impl FlowContext<'_> {
    async fn resolve_user(&self, raw: &str) -> Result<Option<String>, StoreError> {
        let wanted = raw.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        let users = self.store.list_users().await?;
        Ok(users.into_iter().find(|user| user.to_lowercase() == wanted))
    }

    async fn users_line(&self) -> Result<String, StoreError> {
        Ok(self.store.list_users().await?.join(", "))
    }

    async fn accounts(&self, username: &str) -> Result<Vec<AccountSummary>, StoreError> {
        self.store.list_accounts_for_user(username).await
    }

    async fn account_picker(&self, field: &str, username: &str) -> Result<Controls, StoreError> {
        let options = self.accounts(username).await?.into_iter().map(|a| a.display_name).collect();
        Ok(Controls::select_account(field, username, options))
    }

    /// Looks up one of `username`'s accounts by display name, ignoring case.
    async fn choose_account(
        &self,
        username: &str,
        raw: &str,
    ) -> Result<Option<AccountChoice>, StoreError> {
        let wanted = raw.trim().to_lowercase();
        let accounts = self.accounts(username).await?;
        Ok(accounts
            .iter()
            .find(|account| account.display_name.trim().to_lowercase() == wanted)
            .map(|account| AccountChoice::new(username, account)))
    }

    /// The inner `Err` is the re-prompt to send when the PIN is malformed or wrong.
    async fn check_pin(
        &self,
        account: &AccountChoice,
        raw: &str,
    ) -> Result<Result<Pin, TurnResponse>, StoreError> {
        let Ok(pin) = Pin::parse(raw) else {
            return Ok(Err(TurnResponse::retry(PIN_FORMAT).with_controls(Controls::password())));
        };
        if !self.store.verify_account_password(&account.account_no, &pin).await? {
            return Ok(Err(TurnResponse::retry(PIN_MISMATCH).with_controls(Controls::password())));
        }
        Ok(Ok(pin))
    }

    fn record(&self, event_type: &str, outcome: AuditOutcome) -> AuditEvent {
        AuditEvent::new(
            Some(self.session_id.to_owned()),
            self.correlation_id,
            event_type,
            AuditCategory::Transaction,
            "dialogue-engine",
            outcome,
        )
    }
}

/// Opens the flow for `intent`. A known `current_user` skips the user question.
pub(crate) async fn start(
    ctx: &FlowContext<'_>,
    intent: BankIntent,
    current_user: Option<&str>,
) -> Result<StepOutcome, StoreError> {
    let known_user = match current_user {
        Some(raw) => ctx.resolve_user(raw).await?,
        None => None,
    };

    let outcome = match (intent, known_user) {
        (BankIntent::FindAtm, _) => {
            StepOutcome::Finish(TurnResponse::finished(ATM_PLACEHOLDER, Indicator::None))
        }
        (BankIntent::TransferMoney, Some(user)) => StepOutcome::Advance(
            Flow::Transfer(TransferStep::SenderAccount { sender_user: user.clone() }),
            TurnResponse::prompt(
                "📂 Which of your accounts do you want to transfer from? (select account name)",
            )
            .with_controls(ctx.account_picker("from_acc", &user).await?),
        ),
        (BankIntent::TransferMoney, None) => StepOutcome::Advance(
            Flow::Transfer(TransferStep::SenderUser),
            TurnResponse::prompt(format!(
                "📤 From which user’s account do you want to transfer? Users: {}",
                ctx.users_line().await?
            )),
        ),
        (BankIntent::CheckBalance, Some(user)) => StepOutcome::Advance(
            account_flow(AccountAction::CheckBalance, AccountStep::Account { username: user.clone() }),
            TurnResponse::prompt(
                "📂 Which of your accounts do you want to check? (select account name)",
            )
            .with_controls(ctx.account_picker("account", &user).await?),
        ),
        (BankIntent::CheckBalance, None) => StepOutcome::Advance(
            account_flow(AccountAction::CheckBalance, AccountStep::User),
            TurnResponse::prompt(format!(
                "👀 Which user’s account do you want to check? Users: {}",
                ctx.users_line().await?
            )),
        ),
        (BankIntent::CardBlock, Some(user)) => StepOutcome::Advance(
            account_flow(AccountAction::BlockCard, AccountStep::Account { username: user.clone() }),
            TurnResponse::prompt(
                "💳 Which of your accounts' card do you want to block? (select account name)",
            )
            .with_controls(ctx.account_picker("account", &user).await?),
        ),
        (BankIntent::CardBlock, None) => StepOutcome::Advance(
            account_flow(AccountAction::BlockCard, AccountStep::User),
            TurnResponse::prompt(format!(
                "💳 For which user do you want to block a card? Users: {}",
                ctx.users_line().await?
            )),
        ),
    };
    Ok(outcome)
}

pub(crate) async fn advance(
    ctx: &FlowContext<'_>,
    flow: &Flow,
    hints: &FlowHints,
    text: &str,
) -> Result<StepOutcome, StoreError> {
    match flow {
        Flow::Transfer(step) => transfer(ctx, step, hints, text).await,
        Flow::Account { action, step } => account(ctx, *action, step, text).await,
    }
}

fn account_flow(action: AccountAction, step: AccountStep) -> Flow {
    Flow::Account { action, step }
}

async fn transfer(
    ctx: &FlowContext<'_>,
    step: &TransferStep,
    hints: &FlowHints,
    text: &str,
) -> Result<StepOutcome, StoreError> {
    let next = |step: TransferStep, response: TurnResponse| {
        StepOutcome::Advance(Flow::Transfer(step), response)
    };

    match step {
        TransferStep::SenderUser => {
            let Some(user) = ctx.resolve_user(text).await? else {
                return Ok(StepOutcome::Stay(TurnResponse::retry(INVALID_USER)));
            };
            let controls = ctx.account_picker("from_acc", &user).await?;
            Ok(next(
                TransferStep::SenderAccount { sender_user: user },
                TurnResponse::prompt("📂 Which account (select account name)?")
                    .with_controls(controls),
            ))
        }
        TransferStep::SenderAccount { sender_user } => {
            let Some(sender) = ctx.choose_account(sender_user, text).await? else {
                let controls = ctx.account_picker("from_acc", sender_user).await?;
                return Ok(StepOutcome::Stay(
                    TurnResponse::retry(INVALID_ACCOUNT).with_controls(controls),
                ));
            };
            Ok(next(
                TransferStep::RecipientUser { sender },
                TurnResponse::prompt(format!(
                    "👤 To which user’s account do you want to transfer? Users: {}",
                    ctx.users_line().await?
                )),
            ))
        }
        TransferStep::RecipientUser { sender } => {
            let Some(user) = ctx.resolve_user(text).await? else {
                return Ok(StepOutcome::Stay(TurnResponse::retry(
                    "❌ Invalid recipient user. Type a valid user name.",
                )));
            };
            let controls = ctx.account_picker("to_acc", &user).await?;
            Ok(next(
                TransferStep::RecipientAccount { sender: sender.clone(), recipient_user: user },
                TurnResponse::prompt("📥 Which account (select account name)?")
                    .with_controls(controls),
            ))
        }
        TransferStep::RecipientAccount { sender, recipient_user } => {
            let Some(recipient) = ctx.choose_account(recipient_user, text).await? else {
                let controls = ctx.account_picker("to_acc", recipient_user).await?;
                return Ok(StepOutcome::Stay(
                    TurnResponse::retry(
                        "❌ Invalid recipient account name. Choose from the dropdown.",
                    )
                    .with_controls(controls),
                ));
            };
            if recipient.account_no == sender.account_no {
                return Ok(StepOutcome::Stay(TurnResponse::retry(
                    "❌ Sender and recipient cannot be the same account. Choose a different recipient.",
                )));
            }
            Ok(next(
                TransferStep::Pin { sender: sender.clone(), recipient },
                TurnResponse::prompt("🔑 Enter your 4-digit password for the sender account.")
                    .with_controls(Controls::password()),
            ))
        }
        TransferStep::Pin { sender, recipient } => {
            let pin = match ctx.check_pin(sender, text).await? {
                Ok(pin) => pin,
                Err(retry) => return Ok(StepOutcome::Stay(retry)),
            };
            let mut message =
                "🟢 Password verified. How much do you want to transfer? (enter amount)"
                    .to_owned();
            if let Some(amount) = &hints.amount {
                message.push_str(&format!(" You mentioned ₹{amount} earlier."));
            }
            Ok(next(
                TransferStep::Amount { sender: sender.clone(), recipient: recipient.clone(), pin },
                TurnResponse::ongoing(message, Indicator::Success)
                    .with_controls(Controls::amount()),
            ))
        }
        TransferStep::Amount { sender, recipient, pin } => {
            let Ok(amount) = parse_amount(text) else {
                return Ok(StepOutcome::Stay(
                    TurnResponse::retry("❌ Invalid amount. Enter a positive number.")
                        .with_controls(Controls::amount()),
                ));
            };
            let message = format!(
                "⚠ Confirm transfer of ₹{amount} from '{}' ({}) to '{}' ({})? Type 'yes' to proceed.",
                sender.display_name, sender.account_no, recipient.display_name, recipient.account_no
            );
            Ok(next(
                TransferStep::Confirm {
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                    pin: pin.clone(),
                    amount,
                },
                TurnResponse::ongoing(message, Indicator::None)
                    .with_controls(Controls::confirm("confirm")),
            ))
        }
        TransferStep::Confirm { sender, recipient, pin, amount } => {
            if !ctx.lexicon.is_affirmative(text) {
                return Ok(StepOutcome::Finish(TurnResponse::finished(
                    "🟡 Transfer cancelled.",
                    Indicator::None,
                )));
            }

            let outcome = ctx
                .store
                .transfer_money(&sender.account_no, &recipient.account_no, *amount, pin)
                .await?;
            let (indicator, audit_outcome) = if outcome.is_success() {
                (Indicator::Success, AuditOutcome::Success)
            } else {
                (Indicator::Error, AuditOutcome::Rejected)
            };
            ctx.audit.emit(
                ctx.record("transaction.transfer", audit_outcome)
                    .with_metadata("from_account", sender.account_no.as_str())
                    .with_metadata("to_account", recipient.account_no.as_str())
                    .with_metadata("amount", amount.to_string())
                    .with_metadata("result", outcome.to_string()),
            );
            Ok(StepOutcome::Finish(TurnResponse::finished(outcome.to_string(), indicator)))
        }
    }
}

async fn account(
    ctx: &FlowContext<'_>,
    action: AccountAction,
    step: &AccountStep,
    text: &str,
) -> Result<StepOutcome, StoreError> {
    let next = |step: AccountStep, response: TurnResponse| {
        StepOutcome::Advance(account_flow(action, step), response)
    };

    match step {
        AccountStep::User => {
            let Some(username) = ctx.resolve_user(text).await? else {
                return Ok(StepOutcome::Stay(TurnResponse::retry(INVALID_USER)));
            };
            let question = match action {
                AccountAction::CheckBalance => "📂 Which account? (select account name)",
                AccountAction::BlockCard => {
                    "💳 Which account’s card do you want to block? (select account name)"
                }
            };
            let controls = ctx.account_picker("account", &username).await?;
            Ok(next(
                AccountStep::Account { username },
                TurnResponse::prompt(question).with_controls(controls),
            ))
        }
        AccountStep::Account { username } => {
            let Some(account) = ctx.choose_account(username, text).await? else {
                let controls = ctx.account_picker("account", username).await?;
                return Ok(StepOutcome::Stay(
                    TurnResponse::retry(INVALID_ACCOUNT).with_controls(controls),
                ));
            };
            let question = match action {
                AccountAction::CheckBalance => "🔑 Enter your 4-digit password to view balance.",
                AccountAction::BlockCard => "🔑 Enter your 4-digit password to confirm card block.",
            };
            Ok(next(
                AccountStep::Pin { account },
                TurnResponse::prompt(question).with_controls(Controls::password()),
            ))
        }
        AccountStep::Pin { account } => {
            if let Err(retry) = ctx.check_pin(account, text).await? {
                return Ok(StepOutcome::Stay(retry));
            }
            let message = match action {
                AccountAction::CheckBalance => format!(
                    "⚠ Confirm viewing balance for account '{}' ({})? Type 'yes' to proceed.",
                    account.display_name, account.account_no
                ),
                AccountAction::BlockCard => format!(
                    "⚠ Confirm blocking the card linked to account '{}' ({})? Type 'yes' to proceed.",
                    account.display_name, account.account_no
                ),
            };
            Ok(next(
                AccountStep::Confirm { account: account.clone() },
                TurnResponse::ongoing(message, Indicator::None)
                    .with_controls(Controls::confirm("confirm")),
            ))
        }
        AccountStep::Confirm { account } => {
            if !ctx.lexicon.is_affirmative(text) {
                let message = match action {
                    AccountAction::CheckBalance => "🟡 Balance view cancelled.",
                    AccountAction::BlockCard => "🟡 Card block cancelled.",
                };
                return Ok(StepOutcome::Finish(TurnResponse::finished(message, Indicator::None)));
            }

            match action {
                AccountAction::CheckBalance => {
                    let response = match ctx.store.get_account(&account.account_no).await? {
                        Some(record) => TurnResponse::finished(
                            format!("🟢 Balance for '{}': ₹{}", account.display_name, record.balance),
                            Indicator::Success,
                        ),
                        None => TurnResponse::finished(
                            format!("❌ Account {} no longer exists.", account.account_no),
                            Indicator::Error,
                        ),
                    };
                    Ok(StepOutcome::Finish(response))
                }
                AccountAction::BlockCard => {
                    let outcome = ctx.store.block_card(&account.account_no).await?;
                    let (indicator, audit_outcome) = if outcome.is_success() {
                        (Indicator::Success, AuditOutcome::Success)
                    } else {
                        (Indicator::Error, AuditOutcome::Rejected)
                    };
                    ctx.audit.emit(
                        ctx.record("transaction.card_block", audit_outcome)
                            .with_metadata("account", account.account_no.as_str()),
                    );
                    Ok(StepOutcome::Finish(TurnResponse::finished(outcome.to_string(), indicator)))
                }
            }
        }
    }
}
