use std::sync::Arc;

use uuid::Uuid;

use bankbot_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use bankbot_core::config::{AppConfig, DialogueConfig};
use bankbot_core::domain::account::Pin;
use bankbot_core::nlu::AMOUNT_LABEL;
use bankbot_core::store::{AccountStore, StoreError};
use bankbot_core::{
    ApplicationError, BankIntent, Entity, Lexicon, LexiconHandle, NluPipeline, NluSignal,
};

use crate::flows::{self, FlowContext, StepOutcome};
use crate::guardrails::{GateDecision, GatePolicy};
use crate::response::{Controls, Indicator, TurnResponse};
use crate::state::{DialogueState, FlowHints, PendingSwitch};

pub const CANCELLED_MESSAGE: &str = "🟡 Flow cancelled. What would you like to do next?";
pub const RESTARTED_MESSAGE: &str = "🔄 Flow restarted. Tell me what you want to do.";
pub const CONTINUING_MESSAGE: &str = "👍 Continuing current flow.";

/// One inbound message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserTurn {
    pub text: String,
    /// Logged-in user, if the client knows one.
    pub current_user: Option<String>,
    /// Set when the text answers a control rendered for the previous response.
    pub from_control: bool,
}

impl UserTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), current_user: None, from_control: false }
    }

    pub fn control(text: impl Into<String>) -> Self {
        Self { text: text.into(), current_user: None, from_control: true }
    }

    pub fn with_current_user(mut self, user: impl Into<String>) -> Self {
        self.current_user = Some(user.into());
        self
    }
}

/// Turns classified user messages into banking flow steps.
///
/// The engine is shared by every session; all per-session data lives in the
/// [`DialogueState`] handed to [`DialogueEngine::handle_turn`].
pub struct DialogueEngine {
    nlu: Arc<NluPipeline>,
    lexicon: LexiconHandle,
    store: Arc<dyn AccountStore>,
    audit: Arc<dyn AuditSink>,
    gate: GatePolicy,
    lock_intent_on_start: bool,
}

impl DialogueEngine {
    pub fn new(
        nlu: Arc<NluPipeline>,
        lexicon: LexiconHandle,
        store: Arc<dyn AccountStore>,
        audit: Arc<dyn AuditSink>,
        config: &DialogueConfig,
    ) -> Self {
        Self {
            nlu,
            lexicon,
            store,
            audit,
            gate: GatePolicy::from(config),
            lock_intent_on_start: config.lock_intent_on_start,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn AccountStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ApplicationError> {
        let nlu = NluPipeline::from_config(&config.nlu)?;
        let lexicon = match &config.nlu.lexicon_path {
            Some(path) => Lexicon::load(path)
                .map_err(|error| ApplicationError::Configuration(error.to_string()))?,
            None => Lexicon::default(),
        };
        Ok(Self::new(Arc::new(nlu), LexiconHandle::new(lexicon), store, audit, &config.dialogue))
    }

    pub fn lexicon(&self) -> &LexiconHandle {
        &self.lexicon
    }

    pub fn nlu(&self) -> &NluPipeline {
        &self.nlu
    }

    /// Handles one message for one session. Infrastructure failures reset the
    /// session and come back as an error response, never as a panic or a
    /// half-applied step.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        state: &mut DialogueState,
        turn: &UserTurn,
    ) -> TurnResponse {
        let correlation_id = Uuid::new_v4().to_string();

        let response = match self.process(session_id, &correlation_id, state, turn).await {
            Ok(response) => response,
            Err(error) => {
                state.reset();
                let interface =
                    ApplicationError::from(error).into_interface(correlation_id.clone());
                tracing::error!(
                    event_name = "dialogue.turn.failed",
                    session_id,
                    correlation_id = %correlation_id,
                    error = %interface,
                    "account store failed mid-turn, session reset"
                );
                TurnResponse::finished(interface.user_message(), Indicator::Error)
            }
        };

        tracing::info!(
            event_name = "dialogue.turn.completed",
            session_id,
            correlation_id = %correlation_id,
            from_control = turn.from_control,
            intent = state.intent().map(BankIntent::as_str).unwrap_or("none"),
            step = state.step(),
            indicator = ?response.indicator,
            end_flow = response.end_flow,
            "turn handled"
        );
        response
    }

    async fn process(
        &self,
        session_id: &str,
        correlation_id: &str,
        state: &mut DialogueState,
        turn: &UserTurn,
    ) -> Result<TurnResponse, StoreError> {
        let lexicon = self.lexicon.current();
        let normalized = turn.text.trim().to_lowercase();

        if lexicon.is_cancel(&normalized) {
            self.close_flow(session_id, correlation_id, state, AuditOutcome::Rejected);
            return Ok(TurnResponse::finished(CANCELLED_MESSAGE, Indicator::None));
        }
        if lexicon.is_restart(&normalized) {
            self.close_flow(session_id, correlation_id, state, AuditOutcome::Rejected);
            return Ok(TurnResponse::finished(RESTARTED_MESSAGE, Indicator::None));
        }
        if !turn.from_control && lexicon.looks_general_knowledge(&normalized) {
            state.reset();
            return Ok(TurnResponse::unknown());
        }

        let signal = if turn.from_control {
            NluSignal {
                intent: state.intent().map(|intent| intent.as_str().to_owned()),
                confidence: 1.0,
                entities: Vec::new(),
            }
        } else {
            let signal = self.nlu.process(&turn.text);
            let mut entry = AuditEvent::query_classified(
                Some(session_id.to_owned()),
                correlation_id,
                &turn.text,
                &signal,
            );
            if state.awaits_pin() || Pin::parse(&turn.text).is_ok() {
                entry = entry.redact_query();
            }
            self.audit.emit(entry);
            signal
        };

        let (intent, confidence) = match self.gate.evaluate(&signal, &lexicon, &turn.text) {
            GateDecision::Accept { intent, confidence } => (intent, confidence),
            GateDecision::Reject { reason_code } => {
                tracing::debug!(
                    event_name = "dialogue.gate.rejected",
                    session_id,
                    correlation_id,
                    reason_code,
                    proposed = signal.intent.as_deref().unwrap_or("none"),
                    confidence = signal.confidence,
                    "message did not pass the confidence gate"
                );
                state.reset();
                return Ok(TurnResponse::unknown());
            }
        };

        let ctx = FlowContext {
            store: self.store.as_ref(),
            lexicon: &lexicon,
            audit: self.audit.as_ref(),
            session_id,
            correlation_id,
        };
        let current_user = turn.current_user.as_deref();

        let Some(active_intent) = state.intent() else {
            let hints = FlowHints { confidence, amount: amount_hint(&signal.entities) };
            return self.open_flow(&ctx, state, intent, hints, current_user).await;
        };

        if !turn.from_control
            && !state.intent_lock()
            && self.gate.offers_switch(active_intent, intent, confidence, &lexicon, &turn.text)
        {
            state.propose_switch(PendingSwitch { intent, confidence });
            self.audit.emit(
                self.flow_event(session_id, correlation_id, "dialogue.switch_offered")
                    .with_metadata("from_intent", active_intent.as_str())
                    .with_metadata("to_intent", intent.as_str()),
            );
            return Ok(TurnResponse::ongoing(
                format!(
                    "⚠ Switch to '{}'? Type 'yes' to switch or continue current flow.",
                    intent.human_label()
                ),
                Indicator::None,
            )
            .with_controls(Controls::confirm("switch")));
        }

        if let Some(pending) = state.take_pending_switch() {
            if !lexicon.is_affirmative(&turn.text) {
                return Ok(TurnResponse::ongoing(CONTINUING_MESSAGE, Indicator::None));
            }
            self.close_flow(session_id, correlation_id, state, AuditOutcome::Rejected);
            let hints = FlowHints { confidence: pending.confidence, amount: None };
            return self.open_flow(&ctx, state, pending.intent, hints, current_user).await;
        }

        let outcome = match state.active() {
            Some(active) => flows::advance(&ctx, &active.flow, &active.hints, &turn.text).await?,
            None => return Ok(TurnResponse::unknown()),
        };
        Ok(match outcome {
            StepOutcome::Stay(response) => response,
            StepOutcome::Advance(flow, response) => {
                state.advance_to(flow);
                response
            }
            StepOutcome::Finish(response) => {
                let outcome = if response.indicator == Indicator::Error {
                    AuditOutcome::Rejected
                } else {
                    AuditOutcome::Success
                };
                self.close_flow(session_id, correlation_id, state, outcome);
                response
            }
        })
    }

    async fn open_flow(
        &self,
        ctx: &FlowContext<'_>,
        state: &mut DialogueState,
        intent: BankIntent,
        hints: FlowHints,
        current_user: Option<&str>,
    ) -> Result<TurnResponse, StoreError> {
        match flows::start(ctx, intent, current_user).await? {
            StepOutcome::Advance(flow, response) => {
                let step = flow.step();
                state.begin(flow, hints, self.lock_intent_on_start);
                self.audit.emit(
                    self.flow_event(ctx.session_id, ctx.correlation_id, "dialogue.flow_started")
                        .with_metadata("intent", intent.as_str())
                        .with_metadata("step", step.to_string()),
                );
                Ok(response)
            }
            StepOutcome::Finish(response) | StepOutcome::Stay(response) => {
                state.reset();
                Ok(response)
            }
        }
    }

    /// Resets the session, recording the end of the flow if one was active.
    fn close_flow(
        &self,
        session_id: &str,
        correlation_id: &str,
        state: &mut DialogueState,
        outcome: AuditOutcome,
    ) {
        if let Some(intent) = state.intent() {
            let mut event = self.flow_event(session_id, correlation_id, "dialogue.flow_finished");
            event.outcome = outcome;
            self.audit.emit(
                event
                    .with_metadata("intent", intent.as_str())
                    .with_metadata("step", state.step().to_string()),
            );
        }
        state.reset();
    }

    fn flow_event(&self, session_id: &str, correlation_id: &str, event_type: &str) -> AuditEvent {
        AuditEvent::new(
            Some(session_id.to_owned()),
            correlation_id,
            event_type,
            AuditCategory::Flow,
            "dialogue-engine",
            AuditOutcome::Success,
        )
    }
}

fn amount_hint(entities: &[Entity]) -> Option<String> {
    entities.iter().find(|entity| entity.label == AMOUNT_LABEL).map(|entity| entity.value.clone())
}
