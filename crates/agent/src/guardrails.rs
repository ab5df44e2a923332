use bankbot_core::config::DialogueConfig;
use bankbot_core::{BankIntent, Lexicon, NluSignal};

#[derive(Clone, Debug, PartialEq)]
pub enum GateDecision {
    Accept { intent: BankIntent, confidence: f64 },
    Reject { reason_code: &'static str },
}

/// Confidence gate in front of every banking flow.
#[derive(Clone, Debug, PartialEq)]
pub struct GatePolicy {
    pub unknown_threshold: f64,
    pub lexical_override_threshold: f64,
    pub switch_threshold: f64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::from(&DialogueConfig::default())
    }
}

impl From<&DialogueConfig> for GatePolicy {
    fn from(config: &DialogueConfig) -> Self {
        Self {
            unknown_threshold: config.unknown_threshold,
            lexical_override_threshold: config.lexical_override_threshold,
            switch_threshold: config.switch_threshold,
        }
    }
}

impl GatePolicy {
    /// Accepts a supported banking intent whose confidence clears the unknown
    /// threshold, and whose text either shares a lexicon term with it or is
    /// confident enough to stand on its own.
    pub fn evaluate(&self, signal: &NluSignal, lexicon: &Lexicon, text: &str) -> GateDecision {
        let Some(intent) = signal.intent.as_deref().and_then(|label| label.parse::<BankIntent>().ok()) else {
            return GateDecision::Reject { reason_code: "unsupported_intent" };
        };
        if signal.confidence < self.unknown_threshold {
            return GateDecision::Reject { reason_code: "below_unknown_threshold" };
        }
        if !lexicon.resembles_intent(intent, text)
            && signal.confidence < self.lexical_override_threshold
        {
            return GateDecision::Reject { reason_code: "not_banking_like" };
        }
        GateDecision::Accept { intent, confidence: signal.confidence }
    }

    /// Whether an accepted intent should interrupt the active flow with a
    /// switch proposal. Only explicit phrasing qualifies.
    pub fn offers_switch(
        &self,
        active: BankIntent,
        proposed: BankIntent,
        confidence: f64,
        lexicon: &Lexicon,
        text: &str,
    ) -> bool {
        proposed != active
            && confidence >= self.switch_threshold
            && lexicon.has_explicit_phrase(proposed, text)
    }
}

#[cfg(test)]
mod tests {
    use bankbot_core::{BankIntent, Lexicon, NluSignal};

    use super::{GateDecision, GatePolicy};

    fn signal(intent: &str, confidence: f64) -> NluSignal {
        NluSignal { intent: Some(intent.to_owned()), confidence, entities: Vec::new() }
    }

    #[test]
    fn accepts_confident_banking_text() {
        let decision = GatePolicy::default().evaluate(
            &signal("check_balance", 0.85),
            &Lexicon::default(),
            "what's my account balance",
        );
        assert_eq!(
            decision,
            GateDecision::Accept { intent: BankIntent::CheckBalance, confidence: 0.85 }
        );
    }

    #[test]
    fn rejects_unsupported_and_low_confidence_intents() {
        let policy = GatePolicy::default();
        let lexicon = Lexicon::default();

        assert_eq!(
            policy.evaluate(&signal("greet", 1.0), &lexicon, "hello"),
            GateDecision::Reject { reason_code: "unsupported_intent" }
        );
        assert_eq!(
            policy.evaluate(&signal("transfer_money", 0.79), &lexicon, "transfer money"),
            GateDecision::Reject { reason_code: "below_unknown_threshold" }
        );
        let none = NluSignal { intent: None, confidence: 1.0, entities: Vec::new() };
        assert_eq!(
            policy.evaluate(&none, &lexicon, "transfer"),
            GateDecision::Reject { reason_code: "unsupported_intent" }
        );
    }

    #[test]
    fn unrelated_text_needs_override_confidence() {
        let policy = GatePolicy::default();
        let lexicon = Lexicon::default();

        assert_eq!(
            policy.evaluate(&signal("card_block", 0.90), &lexicon, "Meera"),
            GateDecision::Reject { reason_code: "not_banking_like" }
        );
        assert!(matches!(
            policy.evaluate(&signal("card_block", 0.95), &lexicon, "Meera"),
            GateDecision::Accept { intent: BankIntent::CardBlock, .. }
        ));
    }

    #[test]
    fn switch_requires_different_intent_and_explicit_phrase() {
        let policy = GatePolicy::default();
        let lexicon = Lexicon::default();
        let offers = |proposed, confidence, text| {
            policy.offers_switch(BankIntent::TransferMoney, proposed, confidence, &lexicon, text)
        };

        assert!(offers(BankIntent::CheckBalance, 0.9, "check balance"));
        assert!(!offers(BankIntent::TransferMoney, 0.9, "send money"));
        assert!(!offers(BankIntent::CheckBalance, 0.7, "balance"));
        assert!(!offers(BankIntent::CardBlock, 0.9, "lost it"));
    }
}
