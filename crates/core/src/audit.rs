use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::nlu::NluSignal;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Nlu,
    Flow,
    Transaction,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub session_id: Option<String>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        session_id: Option<String>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Query-log entry for one classified message. Repeated `(label, value)`
    /// entity pairs are listed once.
    pub fn query_classified(
        session_id: Option<String>,
        correlation_id: impl Into<String>,
        query: &str,
        signal: &NluSignal,
    ) -> Self {
        let mut seen = Vec::new();
        for entity in &signal.entities {
            let entry = format!("{}: {}", entity.label, entity.value);
            if !seen.contains(&entry) {
                seen.push(entry);
            }
        }

        Self::new(
            session_id,
            correlation_id,
            "nlu.query_classified",
            AuditCategory::Nlu,
            "nlu-pipeline",
            AuditOutcome::Success,
        )
        .with_metadata("query", query)
        .with_metadata("intent", signal.intent.clone().unwrap_or_default())
        .with_metadata("confidence", format!("{:.4}", signal.confidence))
        .with_metadata("entities", seen.join(", "))
    }
}

pub const REDACTED: &str = "[redacted]";

impl AuditEvent {
    /// Blanks the query text and the entities read from it.
    pub fn redact_query(self) -> Self {
        self.with_metadata("query", REDACTED).with_metadata("entities", REDACTED)
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Forwards audit events to `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            session_id = event.session_id.as_deref().unwrap_or(""),
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.event_type == event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{
        AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, REDACTED,
    };
    use crate::nlu::{Entity, NluSignal};

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                Some("session-7".to_owned()),
                "turn-123",
                "dialogue.flow_started",
                AuditCategory::Flow,
                "dialogue-engine",
                AuditOutcome::Success,
            )
            .with_metadata("intent", "transfer_money"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "turn-123");
        assert_eq!(events[0].session_id.as_deref(), Some("session-7"));
        assert_eq!(events[0].metadata.get("intent").map(String::as_str), Some("transfer_money"));
    }

    #[test]
    fn query_log_entry_deduplicates_entities() {
        let entity = |label: &str, value: &str, start| Entity {
            label: label.to_owned(),
            value: value.to_owned(),
            start,
            end: start + value.len(),
        };
        let signal = NluSignal {
            intent: Some("transfer_money".to_owned()),
            confidence: 0.91234,
            entities: vec![
                entity("AMOUNT", "500", 4),
                entity("ACCOUNT_TYPE", "savings", 14),
                entity("AMOUNT", "500", 30),
            ],
        };

        let event = AuditEvent::query_classified(None, "turn-1", "pay 500 from savings", &signal);

        assert_eq!(event.event_type, "nlu.query_classified");
        assert_eq!(event.category, AuditCategory::Nlu);
        assert_eq!(event.metadata["intent"], "transfer_money");
        assert_eq!(event.metadata["confidence"], "0.9123");
        assert_eq!(event.metadata["entities"], "AMOUNT: 500, ACCOUNT_TYPE: savings");
    }

    #[test]
    fn redacted_query_keeps_the_classification() {
        let signal = NluSignal {
            intent: None,
            confidence: 0.0,
            entities: vec![Entity {
                label: "AMOUNT".to_owned(),
                value: "4321".to_owned(),
                start: 0,
                end: 4,
            }],
        };

        let event = AuditEvent::query_classified(None, "turn-2", "4321", &signal).redact_query();

        assert_eq!(event.metadata["query"], REDACTED);
        assert_eq!(event.metadata["entities"], REDACTED);
        assert_eq!(event.metadata["confidence"], "0.0000");
        assert!(event.metadata.values().all(|value| !value.contains("4321")));
    }
}
