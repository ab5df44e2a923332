use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use bankbot_agent::AgentRuntime;
use bankbot_db::DbPool;
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub classifier: String,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, runtime })
}

/// 200 while the account database answers, 503 otherwise. The dialogue engine
/// itself cannot be degraded once bootstrap has succeeded.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "bankbot-server runtime initialized".to_string(),
        },
        database,
        classifier: state.runtime.engine().nlu().backend_name().to_string(),
        active_sessions: state.runtime.session_count().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM account").fetch_one(pool).await {
        Ok(accounts) => {
            HealthCheck { status: "ready", detail: format!("{accounts} account(s) on file") }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use bankbot_agent::{AgentRuntime, DialogueEngine, UserTurn};
    use bankbot_core::audit::TracingAuditSink;
    use bankbot_core::config::DialogueConfig;
    use bankbot_core::{LexiconHandle, NluPipeline};
    use bankbot_db::{connect_with_settings, migrations, InMemoryAccountStore, SampleBankDataset};

    use crate::health::{health, HealthState};

    fn runtime() -> Arc<AgentRuntime> {
        Arc::new(AgentRuntime::new(DialogueEngine::new(
            Arc::new(NluPipeline::builtin_lexical().expect("pipeline")),
            LexiconHandle::default(),
            Arc::new(InMemoryAccountStore::with_sample_data().expect("sample data")),
            Arc::new(TracingAuditSink),
            &DialogueConfig::default(),
        )))
    }

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SampleBankDataset::load(&pool).await.expect("seed");
        let runtime = runtime();
        runtime.handle_message("s-1", UserTurn::text("check my balance")).await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), runtime })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.detail, "11 account(s) on file");
        assert_eq!(payload.classifier, "lexical");
        assert_eq!(payload.active_sessions, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, runtime: runtime() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
