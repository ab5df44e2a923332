use std::sync::Arc;

use axum::Router;
use bankbot_agent::{AgentRuntime, DialogueEngine};
use bankbot_core::audit::TracingAuditSink;
use bankbot_core::config::{AppConfig, ConfigError, LoadOptions};
use bankbot_core::ApplicationError;
use bankbot_db::{connect_with_settings, migrations, DbPool, SqlAccountStore};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{api, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("dialogue engine failed to start: {0}")]
    Engine(#[from] ApplicationError),
}

impl Application {
    /// Turn API, session routes and health check behind one request-tracing layer.
    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.agent_runtime))
            .merge(health::router(self.db_pool.clone(), Arc::clone(&self.agent_runtime)))
            .layer(TraceLayer::new_for_http())
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store = Arc::new(SqlAccountStore::new(db_pool.clone()));
    let engine = DialogueEngine::from_config(&config, store, Arc::new(TracingAuditSink))?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        backend = engine.nlu().backend_name(),
        "dialogue engine ready"
    );

    Ok(Application { config, db_pool, agent_runtime: Arc::new(AgentRuntime::new(engine)) })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bankbot_core::config::{ConfigOverrides, LoadOptions};
    use bankbot_db::SampleBankDataset;
    use tempfile::TempDir;

    use crate::bootstrap::{bootstrap, BootstrapError};

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/bank".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_refuses_to_serve_with_a_broken_lexicon() {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join("bankbot.toml");
        let lexicon_path = dir.path().join("lexicon.toml");
        fs::write(&lexicon_path, "cancel = [").expect("lexicon");
        fs::write(
            &config_path,
            format!(
                "[database]\nurl = \"sqlite::memory:\"\n\n[nlu]\nbackend = \"lexical\"\nlexicon_path = \"{}\"\n",
                lexicon_path.display()
            ),
        )
        .expect("config");

        let result =
            bootstrap(LoadOptions { config_path: Some(config_path), ..LoadOptions::default() })
                .await;

        assert!(matches!(result, Err(BootstrapError::Engine(_))));
    }

    #[tokio::test]
    async fn bootstrap_applies_schema_for_the_account_store() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                nlu_backend: Some(bankbot_core::config::ClassifierBackend::Lexical),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('bank_user', 'account', 'card', 'ledger_entry')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected schema tables after bootstrap");
        assert_eq!(table_count, 4);

        let seeded = SampleBankDataset::load(&app.db_pool).await.expect("seed");
        assert_eq!(seeded.accounts_seeded, 11);

        app.db_pool.close().await;
    }
}
