use bankbot_core::store::AccountStore;
use bankbot_core::TransactionRecord;
use bankbot_db::{LedgerRepository, SqlAccountStore};
use serde_json::{json, Value};

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepFailure};

/// Lists the ledger entries touching any of `username`'s accounts, newest first.
pub fn run(username: &str) -> CommandResult {
    let config = match load_config("history") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("history") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let store = SqlAccountStore::new(pool.clone());

        let lookup = async {
            let users =
                store.list_users().await.map_err(|error| ("store_query", error.to_string(), 8u8))?;
            let Some(user) =
                users.into_iter().find(|user| user.eq_ignore_ascii_case(username.trim()))
            else {
                return Err(("unknown_user", format!("no user named `{}`", username.trim()), 8u8));
            };
            let records = store
                .list_transactions_for_user(&user)
                .await
                .map_err(|error| ("store_query", error.to_string(), 8u8))?;
            Ok::<_, StepFailure>((user, records))
        };
        let outcome = lookup.await;

        pool.close().await;
        outcome
    });

    match result {
        Ok((user, records)) => {
            let message = format!("{} transaction(s) for {user}", records.len());
            let rows: Vec<Value> = records.iter().map(render_record).collect();
            CommandResult::success_with_data(
                "history",
                message,
                Some(json!({ "user": user, "transactions": rows })),
            )
        }
        Err(failure) => CommandResult::from_step("history", failure),
    }
}

fn render_record(record: &TransactionRecord) -> Value {
    json!({
        "id": record.id,
        "from_account": record.from_account.as_str(),
        "to_account": record.to_account.as_str(),
        "amount": record.amount,
        "direction": record.direction.as_str(),
        "description": record.description,
        "occurred_at": record.occurred_at.to_rfc3339(),
    })
}
