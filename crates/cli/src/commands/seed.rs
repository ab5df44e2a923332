use bankbot_db::{SampleBankDataset, SeedResult};
use serde_json::json;

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seed_result = SampleBankDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = SampleBankDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedResult, StepFailure> = if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        } else {
            Ok(seed_result)
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => {
            let data = json!({
                "users_seeded": seeded.users_seeded,
                "accounts_seeded": seeded.accounts_seeded,
                "cards_seeded": seeded.cards_seeded,
            });
            CommandResult::success_with_data("seed", dataset_summary(), Some(data))
        }
        Err(failure) => CommandResult::from_step("seed", failure),
    }
}

fn dataset_summary() -> String {
    let lines: Vec<String> = SampleBankDataset::users()
        .iter()
        .map(|user| {
            let accounts: Vec<String> = user
                .accounts
                .iter()
                .map(|account| format!("{} ({})", account.display_name, account.account_no))
                .collect();
            format!("  - {}: {}", user.username, accounts.join(", "))
        })
        .collect();
    format!("sample bank dataset is present:\n{}", lines.join("\n"))
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
