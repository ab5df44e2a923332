use std::io;
use std::sync::Arc;

use bankbot_agent::{AgentRuntime, DialogueEngine, TurnResponse, UserTurn};
use bankbot_core::audit::TracingAuditSink;
use bankbot_db::SqlAccountStore;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commands::{build_runtime, load_config, open_database, CommandResult};

pub const QUIT_COMMAND: &str = "/quit";

/// Interactive session against the configured database. Runs until EOF or `/quit`.
pub fn run(current_user: Option<String>) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let store = Arc::new(SqlAccountStore::new(pool.clone()));
        let engine = DialogueEngine::from_config(&config, store, Arc::new(TracingAuditSink))
            .map_err(|error| ("engine_init", error.to_string(), 7u8))?;
        let agent = AgentRuntime::new(engine);

        let session_id = "cli";
        let turns = converse(
            &agent,
            session_id,
            current_user.as_deref(),
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await
        .map_err(|error| ("terminal_io", error.to_string(), 9u8));
        pool.close().await;
        turns
    });

    match result {
        Ok(turns) => CommandResult::success("chat", format!("chat closed after {turns} turn(s)")),
        Err(failure) => CommandResult::from_step("chat", failure),
    }
}

/// Feeds lines from `input` to one session and writes each reply to `output`.
///
/// While a flow is active every line answers the pending question, the same
/// way a control callback would; outside a flow lines are classified.
pub async fn converse<R, W>(
    agent: &AgentRuntime,
    session_id: &str,
    current_user: Option<&str>,
    input: R,
    mut output: W,
) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut turns = 0;

    output.write_all(b"bot> Hi! Ask me to transfer money, check a balance, block a card or find an ATM.\n").await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == QUIT_COMMAND {
            break;
        }

        let in_flow = agent.snapshot(session_id).await.is_some_and(|snapshot| snapshot.step > 0);
        let mut turn = if in_flow { UserTurn::control(text) } else { UserTurn::text(text) };
        if let Some(user) = current_user {
            turn = turn.with_current_user(user);
        }

        let response = agent.handle_message(session_id, turn).await;
        output.write_all(render(&response).as_bytes()).await?;
        output.flush().await?;
        turns += 1;
    }

    agent.end_session(session_id).await;
    Ok(turns)
}

fn render(response: &TurnResponse) -> String {
    let mut rendered = format!("bot> {}\n", response.message);
    if let Some(options) = response.controls.as_ref().and_then(|controls| controls.options.as_ref()) {
        rendered.push_str(&format!("     options: {}\n", options.join(", ")));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bankbot_agent::{AgentRuntime, DialogueEngine};
    use bankbot_core::audit::TracingAuditSink;
    use bankbot_core::config::DialogueConfig;
    use bankbot_core::{LexiconHandle, NluPipeline};
    use bankbot_db::InMemoryAccountStore;

    use super::converse;

    fn agent() -> AgentRuntime {
        AgentRuntime::new(DialogueEngine::new(
            Arc::new(NluPipeline::builtin_lexical().expect("pipeline")),
            LexiconHandle::default(),
            Arc::new(InMemoryAccountStore::with_sample_data().expect("sample data")),
            Arc::new(TracingAuditSink),
            &DialogueConfig::default(),
        ))
    }

    #[tokio::test]
    async fn scripted_balance_check_runs_to_completion() {
        let agent = agent();
        let script = b"check my balance\nNeha\nMeera\n5678\nyes\n/quit\nignored\n";
        let mut transcript = Vec::new();

        let turns = converse(&agent, "cli", None, &script[..], &mut transcript)
            .await
            .expect("conversation");

        let transcript = String::from_utf8(transcript).expect("utf8");
        assert_eq!(turns, 5);
        assert!(transcript.contains("options: Meera, Shalini, Suresh"), "{transcript}");
        assert!(transcript.contains("bot> 🟢 Balance for 'Meera': ₹30000"), "{transcript}");
        assert_eq!(agent.session_count().await, 0);
    }

    #[tokio::test]
    async fn logged_in_user_skips_the_user_question() {
        let agent = agent();
        let mut transcript = Vec::new();

        converse(&agent, "cli", Some("Priya"), &b"block my card\n"[..], &mut transcript)
            .await
            .expect("conversation");

        let transcript = String::from_utf8(transcript).expect("utf8");
        assert!(transcript.contains("options: Sneha, Divya, Rahul"), "{transcript}");
    }
}
