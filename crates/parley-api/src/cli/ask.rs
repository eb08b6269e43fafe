//! `parley ask` - one completion turn from the terminal.

use std::io::Write;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_types::chat::{CompletionInput, CompletionOutput};

use crate::state::AppState;

/// Options for a single `ask` turn.
pub struct AskArgs {
    pub message: String,
    pub chat_id: Option<Uuid>,
    pub user_id: String,
    pub stream: bool,
    pub json: bool,
}

/// Run one turn and print the reply, followed by the chat id to resume with.
///
/// Ctrl+C cancels the turn; nothing is saved in that case.
pub async fn ask(state: &AppState, args: AskArgs) -> anyhow::Result<()> {
    let input = CompletionInput {
        chat_id: args.chat_id,
        user_id: args.user_id,
        user_message: args.message,
        configuration: (*state.chat_defaults).clone(),
    };

    let cancel = state.shutdown.clone();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = if args.stream {
        let (tx, rx) = mpsc::channel(32);
        let printer = tokio::spawn(print_deltas(rx, !args.json));
        let result = state.chat_service.complete_stream(input, tx, cancel).await;
        // The sender is gone once the turn returns, so the printer finishes.
        let _ = printer.await;
        result
    } else {
        state.chat_service.complete(input, cancel).await
    };
    interrupt.abort();

    let output = result.context("Completion failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if args.stream {
        println!();
    } else {
        println!("{}", output.content);
    }
    println!();
    println!(
        "  {} {}",
        style("chat id:").dim(),
        style(output.chat_id).cyan()
    );
    Ok(())
}

/// Print the new suffix of every cumulative emission.
async fn print_deltas(mut rx: mpsc::Receiver<CompletionOutput>, enabled: bool) -> usize {
    let mut printed = 0;
    let mut stdout = std::io::stdout();
    while let Some(emission) = rx.recv().await {
        if enabled {
            if let Some(delta) = emission.content.get(printed..) {
                let _ = write!(stdout, "{delta}");
                let _ = stdout.flush();
            }
        }
        printed = emission.content.len();
    }
    printed
}
