//! Chat loop and transcript rendering.

use anyhow::{Context, Result};
use mandi_core::config::Config;
use mandi_core::core::{ChatController, ChatUpdate, EntryBody, SignalReceiver, TranscriptMutation};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Sends one message, prints the resulting transcript updates, and exits
/// when the request reaches a terminal state.
pub async fn run_once(config: &Config, device_id: Option<&str>, message: &str) -> Result<()> {
    let (mut controller, mut rx) = ChatController::new(config, device_id)?;

    render_all(&controller.send_message(message));
    while let Some(signal) = rx.recv().await {
        let updates = controller.handle(signal);
        let finished = updates
            .iter()
            .any(|u| matches!(u, ChatUpdate::RequestFinished { .. }));
        render_all(&updates);
        if finished {
            break;
        }
    }
    Ok(())
}

/// Interactive loop: one line per message, `/cancel` to stop the current
/// response, `/quit` to exit.
pub async fn run_interactive(config: &Config, device_id: Option<&str>) -> Result<()> {
    let (mut controller, mut rx) = interactive_setup(config, device_id)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/cancel" => render_all(&controller.cancel()),
                    message => render_all(&controller.send_message(message)),
                }
            }
            Some(signal) = rx.recv() => {
                render_all(&controller.handle(signal));
            }
        }
    }
    Ok(())
}

fn interactive_setup(
    config: &Config,
    device_id: Option<&str>,
) -> Result<(ChatController, SignalReceiver)> {
    let (controller, rx) = ChatController::new(config, device_id)?;
    println!("mandi chat ({})", config.base_url);
    println!("type a message, /cancel to interrupt, /quit to exit");
    Ok((controller, rx))
}

fn render_all(updates: &[ChatUpdate]) {
    for update in updates {
        render(update);
    }
}

fn render(update: &ChatUpdate) {
    match update {
        ChatUpdate::Transcript(TranscriptMutation::Appended(entry))
        | ChatUpdate::Transcript(TranscriptMutation::Replaced(entry)) => {
            render_entry(&entry.body);
        }
        ChatUpdate::Transcript(TranscriptMutation::CartSummary(summary)) => {
            println!("[cart] {} items, total {:.2}", summary.total_items, summary.total_value);
        }
        ChatUpdate::Transcript(TranscriptMutation::Removed(_))
        | ChatUpdate::RequestFinished { .. } => {}
    }
}

fn render_entry(body: &EntryBody) {
    match body {
        // The user already typed this line; echoing it back is noise.
        EntryBody::User { .. } => {}
        EntryBody::BotText { text } => println!("{text}"),
        EntryBody::Thinking { message } => println!("[thinking] {message}"),
        EntryBody::ToolExecuting { tool_name, status } => match status {
            Some(status) => println!("[tool] {tool_name}: {status}"),
            None => println!("[tool] {tool_name}"),
        },
        EntryBody::ConversationChunk { message } => println!("{message}"),
        EntryBody::ProductList { products } => {
            for product in products {
                match product.price {
                    Some(price) => println!("  - {} ({price:.2})", product.name),
                    None => println!("  - {}", product.name),
                }
            }
        }
        EntryBody::CartView { items, summary } => {
            for item in items {
                println!("  - {} x{}", item.name, item.quantity);
            }
            println!("[cart] {} items, total {:.2}", summary.total_items, summary.total_value);
        }
        EntryBody::CheckoutStage { details } => {
            println!("[checkout] {details}");
        }
        EntryBody::OrderConfirmation { details } => {
            println!("[order] {details}");
        }
        EntryBody::PaymentInitiated { message } => println!("[payment] {message}"),
        EntryBody::Success { message } => println!("[ok] {message}"),
        EntryBody::Error { message } => println!("[error] {message}"),
    }
}
