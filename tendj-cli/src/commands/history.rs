//! Conversation history: list, open, and start fresh.

use anyhow::{Context, Result, bail};
use client::{LoadOutcome, SignalSink};
use shared::models::{ConversationId, meaningful_value};

use super::App;
use crate::render::{render_conversation_list, render_transcript};

pub async fn list_chats(app: &App) -> Result<()> {
    let mut controller = app.controller(SignalSink::detached())?;
    controller
        .refresh_conversations()
        .await
        .context("failed to fetch conversations")?;

    let active = controller
        .active()
        .conversation_id
        .as_ref()
        .map(ConversationId::as_str);
    print!(
        "{}",
        render_conversation_list(controller.conversations(), active)
    );
    Ok(())
}

pub async fn open(app: &App, id: &str) -> Result<()> {
    let Some(id) = meaningful_value(id) else {
        bail!("conversation id must not be empty");
    };
    let mut controller = app.controller(SignalSink::detached())?;
    if let Err(err) = controller.refresh_conversations().await {
        tracing::debug!(error = %err, "conversation list unavailable; task id unknown");
    }

    let outcome = controller.select(ConversationId::new(id), None).await;
    if outcome == LoadOutcome::Failed {
        eprintln!("warning: could not load conversation {id}; showing an empty transcript");
    }
    print!(
        "{}",
        render_transcript(&controller.reconciler().transcript().messages())
    );
    Ok(())
}

pub fn new_chat(app: &App) -> Result<()> {
    let mut controller = app.controller(SignalSink::detached())?;
    controller.new_chat();
    println!("Started a new chat. The next message creates a conversation.");
    Ok(())
}
