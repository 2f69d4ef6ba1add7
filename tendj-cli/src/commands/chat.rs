//! Sending messages, the interactive session, and following the push stream.

use std::io::{self, Write as _};

use anyhow::{Context, Result, bail};
use client::{
    BackendError, ChatBackend, LoadOutcome, PendingSend, SignalSink, SubmitOutcome, ViewSignal,
};
use futures_util::StreamExt;
use shared::models::{ConversationId, SendMessageResponse};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal::ctrl_c,
    sync::mpsc::UnboundedReceiver,
    task::JoinSet,
};
use tracing::{debug, warn};

use super::{App, Controller};
use crate::render::{TerminalView, render_conversation_list, render_messages};

const HELP: &str =
    "Commands: /chats, /open <id>, /new, /help, /quit. Anything else is sent as a message.";

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Open(&'a str),
    Chats,
    New,
    Help,
    Quit,
    Empty,
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Message(line);
        };
        let (name, argument) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));
        match name {
            "quit" | "exit" => Self::Quit,
            "new" => Self::New,
            "chats" => Self::Chats,
            "help" => Self::Help,
            "open" if !argument.is_empty() => Self::Open(argument),
            _ => Self::Message(line),
        }
    }
}

fn flush(
    signals: &mut UnboundedReceiver<ViewSignal>,
    view: &mut TerminalView,
    controller: &Controller,
) {
    let mut stdout = io::stdout().lock();
    while let Ok(signal) = signals.try_recv() {
        if let Some(text) = view.apply(&signal, controller.reconciler()) {
            let _ = stdout.write_all(text.as_bytes());
        }
    }
    let _ = stdout.flush();
}

fn describe(conversation_id: Option<&ConversationId>) -> &str {
    conversation_id.map_or("a new chat", ConversationId::as_str)
}

/// One-shot send. Waits for the post-send reload unless `no_wait` is set.
pub async fn send(app: &App, text: &str, no_wait: bool) -> Result<()> {
    let refetch = app.config.chat.refetch_after_send && !no_wait;
    let mut controller = app
        .controller(SignalSink::detached())?
        .with_refetch_after_send(refetch);

    if controller.active().conversation_id.is_some()
        && controller.reload().await == LoadOutcome::Failed
    {
        eprintln!("warning: could not load prior messages; sending without context");
    }
    let before = controller.reconciler().transcript().len();

    match controller.submit(text).await {
        SubmitOutcome::Ignored => bail!("message must not be empty"),
        SubmitOutcome::Failed => bail!("failed to send message"),
        SubmitOutcome::Stale => debug!("send completed after the conversation changed"),
        SubmitOutcome::Sent { conversation_id } => {
            let messages = controller.reconciler().transcript().messages();
            if refetch && messages.len() > before {
                print!("{}", render_messages(&messages[before..], None));
            } else {
                println!("Sent to {}", describe(conversation_id.as_ref()));
            }
        }
    }
    Ok(())
}

type SendResult = (PendingSend, Result<SendMessageResponse, BackendError>);

/// Interactive session multiplexing keyboard input, push events, and
/// in-flight sends onto one controller.
pub async fn interactive(app: &App) -> Result<()> {
    let (sink, mut signals) = SignalSink::channel();
    let mut controller = app.controller(sink)?;
    let push = app.push_channel(controller.backend())?;
    let events = push.subscribe();
    tokio::pin!(events);

    let mut view = TerminalView::new(app.config.chat.agent_name.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sends: JoinSet<SendResult> = JoinSet::new();

    println!("{HELP}");
    println!("== {} ==", describe(controller.active().conversation_id.as_ref()));
    if controller.reload().await == LoadOutcome::Failed {
        eprintln!("warning: could not load the conversation");
    }
    flush(&mut signals, &mut view, &controller);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                match Input::parse(&line) {
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Help => println!("{HELP}"),
                    Input::New => {
                        controller.new_chat();
                    }
                    Input::Chats => match controller.refresh_conversations().await {
                        Ok(_) => {
                            let active = controller.active().conversation_id.as_ref();
                            print!(
                                "{}",
                                render_conversation_list(
                                    controller.conversations(),
                                    active.map(ConversationId::as_str),
                                )
                            );
                        }
                        Err(err) => eprintln!("warning: {err}"),
                    },
                    Input::Open(id) => {
                        let outcome = controller.select(ConversationId::new(id), None).await;
                        if outcome == LoadOutcome::Failed {
                            eprintln!("warning: could not load conversation {id}");
                        }
                    }
                    Input::Message(text) => {
                        if let Some(pending) = controller.begin_submit(text) {
                            let backend = controller.backend().clone();
                            sends.spawn(async move {
                                let result = backend.send_user_message(&pending.request).await;
                                (pending, result)
                            });
                        }
                    }
                }
            }
            Some(event) = events.next() => {
                controller.handle_push(event);
            }
            Some(joined) = sends.join_next() => match joined {
                Ok((pending, result)) => match controller.complete_submit(&pending, result) {
                    SubmitOutcome::Failed => eprintln!("warning: message was not delivered"),
                    SubmitOutcome::Sent { .. } if app.config.chat.refetch_after_send => {
                        controller.refresh_transcript().await;
                    }
                    _ => {}
                },
                Err(err) => warn!(error = %err, "send task failed"),
            },
            _ = ctrl_c() => break,
        }
        flush(&mut signals, &mut view, &controller);
    }

    sends.shutdown().await;
    Ok(())
}

/// Prints the active conversation, then streams push events until Ctrl+C.
pub async fn follow(app: &App) -> Result<()> {
    let (sink, mut signals) = SignalSink::channel();
    let mut controller = app.controller(sink)?;
    let push = app.push_channel(controller.backend())?;

    println!(
        "Following {} on {} (press Ctrl+C to stop)",
        describe(controller.active().conversation_id.as_ref()),
        push.endpoint()
    );
    if controller.reload().await == LoadOutcome::Failed {
        eprintln!("warning: could not load the conversation");
    }
    let mut view = TerminalView::new(app.config.chat.agent_name.clone());
    flush(&mut signals, &mut view, &controller);

    let events = push.subscribe();
    tokio::pin!(events);
    loop {
        tokio::select! {
            Some(event) = events.next() => {
                controller.handle_push(event);
                flush(&mut signals, &mut view, &controller);
            }
            _ = ctrl_c() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_are_recognised() {
        assert_eq!(Input::parse("/quit"), Input::Quit);
        assert_eq!(Input::parse("  /exit "), Input::Quit);
        assert_eq!(Input::parse("/new"), Input::New);
        assert_eq!(Input::parse("/chats"), Input::Chats);
        assert_eq!(Input::parse("/open  c42 "), Input::Open("c42"));
        assert_eq!(Input::parse("   "), Input::Empty);
    }

    #[test]
    fn everything_else_is_a_message() {
        assert_eq!(Input::parse("swap 5 USDC"), Input::Message("swap 5 USDC"));
        assert_eq!(Input::parse("/open"), Input::Message("/open"));
        assert_eq!(Input::parse("/shrug"), Input::Message("/shrug"));
    }

    #[test]
    fn describe_names_new_chats() {
        assert_eq!(describe(None), "a new chat");
        assert_eq!(describe(Some(&ConversationId::new("c1"))), "c1");
    }
}
