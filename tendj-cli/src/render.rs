//! Plain-text transcript rendering for the terminal.

use std::fmt::Write as _;

use client::{Reconciler, ViewSignal, reconcile::ProvisionalMessage};
use shared::models::{ConversationSummary, Message, MessageRole, StreamId};

pub const EMPTY_TRANSCRIPT: &str = "No messages yet. Type a message to start the conversation.";

const THINKING_PHRASES: [&str; 5] = [
    "is thinking",
    "is looking into it",
    "is checking the details",
    "is putting an answer together",
    "is almost there",
];

/// "<agent> is thinking..." with the verb rotating on each `tick`.
pub fn thinking_phrase(agent_name: Option<&str>, tick: usize) -> String {
    let name = agent_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(MessageRole::Assistant.display_name());
    let phrase = THINKING_PHRASES[tick % THINKING_PHRASES.len()];
    format!("{name} {phrase}...")
}

/// Renders `messages`, printing a role header only when the role differs
/// from the message before it (or from `previous_role` for the first one).
pub fn render_messages(messages: &[Message], previous_role: Option<MessageRole>) -> String {
    let mut out = String::new();
    let mut last_role = previous_role;
    for message in messages {
        if last_role != Some(message.role) {
            if last_role.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "{}:", message.role.display_name());
            last_role = Some(message.role);
        }
        let _ = writeln!(out, "{}", message.content.trim_end());
        if let Some(attachment) = &message.attachment {
            let label = attachment.name.as_deref().unwrap_or(&attachment.uri);
            let _ = writeln!(out, "  [attachment: {label}]");
        }
    }
    out
}

pub fn render_transcript(messages: &[Message]) -> String {
    if messages.is_empty() {
        return format!("{EMPTY_TRANSCRIPT}\n");
    }
    render_messages(messages, None)
}

pub fn render_conversation_list(
    conversations: &[ConversationSummary],
    active: Option<&str>,
) -> String {
    if conversations.is_empty() {
        return "No conversations yet.\n".to_string();
    }
    let width = conversations
        .iter()
        .map(|summary| summary.id.as_str().len())
        .max()
        .unwrap_or_default();
    let mut out = String::new();
    for summary in conversations {
        let marker = if active == Some(summary.id.as_str()) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(
            out,
            "{marker} {:<width$}  {}",
            summary.id.as_str(),
            summary.display_title()
        );
    }
    out
}

fn same_text(left: &Message, right: &Message) -> bool {
    left.role == right.role && left.content == right.content
}

/// Turns view signals into incremental terminal output.
///
/// The terminal cannot repaint, so a replaced transcript is diffed against
/// what was already printed: only new messages are written, and a reply
/// that was streamed live is not printed a second time.
#[derive(Debug, Default)]
pub struct TerminalView {
    shown: Vec<Message>,
    last_role: Option<MessageRole>,
    live: Option<(StreamId, String)>,
    streamed: Option<String>,
    agent_name: Option<String>,
    tick: usize,
}

impl TerminalView {
    pub fn new(agent_name: Option<String>) -> Self {
        Self {
            agent_name,
            ..Self::default()
        }
    }

    /// Text to print for `signal`, if any.
    pub fn apply(&mut self, signal: &ViewSignal, reconciler: &Reconciler) -> Option<String> {
        match signal {
            ViewSignal::TranscriptReplaced => self.replace(reconciler.transcript().messages()),
            ViewSignal::OptimisticAppended(id) => {
                if let Some(entry) = reconciler
                    .transcript()
                    .entries()
                    .iter()
                    .find(|entry| entry.message.id == *id)
                {
                    self.last_role = Some(entry.message.role);
                    self.shown.push(entry.message.clone());
                }
                None
            }
            ViewSignal::Provisional(Some(provisional)) => Some(self.stream(provisional)),
            ViewSignal::Provisional(None) => self.live.take().map(|(_, content)| {
                self.streamed = Some(content);
                "\n".to_string()
            }),
            ViewSignal::Typing(true) => {
                let phrase = thinking_phrase(self.agent_name.as_deref(), self.tick);
                self.tick += 1;
                Some(format!("({phrase})\n"))
            }
            ViewSignal::ConversationChanged(id) => {
                self.shown.clear();
                self.last_role = None;
                self.live = None;
                self.streamed = None;
                let title = id.as_ref().map_or("new chat", |id| id.as_str());
                Some(format!("\n== {title} ==\n"))
            }
            ViewSignal::Typing(false) | ViewSignal::ScrollToLatest => None,
        }
    }

    fn stream(&mut self, provisional: &ProvisionalMessage) -> String {
        let mut out = String::new();
        match &mut self.live {
            Some((stream_id, printed))
                if *stream_id == provisional.stream_id
                    && provisional.content.starts_with(printed.as_str()) =>
            {
                out.push_str(&provisional.content[printed.len()..]);
                printed.clone_from(&provisional.content);
            }
            live => {
                if live.is_some() {
                    out.push('\n');
                }
                if self.last_role != Some(MessageRole::Assistant) {
                    if self.last_role.is_some() {
                        out.push('\n');
                    }
                    out.push_str("Assistant:\n");
                    self.last_role = Some(MessageRole::Assistant);
                }
                out.push_str(&provisional.content);
                *live = Some((provisional.stream_id.clone(), provisional.content.clone()));
            }
        }
        out
    }

    fn replace(&mut self, messages: Vec<Message>) -> Option<String> {
        let prefix = self
            .shown
            .iter()
            .zip(&messages)
            .take_while(|(shown, next)| same_text(shown, next))
            .count();

        let out = if prefix == self.shown.len() {
            let mut fresh: Vec<Message> = messages[prefix..].to_vec();
            if let Some(streamed) = self.streamed.take()
                && let Some(index) = fresh.iter().position(|message| {
                    message.role == MessageRole::Assistant && message.content == streamed
                })
            {
                fresh.remove(index);
            }
            if messages.is_empty() {
                format!("{EMPTY_TRANSCRIPT}\n")
            } else {
                render_messages(&fresh, self.last_role)
            }
        } else {
            self.streamed = None;
            format!("\n--- transcript ---\n{}", render_transcript(&messages))
        };

        self.last_role = messages.last().map(|message| message.role);
        self.shown = messages;
        if out.is_empty() {
            return None;
        }
        // A reply still streaming is cut here and restarts below the output.
        match self.live.take() {
            Some(_) => Some(format!("\n{out}")),
            None => Some(out),
        }
    }
}
