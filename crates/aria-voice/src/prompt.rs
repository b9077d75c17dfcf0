//! Prompt assembly for the language-model stage.

use aria_types::{HistoryEntry, Role};

const PERSONA: &str = "You are ARIA, a helpful voice assistant for managing household tasks, \
calendar events, shopping lists, and budgets. You provide concise, natural responses \
optimized for voice interaction. Keep responses brief and conversational.";

/// Builds the system prompt, addressing the user by name when known.
pub fn system_prompt(user_name: Option<&str>) -> String {
    match user_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{PERSONA}\n\nYou are speaking with {name}."),
        None => PERSONA.to_string(),
    }
}

/// One message in a provider conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Lays out prior turns followed by the new user prompt.
///
/// The result always starts and ends with a user message and never holds
/// two consecutive messages with the same role: leading assistant entries
/// are dropped and runs of the same role are joined with a newline. Chat
/// APIs that require strict alternation reject anything else.
pub fn conversation(history: &[HistoryEntry], prompt: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::with_capacity(history.len() + 1);

    let turns = history
        .iter()
        .map(|e| (e.role, e.content.as_str()))
        .skip_while(|(role, _)| *role == Role::Assistant)
        .chain(std::iter::once((Role::User, prompt)));

    for (role, content) in turns {
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(content);
            }
            _ => messages.push(ChatMessage {
                role,
                content: content.to_string(),
            }),
        }
    }
    messages
}
