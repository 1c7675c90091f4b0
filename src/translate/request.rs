//! Translate inbound OpenAI chat-completion requests into Merlin thread requests.
//!
//! Merlin takes a single message plus a flattened textual context, so the last
//! inbound message becomes the message content and every prior turn is rendered
//! as a `"<role>: <content>"` line. Pure function: no I/O, fresh ids per call.

use super::merlin_types::{ThreadMessage, ThreadMetadata, ThreadRequest};
use super::openai_types::ChatMessage;
use uuid::Uuid;

pub const CHAT_MODE: &str = "UNIFIED_CHAT";
pub const ROOT_PARENT_ID: &str = "root";

/// Build the upstream request body for `model` from the inbound messages.
/// `messages` must be non-empty; the caller validates that.
pub fn to_thread_request(messages: &[ChatMessage], model: &str) -> ThreadRequest {
    let (last, prior) = match messages.split_last() {
        Some((last, prior)) => (last.content.as_str(), prior),
        None => ("", &[][..]),
    };

    let context = prior
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    ThreadRequest {
        attachments: Vec::new(),
        chat_id: Uuid::new_v4().to_string(),
        language: "AUTO".to_string(),
        message: ThreadMessage {
            child_id: Uuid::new_v4().to_string(),
            content: last.to_string(),
            context,
            id: Uuid::new_v4().to_string(),
            parent_id: ROOT_PARENT_ID.to_string(),
        },
        mode: CHAT_MODE.to_string(),
        model: model.to_string(),
        metadata: ThreadMetadata::default(),
    }
}
