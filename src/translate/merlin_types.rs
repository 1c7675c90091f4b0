//! Type definitions for the Merlin thread API.
//!
//! Covers both directions: the request body we POST to the unified thread
//! endpoint, and the per-frame JSON payloads it streams back.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what we send TO the upstream)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ThreadRequest {
    pub attachments: Vec<serde_json::Value>,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub language: String,
    pub message: ThreadMessage,
    pub mode: String,
    pub model: String,
    pub metadata: ThreadMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadMessage {
    #[serde(rename = "childId")]
    pub child_id: String,
    pub content: String,
    /// Prior conversation turns flattened to `"<role>: <content>"` lines.
    pub context: String,
    pub id: String,
    #[serde(rename = "parentId")]
    pub parent_id: String,
}

/// Fixed feature switches sent with every request. Everything unrelated to a
/// plain chat exchange is turned off.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadMetadata {
    #[serde(rename = "noTask")]
    pub no_task: bool,
    #[serde(rename = "isWebpageChat")]
    pub is_webpage_chat: bool,
    #[serde(rename = "deepResearch")]
    pub deep_research: bool,
    #[serde(rename = "webAccess")]
    pub web_access: bool,
    #[serde(rename = "proFinderMode")]
    pub pro_finder_mode: bool,
    #[serde(rename = "mcpConfig")]
    pub mcp_config: McpConfig,
    #[serde(rename = "merlinMagic")]
    pub merlin_magic: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct McpConfig {
    #[serde(rename = "isEnabled")]
    pub is_enabled: bool,
}

impl Default for ThreadMetadata {
    fn default() -> Self {
        Self {
            no_task: true,
            is_webpage_chat: false,
            deep_research: false,
            web_access: true,
            pro_finder_mode: false,
            mcp_config: McpConfig { is_enabled: false },
            merlin_magic: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Streamed event payloads (what the upstream sends BACK)
// ---------------------------------------------------------------------------

/// JSON payload of one SSE frame. The upstream emits many shapes; only the
/// `data` envelope with a textual delta matters to the translation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub data: Option<EventData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl EventPayload {
    /// Extract the textual delta, if any, applying the upstream quirks:
    /// `text` wins over `content`, only `type == "text"` payloads carry
    /// content, and a lone space is a keep-alive artifact, not content.
    pub fn text_delta(&self) -> Option<&str> {
        let data = self.data.as_ref()?;
        if data.kind.as_deref() != Some("text") {
            return None;
        }
        let delta = match data.text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => data.content.as_deref().filter(|c| !c.is_empty())?,
        };
        if delta == " " {
            return None;
        }
        Some(delta)
    }
}
