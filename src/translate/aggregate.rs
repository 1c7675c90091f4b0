//! Aggregating mode: fold a whole upstream exchange into one response object.
//!
//! Frames are parsed incrementally as chunks arrive, but nothing is emitted
//! until the stream ends; the assembled content is citation-stripped once and
//! wrapped in a single `chat.completion` object.

use super::citations::strip_citations;
use super::frames::FrameParser;
use super::merlin_types::EventPayload;
use super::openai_types::ChatCompletionResponse;
use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Accumulates message-frame deltas across transport chunks.
///
/// Pure with respect to I/O: feed it bytes, then call
/// [`finish`](Self::finish). One aggregator per upstream exchange.
#[derive(Debug, Default)]
pub struct Aggregator {
    parser: FrameParser,
    content: String,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one transport chunk, folding in every message delta it
    /// completes. Frames of other event types and frames whose payload is not
    /// valid JSON are dropped; the upstream emits both routinely.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        self.parser.push_bytes(chunk);
        while let Some(frame) = self.parser.next_frame() {
            if frame.event != "message" {
                continue;
            }
            let Ok(payload) = serde_json::from_str::<EventPayload>(&frame.data) else {
                continue;
            };
            if let Some(delta) = payload.text_delta() {
                self.content.push_str(delta);
            }
        }
    }

    /// Close the aggregation: strip citation markers from the assembled
    /// content and wrap it in a complete response for `model`.
    pub fn finish(self, model: &str) -> ChatCompletionResponse {
        ChatCompletionResponse::aggregated(model, strip_citations(&self.content))
    }
}

/// Drive an [`Aggregator`] over an upstream byte stream to completion.
///
/// A transport error aborts the whole translation; per-frame JSON errors do
/// not. The upstream connection is released when `byte_stream` drops, on
/// every exit path.
pub async fn aggregate_stream<E>(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, E>>,
    model: &str,
    logger: &SharedLogger,
) -> Result<ChatCompletionResponse>
where
    E: std::fmt::Display,
{
    let mut aggregator = Aggregator::new();

    tokio::pin!(byte_stream);
    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(|e| {
            logger.error("aggregate", format!("Upstream read failed: {e}"));
            ProxyError::upstream(format!("Upstream read failed: {e}"))
        })?;
        aggregator.push_bytes(&chunk);
    }

    Ok(aggregator.finish(model))
}
