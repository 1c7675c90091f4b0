//! Relay mode: live translation of the upstream stream into OpenAI chunks.
//!
//! Every message delta is re-emitted as a `chat.completion.chunk` the moment
//! its frame completes; the stream ends with a stop chunk and the `[DONE]`
//! sentinel. Deltas are forwarded verbatim: citation markers can straddle
//! frame boundaries, so stripping them happens only in aggregating mode,
//! where the full text is assembled first.

use super::frames::FrameParser;
use super::merlin_types::EventPayload;
use super::openai_types::ChatCompletionChunk;
use crate::logging::SharedLogger;

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Termination record mandated by the OpenAI streaming protocol.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Translate an upstream byte stream into a stream of SSE data payloads:
/// one serialized chunk per accepted delta, then a stop chunk, then
/// [`DONE_SENTINEL`].
///
/// The generator reads upstream only when the consumer polls, so output order
/// matches frame arrival order and nothing buffers beyond the current frame.
/// Dropping the returned stream drops `byte_stream` with it, releasing the
/// upstream connection even when the client disconnects mid-response.
pub fn relay_stream<E>(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    model: String,
    logger: SharedLogger,
) -> impl Stream<Item = String> + Send + 'static
where
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut parser = FrameParser::new();
        let mut failed = false;

        tokio::pin!(byte_stream);
        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    // The HTTP response is already committed; close the
                    // stream instead of fabricating a clean ending.
                    logger.error("relay", format!("Upstream read failed: {e}"));
                    failed = true;
                    break;
                }
            };

            parser.push_bytes(&chunk);
            while let Some(frame) = parser.next_frame() {
                if frame.event == "message" {
                    let Ok(payload) = serde_json::from_str::<EventPayload>(&frame.data) else {
                        logger.debug("relay", format!("Skipping unparseable payload: {}", frame.data));
                        continue;
                    };
                    if let Some(delta) = payload.text_delta() {
                        if let Ok(json) =
                            serde_json::to_string(&ChatCompletionChunk::delta(&model, delta))
                        {
                            yield json;
                        }
                    }
                } else {
                    // Error and other control events are not surfaced: the
                    // upstream emits them for non-terminal conditions too.
                    logger.warn(
                        "relay",
                        format!("Upstream event '{}': {}", frame.event, frame.data),
                    );
                }
            }
        }

        if !failed {
            if let Ok(json) = serde_json::to_string(&ChatCompletionChunk::stop(&model)) {
                yield json;
            }
            yield DONE_SENTINEL.to_string();
        }

        logger.info("relay", "Stream completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type ChunkResult = std::result::Result<Bytes, std::io::Error>;

    async fn run(chunks: Vec<ChunkResult>) -> Vec<String> {
        let logger = SharedLogger::in_memory();
        relay_stream(stream::iter(chunks), "gemini-2.5-flash".to_string(), logger)
            .collect()
            .await
    }

    fn delta_of(record: &str) -> Option<String> {
        let chunk: ChatCompletionChunk = serde_json::from_str(record).ok()?;
        chunk.choices.first()?.delta.content.clone()
    }

    #[tokio::test]
    async fn test_deltas_then_stop_then_done() {
        let out = run(vec![
            Ok(Bytes::from_static(
                b"event: message\ndata: {\"data\":{\"text\":\"Hel\",\"type\":\"text\"}}\n",
            )),
            Ok(Bytes::from_static(
                b"event: message\ndata: {\"data\":{\"text\":\"lo\",\"type\":\"text\"}}\n",
            )),
        ])
        .await;

        assert_eq!(out.len(), 4);
        assert_eq!(delta_of(&out[0]).as_deref(), Some("Hel"));
        assert_eq!(delta_of(&out[1]).as_deref(), Some("lo"));

        let stop: ChatCompletionChunk = serde_json::from_str(&out[2]).unwrap();
        assert_eq!(stop.choices[0].delta.content, None);
        assert_eq!(stop.choices[0].finish_reason.as_deref(), Some("stop"));

        assert_eq!(out[3], DONE_SENTINEL);
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks_emits_once_complete() {
        let out = run(vec![
            Ok(Bytes::from_static(b"event: message\ndata: {\"data\":{\"te")),
            Ok(Bytes::from_static(b"xt\":\"whole\",\"type\":\"text\"}}\n")),
        ])
        .await;

        assert_eq!(out.len(), 3);
        assert_eq!(delta_of(&out[0]).as_deref(), Some("whole"));
    }

    #[tokio::test]
    async fn test_error_events_are_swallowed() {
        let out = run(vec![Ok(Bytes::from_static(
            b"event: error\ndata: {\"message\":\"quota\"}\nevent: message\ndata: {\"data\":{\"text\":\"ok\",\"type\":\"text\"}}\n",
        ))])
        .await;

        assert_eq!(out.len(), 3);
        assert_eq!(delta_of(&out[0]).as_deref(), Some("ok"));
        assert_eq!(out[2], DONE_SENTINEL);
    }

    #[tokio::test]
    async fn test_invalid_json_payload_skipped() {
        let out = run(vec![Ok(Bytes::from_static(
            b"event: message\ndata: not-json\nevent: message\ndata: {\"data\":{\"text\":\"ok\",\"type\":\"text\"}}\n",
        ))])
        .await;

        assert_eq!(out.len(), 3);
        assert_eq!(delta_of(&out[0]).as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_transport_error_closes_without_stop_chunk() {
        let out = run(vec![
            Ok(Bytes::from_static(
                b"event: message\ndata: {\"data\":{\"text\":\"partial\",\"type\":\"text\"}}\n",
            )),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        ])
        .await;

        // The committed delta is delivered, then the stream just ends:
        // no stop chunk, no sentinel.
        assert_eq!(out.len(), 1);
        assert_eq!(delta_of(&out[0]).as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn test_empty_upstream_still_terminates_cleanly() {
        let out = run(vec![]).await;

        assert_eq!(out.len(), 2);
        let stop: ChatCompletionChunk = serde_json::from_str(&out[0]).unwrap();
        assert_eq!(stop.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(out[1], DONE_SENTINEL);
    }
}
