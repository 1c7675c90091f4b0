use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;
use crate::token::TokenProvider;
use crate::translate::aggregate::aggregate_stream;
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::translate::relay::relay_stream;
use crate::translate::request::to_thread_request;

use futures::Stream;
use std::pin::Pin;

/// Outcome of proxying a streaming request: SSE data payloads ready to send,
/// ending with the `[DONE]` sentinel.
pub type RelayStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Forward a request upstream and aggregate the whole answer into one
/// response object.
pub async fn proxy_non_streaming(
    req: &ChatCompletionRequest,
    model: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
    tokens: &dyn TokenProvider,
    logger: &SharedLogger,
) -> Result<ChatCompletionResponse> {
    let response = open_upstream(req, model, config, client, tokens, logger).await?;

    let result = aggregate_stream(response.bytes_stream(), model, logger).await?;

    logger.info(
        "proxy",
        format!(
            "Completed: content_len={}",
            result.choices[0].message.content.len()
        ),
    );

    Ok(result)
}

/// Forward a request upstream and relay the answer as it streams in.
///
/// Failures before the upstream responds surface as an error here, while the
/// downstream response is still uncommitted. Failures after that point are
/// handled inside the relay stream itself.
pub async fn proxy_streaming(
    req: &ChatCompletionRequest,
    model: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
    tokens: &dyn TokenProvider,
    logger: &SharedLogger,
) -> Result<RelayStream> {
    let response = open_upstream(req, model, config, client, tokens, logger).await?;

    let stream = relay_stream(
        response.bytes_stream(),
        model.to_string(),
        logger.clone(),
    );

    Ok(Box::pin(stream))
}

/// POST the translated request and hand back the upstream response, verified
/// to be a success status.
async fn open_upstream(
    req: &ChatCompletionRequest,
    model: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
    tokens: &dyn TokenProvider,
    logger: &SharedLogger,
) -> Result<reqwest::Response> {
    let token = tokens.fetch_token(client).await?;
    let thread_req = to_thread_request(&req.messages, model);

    logger.info(
        "proxy",
        format!("POST {} model={}", config.upstream.api_url, model),
    );

    let response = client
        .post(&config.upstream.api_url)
        .header("Content-Type", "application/json")
        .header("Accept", "text/event-stream")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-Merlin-Version", "web-merlin")
        .header("User-Agent", config.upstream.effective_user_agent())
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Origin", "https://www.getmerlin.in")
        .header("Sec-Fetch-Site", "same-origin")
        .header("Sec-Fetch-Mode", "cors")
        .header("Sec-Fetch-Dest", "empty")
        .header("Referer", "https://www.getmerlin.in/chat")
        .json(&thread_req)
        .send()
        .await
        .map_err(|e| ProxyError::upstream(format!("Request failed: {e}")))?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        logger.warn(
            "proxy",
            format!("Upstream error status={}: {}", status, truncate(&body, 300)),
        );
        return Err(ProxyError::upstream(format!(
            "Upstream returned status {}: {}",
            status,
            truncate(&body, 500)
        )));
    }

    Ok(response)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
