use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Future, Stream};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, instrument};

use netarch_core::{CompletionError, CompletionProvider, CompletionRequest, TextStream};

use crate::sse::{self, ChunkEvent};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection details for an OpenAI-compatible endpoint.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub api_key: SecretString,
    /// Base URL ending in `/v1`, without a trailing slash.
    pub base_url: String,
    pub model: String,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(api_key: SecretString, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Streams `POST {base_url}/chat/completions` responses as text chunks.
pub struct OpenAiCompatProvider {
    client: Client,
    config: ProviderConfig,
    endpoint: String,
}

impl OpenAiCompatProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| CompletionError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self { client, config, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": request.messages,
            "stream": true,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream, CompletionError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .header("accept", "text/event-stream")
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(self.config.connect_timeout)
                } else {
                    CompletionError::NetworkError(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::from_status(status, body));
        }

        debug!("completion stream opened");
        Ok(Box::pin(SseStream::new(resp.bytes_stream(), self.config.idle_timeout)))
    }
}

/// Turns a raw byte stream into text chunks.
/// Ends after `[DONE]`, after the first error, or when the body closes.
/// If no bytes arrive within the idle window the stream yields `Timeout`.
struct SseStream<E> {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    buffer: BytesMut,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    inner_done: bool,
    finished: bool,
}

impl<E: std::fmt::Display> SseStream<E> {
    fn new(byte_stream: impl Stream<Item = Result<Bytes, E>> + Send + 'static, idle_timeout: Duration) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: BytesMut::with_capacity(8192),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            inner_done: false,
            finished: false,
        }
    }

    /// Body closed: emit whatever is left, then finish.
    fn drain_tail(&mut self) -> Option<Result<String, CompletionError>> {
        let item = self.next_buffered(true);
        if item.is_none() {
            self.finished = true;
        }
        item
    }

    /// Pop complete lines off the buffer until one produces an item.
    fn next_buffered(&mut self, flush: bool) -> Option<Result<String, CompletionError>> {
        loop {
            let line = match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => self.buffer.split_to(pos + 1),
                None if flush && !self.buffer.is_empty() => self.buffer.split(),
                None => return None,
            };
            let Ok(line) = std::str::from_utf8(&line) else {
                continue;
            };
            let Some(data) = sse::extract_data(line) else {
                continue;
            };
            match sse::parse_chunk(data) {
                ChunkEvent::Text(text) => return Some(Ok(text)),
                ChunkEvent::Skip => continue,
                ChunkEvent::Done => {
                    self.finished = true;
                    return None;
                }
                ChunkEvent::Failed(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<E: std::fmt::Display> Stream for SseStream<E> {
    type Item = Result<String, CompletionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }
        if this.inner_done {
            return Poll::Ready(this.drain_tail());
        }
        if let Some(item) = this.next_buffered(false) {
            return Poll::Ready(Some(item));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let deadline = tokio::time::Instant::now() + this.idle_duration;
                    this.idle_deadline.as_mut().reset(deadline);
                    this.buffer.extend_from_slice(&bytes);

                    if let Some(item) = this.next_buffered(false) {
                        return Poll::Ready(Some(item));
                    }
                    if this.finished {
                        return Poll::Ready(None);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(CompletionError::StreamInterrupted(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.inner_done = true;
                    return Poll::Ready(this.drain_tail());
                }
                Poll::Pending => {
                    if this.idle_deadline.as_mut().poll(cx).is_ready() {
                        this.finished = true;
                        return Poll::Ready(Some(Err(CompletionError::Timeout(this.idle_duration))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
