use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use netarch_core::{CompletionError, CompletionProvider, CompletionRequest, TextStream};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield each chunk in order, then end.
    Chunks(Vec<String>),
    /// Return an error from the `stream()` call itself.
    Error(CompletionError),
    /// Yield the chunks, then fail mid-stream.
    FailAfter(Vec<String>, CompletionError),
    /// Never yields anything. Useful for exercising cancellation.
    Hang,
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A single-chunk response.
    pub fn text(text: &str) -> Self {
        Self::Chunks(vec![text.to_string()])
    }

    pub fn chunks(parts: &[&str]) -> Self {
        Self::Chunks(parts.iter().map(|p| (*p).to_string()).collect())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that hands out responses in the order they were queued
/// and records every request it receives.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream, CompletionError> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };
        let Some(response) = self.responses.lock().pop_front() else {
            return Err(CompletionError::InvalidRequest(format!(
                "MockProvider: no response configured for call {call}"
            )));
        };
        resolve_response(response).await
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: MockResponse) -> Result<TextStream, CompletionError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Chunks(parts) => {
                return Ok(Box::pin(stream::iter(parts.into_iter().map(Ok::<String, CompletionError>))));
            }
            MockResponse::FailAfter(parts, err) => {
                let items = parts.into_iter().map(Ok::<String, CompletionError>).chain(std::iter::once(Err(err)));
                return Ok(Box::pin(stream::iter(items)));
            }
            MockResponse::Hang => {
                return Ok(Box::pin(stream::pending::<Result<String, CompletionError>>()));
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netarch_core::ChatMessage;
    use tokio_stream::StreamExt;

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn chunks_in_order() {
        let mock = MockProvider::new(vec![MockResponse::chunks(&["a", "b", "c"])]);
        let stream = mock.stream(&request()).await.unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())]);
    }

    #[tokio::test]
    async fn error_response() {
        let mock = MockProvider::new(vec![MockResponse::Error(
            CompletionError::AuthenticationFailed("bad".into()),
        )]);
        let result = mock.stream(&request()).await;
        assert!(matches!(result, Err(CompletionError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn fail_after_yields_partial_then_error() {
        let mock = MockProvider::new(vec![MockResponse::FailAfter(
            vec!["partial".into()],
            CompletionError::StreamInterrupted("reset".into()),
        )]);
        let items: Vec<_> = mock.stream(&request()).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("partial".to_string()));
        assert!(matches!(items[1], Err(CompletionError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn sequential_responses_and_recording() {
        let mock = MockProvider::new(vec![MockResponse::text("first"), MockResponse::text("second")]);

        let _ = mock.stream(&request()).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        let _ = mock.stream(&request()).await.unwrap();
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.last_request().unwrap().user_prompt(), Some("hi"));
    }

    #[tokio::test]
    async fn exhausted_responses() {
        let mock = MockProvider::new(vec![MockResponse::text("only one")]);
        let _ = mock.stream(&request()).await;
        let result = mock.stream(&request()).await;
        assert!(matches!(result, Err(CompletionError::InvalidRequest(_))));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response() {
        let mock = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_millis(50),
            MockResponse::text("after delay"),
        )]);

        let start = tokio::time::Instant::now();
        let items: Vec<_> = mock.stream(&request()).await.unwrap().collect().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(items, vec![Ok("after delay".to_string())]);
    }

    #[test]
    fn provider_properties() {
        let mock = MockProvider::new(vec![]);
        assert_eq!(mock.name(), "mock");
        assert_eq!(mock.model(), "mock-model");
    }
}
