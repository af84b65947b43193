use std::sync::Arc;

use tracing::{info, instrument};

use netarch_core::{CompletionError, CompletionProvider, CompletionRequest, MasteryLevel, TextStream};

use crate::prompts;

/// The four tutoring calls, built on any [`CompletionProvider`].
///
/// Every call returns the lazily produced chunk stream; nothing is read
/// from the service until the caller polls it.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    diagnose_temperature: f64,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            diagnose_temperature: prompts::DIAGNOSE_TEMPERATURE,
        }
    }

    pub fn with_diagnose_temperature(mut self, temperature: f64) -> Self {
        self.diagnose_temperature = temperature;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Feedback on a broken configuration, judging the student's hypothesis first.
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn diagnose(
        &self,
        code: &str,
        hypothesis: &str,
        topic: &str,
    ) -> Result<TextStream, CompletionError> {
        self.send(prompts::diagnose(code, hypothesis, topic, self.diagnose_temperature))
            .await
    }

    #[instrument(skip_all, fields(topic = %topic, mastery = %mastery))]
    pub async fn generate_task(
        &self,
        topic: &str,
        mastery: MasteryLevel,
    ) -> Result<TextStream, CompletionError> {
        self.send(prompts::generate_task(topic, mastery)).await
    }

    #[instrument(skip_all)]
    pub async fn generate_solution(&self, task_content: &str) -> Result<TextStream, CompletionError> {
        self.send(prompts::generate_solution(task_content)).await
    }

    #[instrument(skip_all, fields(concept = %concept))]
    pub async fn socratic_quiz(&self, concept: &str) -> Result<TextStream, CompletionError> {
        self.send(prompts::socratic_quiz(concept)).await
    }

    async fn send(&self, request: CompletionRequest) -> Result<TextStream, CompletionError> {
        info!(provider = self.provider.name(), model = self.provider.model(), "completion requested");
        self.provider.stream(&request).await
    }
}
