//! Concept inquiry: an analogy plus one probing question.

use chrono::Local;
use tracing::{info, instrument};

use netarch_core::Module;
use netarch_llm::StreamControl;

use crate::error::EngineError;
use crate::session::{HistoryEntry, SessionContext};
use crate::tutor::{entry_title, required, Tutor};

impl Tutor {
    #[instrument(skip_all, fields(concept = %concept))]
    pub async fn ask(
        &self,
        ctx: &mut SessionContext,
        concept: &str,
        control: &StreamControl,
    ) -> Result<HistoryEntry, EngineError> {
        ctx.require_user()?;
        let concept = required(concept, "Enter a networking concept to explore.")?;

        let answer = self
            .run_completion(ctx, Module::Inquiry, control, self.client.socratic_quiz(concept))
            .await?;

        let entry = self.record(ctx, Module::Inquiry, entry_title(concept, Local::now()), answer)?;
        info!(conversation_id = entry.id.get(), "inquiry recorded");
        Ok(entry)
    }
}
