//! Task workshop: generated practice labs and their reference answers.

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use netarch_core::{MasteryLevel, Module};
use netarch_llm::StreamControl;

use crate::error::EngineError;
use crate::session::{HistoryEntry, SessionContext};
use crate::tutor::{entry_title, required, Tutor};

#[derive(Clone, Debug, Deserialize)]
pub struct TaskRequest {
    /// Today's learning focus, e.g. "OSPF DR/BDR election".
    pub topic: String,
    #[serde(default)]
    pub mastery: MasteryLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedSolution {
    pub solution: String,
    /// False when a cached solution was reused.
    pub generated: bool,
    /// Whether this reveal moved the progress counter.
    pub scored: bool,
}

impl Tutor {
    #[instrument(skip_all, fields(topic = %request.topic, mastery = %request.mastery))]
    pub async fn generate_task(
        &self,
        ctx: &mut SessionContext,
        request: &TaskRequest,
        control: &StreamControl,
    ) -> Result<HistoryEntry, EngineError> {
        ctx.require_user()?;
        let topic = required(&request.topic, "Enter today's learning focus.")?;

        let task = self
            .run_completion(
                ctx,
                Module::Task,
                control,
                self.client.generate_task(topic, request.mastery),
            )
            .await?;

        let entry = self.record(ctx, Module::Task, entry_title(topic, Local::now()), task)?;
        info!(conversation_id = entry.id.get(), "task recorded");
        Ok(entry)
    }

    /// Show the reference answer for the task on screen.
    ///
    /// Targets the history entry being viewed, or the live task otherwise.
    /// A cached solution is reused; a new one is cached in the session and
    /// written to the store on a best-effort basis. Each task scores once.
    #[instrument(skip_all)]
    pub async fn reveal_solution(
        &self,
        ctx: &mut SessionContext,
        control: &StreamControl,
    ) -> Result<RevealedSolution, EngineError> {
        let user_id = ctx.require_user()?.id;
        let state = ctx.module(Module::Task);
        let (task_id, task_text, cached) = match (state.active_entry(), &state.scratch) {
            (Some(entry), _) => (entry.id, entry.content.clone(), entry.solution.clone()),
            (None, Some(live)) => (live.id, live.text.clone(), live.solution.clone()),
            (None, None) => return Err(EngineError::NothingToReveal),
        };

        let (solution, generated) = match cached {
            Some(solution) => (solution, false),
            None => {
                let solution = self
                    .run_completion(
                        ctx,
                        Module::Task,
                        control,
                        self.client.generate_solution(&task_text),
                    )
                    .await?;
                if let Err(e) = self.conversations.set_solution(user_id, task_id, &solution) {
                    warn!(conversation_id = task_id.get(), error = %e, "failed to persist task solution");
                }
                (solution, true)
            }
        };

        let state = ctx.module_mut(Module::Task);
        state.cache_solution(task_id, &solution);
        if let Some(live) = state.scratch.as_mut().filter(|s| s.id == task_id) {
            live.answer_shown = true;
        }
        let scored = ctx.record_score(task_id);
        info!(conversation_id = task_id.get(), generated, scored, "solution revealed");

        Ok(RevealedSolution { solution, generated, scored })
    }
}
