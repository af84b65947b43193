use std::future::Future;

use chrono::{DateTime, Local};
use tracing::{debug, info, instrument, warn};

use netarch_core::{CompletionError, Module, TextStream};
use netarch_llm::{drain, CompletionClient, StreamControl};
use netarch_store::{ConversationRepo, Database, NewConversation, UserRepo};

use crate::error::EngineError;
use crate::session::{HistoryEntry, ModuleState, Scratch, SessionContext};

/// Drives the three tutoring workflows against a [`SessionContext`].
///
/// Holds no per-session state of its own, so one instance serves every
/// session.
pub struct Tutor {
    pub(crate) users: UserRepo,
    pub(crate) conversations: ConversationRepo,
    pub(crate) client: CompletionClient,
}

impl Tutor {
    pub fn new(db: Database, client: CompletionClient) -> Self {
        Self {
            users: UserRepo::new(db.clone()),
            conversations: ConversationRepo::new(db),
            client,
        }
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    /// Delete a history entry from the session and the store.
    ///
    /// Only allowed while delete mode targets `module`. The row is removed by
    /// primary key, so entries sharing a title are unaffected.
    #[instrument(skip_all, fields(module = %module, index = index))]
    pub fn delete_history(
        &self,
        ctx: &mut SessionContext,
        module: Module,
        index: usize,
    ) -> Result<HistoryEntry, EngineError> {
        let user_id = ctx.require_user()?.id;
        if !ctx.deletion_enabled(module) {
            return Err(EngineError::DeleteModeInactive(module));
        }
        let id = ctx
            .module(module)
            .history
            .get(index)
            .map(|e| e.id)
            .ok_or(EngineError::InvalidHistoryIndex { module, index })?;

        if !self.conversations.delete(user_id, id)? {
            debug!(conversation_id = id.get(), "row already gone, removing from session only");
        }
        let removed = ctx.remove_history(module, index)?;
        info!(conversation_id = id.get(), "history entry deleted");
        Ok(removed)
    }

    /// Drain a completion for `module`, keeping its phase and inline error
    /// in step. Cancellation leaves the module as it was.
    pub(crate) async fn run_completion<F>(
        &self,
        ctx: &mut SessionContext,
        module: Module,
        control: &StreamControl,
        request: F,
    ) -> Result<String, EngineError>
    where
        F: Future<Output = Result<TextStream, CompletionError>>,
    {
        let guard = GeneratingGuard::start(ctx.module_mut(module));
        let result = match request.await {
            Ok(stream) => drain(stream, control).await,
            Err(e) => Err(e),
        };
        drop(guard);

        let state = ctx.module_mut(module);
        match result {
            Ok(text) => Ok(text),
            Err(CompletionError::Cancelled) => {
                info!(module = %module, "generation cancelled");
                Err(EngineError::Completion(CompletionError::Cancelled))
            }
            Err(e) => {
                warn!(module = %module, error = %e, kind = e.error_kind(), "generation failed");
                state.error = Some(e.user_message());
                Err(e.into())
            }
        }
    }

    /// Persist freshly generated content, then make it the module's live view.
    ///
    /// The session is only touched once the row exists, so a failed write
    /// leaves the module unchanged.
    pub(crate) fn record(
        &self,
        ctx: &mut SessionContext,
        module: Module,
        title: String,
        content: String,
    ) -> Result<HistoryEntry, EngineError> {
        let user_id = ctx.require_user()?.id;
        let row = self.conversations.append(&NewConversation {
            user_id,
            module,
            title,
            content,
            solution: None,
        })?;
        let entry = HistoryEntry::from(row);

        let state = ctx.module_mut(module);
        if let Some(evicted) = state.history.push(entry.clone()) {
            debug!(conversation_id = evicted.id.get(), "oldest history entry evicted from session");
        }
        state.scratch = Some(Scratch::new(entry.id, entry.content.clone()));
        state.active = None;
        state.error = None;
        Ok(entry)
    }
}

/// `[HH:MM] subject`, the title every generated entry is saved under.
pub fn entry_title(subject: &str, at: DateTime<Local>) -> String {
    format!("[{}] {}", at.format("%H:%M"), subject.trim())
}

pub(crate) fn required<'a>(value: &'a str, message: &'static str) -> Result<&'a str, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(EngineError::MissingInput(message))
    } else {
        Ok(trimmed)
    }
}

/// Marks a module as generating for as long as it lives. Dropping the
/// controller future mid-stream still clears the flag.
struct GeneratingGuard<'a> {
    state: &'a mut ModuleState,
}

impl<'a> GeneratingGuard<'a> {
    fn start(state: &'a mut ModuleState) -> Self {
        state.generating = true;
        Self { state }
    }
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.state.generating = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn title_format() {
        let at = Local.with_ymd_and_hms(2026, 10, 19, 9, 5, 0).unwrap();
        assert_eq!(entry_title("  OSPF neighbor ", at), "[09:05] OSPF neighbor");
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("  x ", "m").unwrap(), "x");
        assert!(matches!(required(" \n", "need it"), Err(EngineError::MissingInput("need it"))));
    }
}
