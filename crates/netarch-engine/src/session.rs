//! Per-session state: who is signed in, which module is open, and what each
//! module is showing.
//!
//! A [`SessionContext`] is owned by whoever drives the session and passed
//! explicitly into every controller call. Nothing here touches the store or
//! the completion service.

use std::collections::HashSet;

use serde::Serialize;

use netarch_core::{ConversationId, Module, UserId};
use netarch_store::{ConversationRow, HISTORY_LIMIT};

use crate::error::EngineError;

/// Tasks that can be scored in one week.
pub const PROGRESS_MAX: u8 = 10;

/// Characters of a title shown in the history sidebar before it is elided.
const SIDEBAR_TITLE_CHARS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedInUser {
    pub id: UserId,
    pub username: String,
}

/// One past conversation as held in the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: ConversationId,
    pub title: String,
    pub content: String,
    pub solution: Option<String>,
    pub created_at: String,
}

impl HistoryEntry {
    /// Title shortened for the sidebar.
    pub fn short_title(&self) -> String {
        if self.title.chars().count() > SIDEBAR_TITLE_CHARS {
            let head: String = self.title.chars().take(SIDEBAR_TITLE_CHARS).collect();
            format!("{head}..")
        } else {
            self.title.clone()
        }
    }
}

impl From<ConversationRow> for HistoryEntry {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            solution: row.solution,
            created_at: row.created_at,
        }
    }
}

/// Bounded history, oldest first and newest last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryList {
    entries: Vec<HistoryEntry>,
}

impl HistoryList {
    /// Build from store rows, which arrive newest first.
    pub fn from_newest_first(rows: Vec<ConversationRow>) -> Self {
        let mut entries: Vec<HistoryEntry> = rows.into_iter().map(HistoryEntry::from).collect();
        entries.reverse();
        if entries.len() > HISTORY_LIMIT {
            entries.drain(..entries.len() - HISTORY_LIMIT);
        }
        Self { entries }
    }

    /// Append, dropping the oldest entry when the list is full.
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        self.entries.push(entry);
        if self.entries.len() > HISTORY_LIMIT {
            Some(self.entries.remove(0))
        } else {
            None
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<HistoryEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut HistoryEntry> {
        self.entries.get_mut(index)
    }

    pub fn find_mut(&mut self, id: ConversationId) -> Option<&mut HistoryEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

/// The freshly generated content a module is showing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scratch {
    /// Row the content was saved as.
    pub id: ConversationId,
    pub text: String,
    /// Task module only.
    pub solution: Option<String>,
    pub answer_shown: bool,
}

impl Scratch {
    pub fn new(id: ConversationId, text: String) -> Self {
        Self { id, text, solution: None, answer_shown: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Generating,
    Live,
    ViewingHistory(usize),
}

#[derive(Clone, Debug, Default)]
pub struct ModuleState {
    pub history: HistoryList,
    /// `None` means the live content is showing.
    pub active: Option<usize>,
    pub scratch: Option<Scratch>,
    pub generating: bool,
    /// Inline error from the last failed generation.
    pub error: Option<String>,
}

impl ModuleState {
    pub fn phase(&self) -> Phase {
        if self.generating {
            Phase::Generating
        } else if let Some(index) = self.active {
            Phase::ViewingHistory(index)
        } else if self.scratch.is_some() {
            Phase::Live
        } else {
            Phase::Idle
        }
    }

    pub fn active_entry(&self) -> Option<&HistoryEntry> {
        self.active.and_then(|i| self.history.get(i))
    }

    /// Record a solution on every copy of the conversation this module holds.
    pub fn cache_solution(&mut self, id: ConversationId, solution: &str) {
        if let Some(entry) = self.history.find_mut(id) {
            entry.solution = Some(solution.to_string());
        }
        if let Some(scratch) = self.scratch.as_mut().filter(|s| s.id == id) {
            scratch.solution = Some(solution.to_string());
        }
    }

    /// Drop entry `index`, keeping `active` pointed at the same entry.
    fn remove_entry(&mut self, index: usize) -> Option<HistoryEntry> {
        let removed = self.history.remove(index)?;
        self.active = match self.active {
            Some(a) if a == index => None,
            Some(a) if a > index => Some(a - 1),
            other => other,
        };
        Some(removed)
    }
}

/// Weekly task counter, saturating at [`PROGRESS_MAX`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProgressCounter(u8);

impl ProgressCounter {
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Returns whether the counter moved.
    pub fn increment(&mut self) -> bool {
        if self.0 < PROGRESS_MAX {
            self.0 += 1;
            true
        } else {
            false
        }
    }

    pub fn percent(&self) -> u8 {
        (u16::from(self.0) * 100 / u16::from(PROGRESS_MAX)) as u8
    }
}

#[derive(Clone, Debug)]
pub struct SessionContext {
    user: Option<SignedInUser>,
    current_module: Module,
    modules: [ModuleState; 3],
    delete_mode: Option<Module>,
    progress: ProgressCounter,
    scored_tasks: HashSet<ConversationId>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            user: None,
            current_module: Module::Diagnosis,
            modules: Default::default(),
            delete_mode: None,
            progress: ProgressCounter::default(),
            scored_tasks: HashSet::new(),
        }
    }
}

fn slot(module: Module) -> usize {
    match module {
        Module::Diagnosis => 0,
        Module::Task => 1,
        Module::Inquiry => 2,
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&SignedInUser> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&SignedInUser, EngineError> {
        self.user.as_ref().ok_or(EngineError::NotSignedIn)
    }

    /// Forget everything, including who is signed in.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Start a fresh signed-in session with the given histories.
    pub fn begin(&mut self, user: SignedInUser, histories: [HistoryList; 3]) {
        self.reset();
        self.user = Some(user);
        for (state, history) in self.modules.iter_mut().zip(histories) {
            state.history = history;
        }
    }

    pub fn current_module(&self) -> Module {
        self.current_module
    }

    pub fn select_module(&mut self, module: Module) {
        self.current_module = module;
    }

    pub fn module(&self, module: Module) -> &ModuleState {
        &self.modules[slot(module)]
    }

    pub fn module_mut(&mut self, module: Module) -> &mut ModuleState {
        &mut self.modules[slot(module)]
    }

    pub fn phase(&self, module: Module) -> Phase {
        self.module(module).phase()
    }

    /// Show a past entry instead of the live content.
    pub fn view_history(&mut self, module: Module, index: usize) -> Result<(), EngineError> {
        let state = self.module_mut(module);
        if state.history.get(index).is_none() {
            return Err(EngineError::InvalidHistoryIndex { module, index });
        }
        state.active = Some(index);
        Ok(())
    }

    /// Back to a blank form: no active entry, no live content, no error.
    pub fn new_conversation(&mut self, module: Module) {
        let state = self.module_mut(module);
        state.active = None;
        state.scratch = None;
        state.error = None;
    }

    /// Flip delete mode, scoping it to the module currently open.
    /// Returns whether delete mode is now on.
    pub fn toggle_delete_mode(&mut self) -> bool {
        self.delete_mode = match self.delete_mode {
            Some(_) => None,
            None => Some(self.current_module),
        };
        self.delete_mode.is_some()
    }

    pub fn delete_mode(&self) -> Option<Module> {
        self.delete_mode
    }

    pub fn deletion_enabled(&self, module: Module) -> bool {
        self.delete_mode == Some(module)
    }

    /// Remove a history entry from the session only. Callers delete the row.
    pub(crate) fn remove_history(&mut self, module: Module, index: usize) -> Result<HistoryEntry, EngineError> {
        self.module_mut(module)
            .remove_entry(index)
            .ok_or(EngineError::InvalidHistoryIndex { module, index })
    }

    pub fn progress(&self) -> ProgressCounter {
        self.progress
    }

    /// Credit a task once. Returns whether this call scored it.
    pub fn record_score(&mut self, task: ConversationId) -> bool {
        if !self.scored_tasks.insert(task) {
            return false;
        }
        self.progress.increment();
        true
    }

    pub fn is_scored(&self, task: ConversationId) -> bool {
        self.scored_tasks.contains(&task)
    }

    /// Render snapshot. Pure read; calling it any number of times changes nothing.
    pub fn view(&self) -> SessionView {
        SessionView {
            username: self.user.as_ref().map(|u| u.username.clone()),
            current_module: self.current_module,
            delete_mode: self.delete_mode,
            progress: self.progress.value(),
            progress_percent: self.progress.percent(),
            modules: Module::ALL.iter().map(|m| self.module_view(*m)).collect(),
        }
    }

    fn module_view(&self, module: Module) -> ModuleView {
        let state = self.module(module);
        let (content, solution) = match (state.active_entry(), &state.scratch) {
            (Some(entry), _) => (Some(entry.content.clone()), entry.solution.clone()),
            (None, Some(scratch)) => (
                Some(scratch.text.clone()),
                scratch.solution.clone().filter(|_| scratch.answer_shown),
            ),
            (None, None) => (None, None),
        };
        let can_reveal = module == Module::Task && (state.active_entry().is_some() || state.scratch.is_some());

        ModuleView {
            module,
            label: module.label(),
            phase: state.phase(),
            history: state
                .history
                .iter()
                .enumerate()
                .map(|(index, entry)| HistoryItemView {
                    index,
                    id: entry.id,
                    title: entry.title.clone(),
                    short_title: entry.short_title(),
                    has_solution: entry.solution.is_some(),
                })
                .collect(),
            deletable: self.deletion_enabled(module),
            content,
            solution,
            can_reveal,
            error: state.error.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub username: Option<String>,
    pub current_module: Module,
    pub delete_mode: Option<Module>,
    pub progress: u8,
    pub progress_percent: u8,
    pub modules: Vec<ModuleView>,
}

impl SessionView {
    pub fn module(&self, module: Module) -> Option<&ModuleView> {
        self.modules.iter().find(|m| m.module == module)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleView {
    pub module: Module,
    pub label: &'static str,
    pub phase: Phase,
    pub history: Vec<HistoryItemView>,
    pub deletable: bool,
    pub content: Option<String>,
    pub solution: Option<String>,
    pub can_reveal: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItemView {
    pub index: usize,
    pub id: ConversationId,
    pub title: String,
    pub short_title: String,
    pub has_solution: bool,
}
