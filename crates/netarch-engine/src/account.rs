use tracing::{info, instrument};

use netarch_core::{Module, UserId};
use netarch_store::HISTORY_LIMIT;

use crate::error::EngineError;
use crate::session::{HistoryList, SessionContext, SignedInUser};
use crate::tutor::{required, Tutor};

impl Tutor {
    /// Create an account. Does not sign in.
    #[instrument(skip(self, password))]
    pub fn register(&self, username: &str, password: &str) -> Result<UserId, EngineError> {
        let username = required(username, "Enter a username.")?;
        if password.is_empty() {
            return Err(EngineError::MissingInput("Enter a password."));
        }
        let id = self.users.register(username, password)?;
        info!(user_id = id.get(), "account created");
        Ok(id)
    }

    /// Check credentials and load the user's recent history into a fresh
    /// session. Anything from a previous session is discarded.
    #[instrument(skip(self, ctx, password))]
    pub fn sign_in(
        &self,
        ctx: &mut SessionContext,
        username: &str,
        password: &str,
    ) -> Result<SignedInUser, EngineError> {
        let username = required(username, "Enter a username.")?;
        let id = self
            .users
            .authenticate(username, password)?
            .ok_or(EngineError::InvalidCredentials)?;

        let load = |module: Module| -> Result<HistoryList, EngineError> {
            let rows = self.conversations.list_recent(id, module, HISTORY_LIMIT)?;
            Ok(HistoryList::from_newest_first(rows))
        };
        let histories = [load(Module::Diagnosis)?, load(Module::Task)?, load(Module::Inquiry)?];

        let record = self.users.get(id)?;
        let user = SignedInUser { id, username: record.username };
        ctx.begin(user.clone(), histories);
        info!(user_id = id.get(), "signed in");
        Ok(user)
    }

    pub fn sign_out(&self, ctx: &mut SessionContext) {
        if let Some(user) = ctx.user() {
            info!(user_id = user.id.get(), "signed out");
        }
        ctx.reset();
    }
}
