use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use netarch_core::{ConversationId, Module, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Conversations kept per user and module.
pub const HISTORY_LIMIT: usize = 10;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, module, title, content, solution, created_at FROM conversations";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: ConversationId,
    pub user_id: UserId,
    pub module: Module,
    pub title: String,
    pub content: String,
    /// Reference solution; only task conversations carry one.
    pub solution: Option<String>,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct NewConversation {
    pub user_id: UserId,
    pub module: Module,
    pub title: String,
    pub content: String,
    pub solution: Option<String>,
}

/// Conversation store over the `conversations` table.
pub struct ConversationRepo {
    db: Database,
}

impl ConversationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new row. Never deduplicates.
    #[instrument(skip(self, new), fields(user_id = new.user_id.get(), module = %new.module))]
    pub fn append(&self, new: &NewConversation) -> Result<ConversationRow, StoreError> {
        let now = row_helpers::now_timestamp();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (user_id, module, title, content, solution, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.user_id.get(),
                    new.module.as_str(),
                    new.title,
                    new.content,
                    new.solution,
                    now,
                ],
            )?;
            let id = ConversationId::new(conn.last_insert_rowid());
            debug!(conversation_id = id.get(), "conversation appended");

            Ok(ConversationRow {
                id,
                user_id: new.user_id,
                module: new.module,
                title: new.title.clone(),
                content: new.content.clone(),
                solution: new.solution.clone(),
                created_at: now,
            })
        })
    }

    /// Up to `limit` conversations, newest first.
    #[instrument(skip(self), fields(user_id = user_id.get(), module = %module))]
    pub fn list_recent(
        &self,
        user_id: UserId,
        module: Module,
        limit: usize,
    ) -> Result<Vec<ConversationRow>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "{SELECT_COLUMNS} WHERE user_id = ?1 AND module = ?2
                 ORDER BY created_at DESC, id DESC LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mut rows = stmt.query(rusqlite::params![user_id.get(), module.as_str(), limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_conversation(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(user_id = user_id.get(), conversation_id = id.get()))]
    pub fn get(&self, user_id: UserId, id: ConversationId) -> Result<ConversationRow, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE id = ?1 AND user_id = ?2");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params![id.get(), user_id.get()])?;
            match rows.next()? {
                Some(row) => row_to_conversation(row),
                None => Err(StoreError::NotFound(format!("conversation {id}"))),
            }
        })
    }

    /// Delete one conversation by primary key. Returns whether a row went away.
    #[instrument(skip(self), fields(user_id = user_id.get(), conversation_id = id.get()))]
    pub fn delete(&self, user_id: UserId, id: ConversationId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id.get(), user_id.get()],
            )?;
            Ok(removed > 0)
        })
    }

    /// Delete every conversation in `module` whose title matches exactly.
    ///
    /// Titles are not unique, so this may remove several rows, or none,
    /// without complaint. Returns the number removed.
    #[instrument(skip(self), fields(user_id = user_id.get(), module = %module))]
    pub fn delete_by_title(
        &self,
        user_id: UserId,
        module: Module,
        title: &str,
    ) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM conversations WHERE user_id = ?1 AND module = ?2 AND title = ?3",
                rusqlite::params![user_id.get(), module.as_str(), title],
            )?;
            if removed > 1 {
                debug!(removed, "delete by title matched several rows");
            }
            Ok(removed)
        })
    }

    /// Record the reference solution for a task conversation.
    #[instrument(skip(self, solution), fields(user_id = user_id.get(), conversation_id = id.get()))]
    pub fn set_solution(
        &self,
        user_id: UserId,
        id: ConversationId,
        solution: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE conversations SET solution = ?1 WHERE id = ?2 AND user_id = ?3",
                rusqlite::params![solution, id.get(), user_id.get()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("conversation {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<ConversationRow, StoreError> {
    let module: String = row_helpers::get(row, 2, "conversations", "module")?;
    Ok(ConversationRow {
        id: ConversationId::new(row_helpers::get(row, 0, "conversations", "id")?),
        user_id: UserId::new(row_helpers::get(row, 1, "conversations", "user_id")?),
        module: row_helpers::parse_enum(&module, "conversations", "module")?,
        title: row_helpers::get(row, 3, "conversations", "title")?,
        content: row_helpers::get(row, 4, "conversations", "content")?,
        solution: row_helpers::get_opt(row, 5, "conversations", "solution")?,
        created_at: row_helpers::get(row, 6, "conversations", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserRepo;

    fn setup() -> (ConversationRepo, UserId, UserId) {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let alice = users.register("alice", "pw1").unwrap();
        let bob = users.register("bob", "pw2").unwrap();
        (ConversationRepo::new(db), alice, bob)
    }

    fn new(user_id: UserId, module: Module, title: &str, content: &str) -> NewConversation {
        NewConversation {
            user_id,
            module,
            title: title.to_string(),
            content: content.to_string(),
            solution: None,
        }
    }

    #[test]
    fn content_round_trips_verbatim() {
        let (repo, alice, _) = setup();
        let content = "## Feedback\n\n```\nrouter ospf 1\n network 10.0.0.0 0.0.0.255 area 0\n```\n";
        let row = repo
            .append(&new(alice, Module::Diagnosis, "[10:05] OSPF neighbor", content))
            .unwrap();

        let listed = repo.list_recent(alice, Module::Diagnosis, HISTORY_LIMIT).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], row);
        assert_eq!(listed[0].content, content);
        assert_eq!(listed[0].solution, None);
    }

    #[test]
    fn eleventh_append_leaves_ten_newest_first() {
        let (repo, alice, _) = setup();
        for i in 0..11 {
            repo.append(&new(alice, Module::Task, &format!("task {i}"), "body")).unwrap();
        }

        let listed = repo.list_recent(alice, Module::Task, HISTORY_LIMIT).unwrap();
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0].title, "task 10");
        assert_eq!(listed[9].title, "task 1");
        assert!(listed.iter().all(|c| c.title != "task 0"));
    }

    #[test]
    fn list_is_scoped_by_user_and_module() {
        let (repo, alice, bob) = setup();
        repo.append(&new(alice, Module::Inquiry, "mine", "x")).unwrap();
        repo.append(&new(alice, Module::Task, "other module", "x")).unwrap();
        repo.append(&new(bob, Module::Inquiry, "bob's", "x")).unwrap();

        let listed = repo.list_recent(alice, Module::Inquiry, HISTORY_LIMIT).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "mine");
    }

    #[test]
    fn delete_by_title_removes_every_match() {
        let (repo, alice, _) = setup();
        repo.append(&new(alice, Module::Diagnosis, "[09:00] NAT", "first")).unwrap();
        repo.append(&new(alice, Module::Diagnosis, "[09:00] NAT", "second")).unwrap();
        repo.append(&new(alice, Module::Diagnosis, "[09:01] ACL", "third")).unwrap();

        assert_eq!(repo.delete_by_title(alice, Module::Diagnosis, "[09:00] NAT").unwrap(), 2);
        assert_eq!(repo.delete_by_title(alice, Module::Diagnosis, "missing").unwrap(), 0);

        let listed = repo.list_recent(alice, Module::Diagnosis, HISTORY_LIMIT).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "third");
    }

    #[test]
    fn delete_by_id_removes_exactly_one() {
        let (repo, alice, bob) = setup();
        let first = repo.append(&new(alice, Module::Diagnosis, "dup", "first")).unwrap();
        repo.append(&new(alice, Module::Diagnosis, "dup", "second")).unwrap();

        assert!(!repo.delete(bob, first.id).unwrap(), "other users cannot delete");
        assert!(repo.delete(alice, first.id).unwrap());
        assert!(!repo.delete(alice, first.id).unwrap());

        let listed = repo.list_recent(alice, Module::Diagnosis, HISTORY_LIMIT).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "second");
    }

    #[test]
    fn set_solution_persists() {
        let (repo, alice, bob) = setup();
        let task = repo.append(&new(alice, Module::Task, "[11:00] VLAN", "build it")).unwrap();

        repo.set_solution(alice, task.id, "vlan 10\n name SALES").unwrap();
        let stored = repo.get(alice, task.id).unwrap();
        assert_eq!(stored.solution.as_deref(), Some("vlan 10\n name SALES"));

        assert!(matches!(
            repo.set_solution(bob, task.id, "nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn append_requires_existing_user() {
        let (repo, _, _) = setup();
        let err = repo.append(&new(UserId::new(404), Module::Task, "t", "c")).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
