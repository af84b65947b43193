pub mod conversations;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod users;

pub use conversations::{ConversationRepo, ConversationRow, NewConversation, HISTORY_LIMIT};
pub use database::Database;
pub use error::StoreError;
pub use users::{hash_password, UserRepo, UserRow};
