//! HTTP surface for the tutor: one JSON RPC endpoint plus a health check.

pub mod handlers;
pub mod rpc;
pub mod server;
pub mod sessions;

pub use handlers::HandlerState;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle, SESSION_HEADER};
pub use sessions::SessionRegistry;
