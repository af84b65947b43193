//! RPC method handlers, one per UI action.

use std::sync::Arc;

use serde_json::json;
use tracing::field::Empty;
use tracing::{Instrument, Span};

use netarch_core::{Module, SessionToken};
use netarch_engine::{
    DiagnosisRequest, SessionContext, TaskRequest, Tutor, DIAGNOSIS_TOPICS,
};
use netarch_llm::StreamControl;
use netarch_store::Database;
use netarch_telemetry::{LogQuery, TelemetryGuard};

use crate::rpc::{self, RpcResponse};
use crate::sessions::{self, SessionHandle, SessionRegistry};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub db: Database,
    pub tutor: Arc<Tutor>,
    pub sessions: Arc<SessionRegistry>,
    pub telemetry: Option<Arc<TelemetryGuard>>,
}

impl HandlerState {
    pub fn new(db: Database, tutor: Arc<Tutor>) -> Self {
        Self {
            db,
            tutor,
            sessions: Arc::new(SessionRegistry::new()),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryGuard>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Dispatch an RPC method to its handler.
///
/// The session token comes from the `x-session-token` header when present,
/// otherwise from a `token` param.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
    header_token: Option<&str>,
) -> RpcResponse {
    let token = header_token
        .or_else(|| rpc::optional_str(params, "token"))
        .map(SessionToken::from_raw);
    let span = tracing::info_span!("rpc", method = %method, session_id = Empty, user_id = Empty);
    if let Some(token) = &token {
        span.record("session_id", sessions::log_id(token).as_str());
    }
    route(state, method, params, id, token).instrument(span).await
}

async fn route(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
    token: Option<SessionToken>,
) -> RpcResponse {
    // Methods that need no session.
    match method {
        "session.open" => return session_open(state, id),
        "system.ping" | "health" => return health(state, id),
        "diagnosis.topics" => return diagnosis_topics(id),
        "auth.register" => return auth_register(state, params, id),
        _ => {}
    }

    let Some(token) = token else {
        return RpcResponse::invalid_params(id, "Missing session token");
    };
    if method == "session.close" {
        let closed = state.sessions.close(&token);
        return RpcResponse::success(id, json!({ "closed": closed }));
    }
    let Some(session) = state.sessions.get(&token) else {
        return RpcResponse::session_not_found(id);
    };

    match method {
        // Cancel must not wait on the session lock the generation holds.
        "generation.cancel" => {
            session.cancel_generation();
            RpcResponse::success(id, json!({ "cancelled": true }))
        }

        "auth.login" => auth_login(state, &session, params, id).await,
        "auth.logout" => auth_logout(state, &session, id).await,

        "view.get" => with_context(&session, id, |_| Ok(json!({}))).await,
        "nav.select" => {
            let module = match module_param(params) {
                Ok(m) => m,
                Err(e) => return RpcResponse::invalid_params(id, e),
            };
            with_context(&session, id, |ctx| {
                ctx.select_module(module);
                Ok(json!({}))
            })
            .await
        }
        "history.view" => {
            let (module, index) = match module_and_index(params) {
                Ok(v) => v,
                Err(e) => return RpcResponse::invalid_params(id, e),
            };
            with_context(&session, id, |ctx| {
                ctx.view_history(module, index)?;
                Ok(json!({}))
            })
            .await
        }
        "history.new" => {
            let module = match module_param(params) {
                Ok(m) => m,
                Err(e) => return RpcResponse::invalid_params(id, e),
            };
            with_context(&session, id, |ctx| {
                ctx.new_conversation(module);
                Ok(json!({}))
            })
            .await
        }
        "history.delete" => {
            let (module, index) = match module_and_index(params) {
                Ok(v) => v,
                Err(e) => return RpcResponse::invalid_params(id, e),
            };
            with_context(&session, id, |ctx| {
                let deleted = state.tutor.delete_history(ctx, module, index)?;
                Ok(json!({ "deleted": deleted }))
            })
            .await
        }
        "deleteMode.toggle" => {
            with_context(&session, id, |ctx| {
                let enabled = ctx.toggle_delete_mode();
                Ok(json!({ "enabled": enabled }))
            })
            .await
        }

        "diagnosis.submit" => diagnosis_submit(state, &session, params, id).await,
        "task.generate" => task_generate(state, &session, params, id).await,
        "task.revealSolution" => task_reveal(state, &session, id).await,
        "inquiry.ask" => inquiry_ask(state, &session, params, id).await,
        "logs.query" => logs_query(state, &session, params, id).await,

        _ => RpcResponse::method_not_found(id, method),
    }
}

/// Run a synchronous session operation and attach the resulting view.
async fn with_context<F>(
    session: &SessionHandle,
    id: Option<serde_json::Value>,
    op: F,
) -> RpcResponse
where
    F: FnOnce(&mut SessionContext) -> Result<serde_json::Value, netarch_engine::EngineError>,
{
    let mut ctx = session.context.lock().await;
    record_user(&ctx);
    match op(&mut *ctx) {
        Ok(result) => RpcResponse::success(id, with_view(result, &ctx)),
        Err(e) => RpcResponse::engine_error(id, &e),
    }
}

fn with_view(mut result: serde_json::Value, ctx: &SessionContext) -> serde_json::Value {
    if let Some(object) = result.as_object_mut() {
        object.insert("view".into(), json!(ctx.view()));
    }
    result
}

fn record_user(ctx: &SessionContext) {
    if let Some(user) = ctx.user() {
        Span::current().record("user_id", user.id.get());
    }
}

fn module_param(params: &serde_json::Value) -> Result<Module, String> {
    rpc::require_str(params, "module")?.parse()
}

fn module_and_index(params: &serde_json::Value) -> Result<(Module, usize), String> {
    Ok((module_param(params)?, rpc::require_index(params, "index")?))
}

fn session_open(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let session = state.sessions.open();
    tracing::info!(session_id = %sessions::log_id(&session.token), "session opened");
    RpcResponse::success(id, json!({ "token": session.token }))
}

fn auth_register(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let (username, password) = match credentials(params) {
        Ok(c) => c,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    match state.tutor.register(username, password) {
        Ok(user_id) => RpcResponse::success(id, json!({ "userId": user_id })),
        Err(e) => RpcResponse::engine_error(id, &e),
    }
}

fn credentials(params: &serde_json::Value) -> Result<(&str, &str), String> {
    Ok((rpc::require_str(params, "username")?, rpc::require_str(params, "password")?))
}

async fn auth_login(
    state: &Arc<HandlerState>,
    session: &SessionHandle,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let (username, password) = match credentials(params) {
        Ok(c) => c,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    with_context(session, id, |ctx| {
        let user = state.tutor.sign_in(ctx, username, password)?;
        record_user(ctx);
        Ok(json!({ "user": user }))
    })
    .await
}

async fn auth_logout(
    state: &Arc<HandlerState>,
    session: &SessionHandle,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    session.cancel_generation();
    with_context(session, id, |ctx| {
        state.tutor.sign_out(ctx);
        Ok(json!({}))
    })
    .await
}

async fn diagnosis_submit(
    state: &Arc<HandlerState>,
    session: &SessionHandle,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let request: DiagnosisRequest = match rpc::parse_params(params) {
        Ok(r) => r,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let control = StreamControl::new(session.generation_token());
    let mut ctx = session.context.lock().await;
    record_user(&ctx);
    match state.tutor.submit_diagnosis(&mut ctx, &request, &control).await {
        Ok(entry) => RpcResponse::success(id, with_view(json!({ "entry": entry }), &ctx)),
        Err(e) => RpcResponse::engine_error(id, &e),
    }
}

async fn task_generate(
    state: &Arc<HandlerState>,
    session: &SessionHandle,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let request: TaskRequest = match rpc::parse_params(params) {
        Ok(r) => r,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let control = StreamControl::new(session.generation_token());
    let mut ctx = session.context.lock().await;
    record_user(&ctx);
    match state.tutor.generate_task(&mut ctx, &request, &control).await {
        Ok(entry) => RpcResponse::success(id, with_view(json!({ "entry": entry }), &ctx)),
        Err(e) => RpcResponse::engine_error(id, &e),
    }
}

async fn task_reveal(
    state: &Arc<HandlerState>,
    session: &SessionHandle,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let control = StreamControl::new(session.generation_token());
    let mut ctx = session.context.lock().await;
    record_user(&ctx);
    match state.tutor.reveal_solution(&mut ctx, &control).await {
        Ok(revealed) => RpcResponse::success(id, with_view(json!(revealed), &ctx)),
        Err(e) => RpcResponse::engine_error(id, &e),
    }
}

async fn inquiry_ask(
    state: &Arc<HandlerState>,
    session: &SessionHandle,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let concept = match rpc::require_str(params, "concept") {
        Ok(c) => c,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let control = StreamControl::new(session.generation_token());
    let mut ctx = session.context.lock().await;
    record_user(&ctx);
    match state.tutor.ask(&mut ctx, concept, &control).await {
        Ok(entry) => RpcResponse::success(id, with_view(json!({ "entry": entry }), &ctx)),
        Err(e) => RpcResponse::engine_error(id, &e),
    }
}

fn diagnosis_topics(id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(id, json!({ "topics": DIAGNOSIS_TOPICS }))
}

/// The caller's own persisted warnings. Records are always scoped to the
/// signed-in user.
async fn logs_query(
    state: &Arc<HandlerState>,
    session: &SessionHandle,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let user_id = {
        let ctx = session.context.lock().await;
        record_user(&ctx);
        match ctx.require_user() {
            Ok(user) => user.id.get(),
            Err(e) => return RpcResponse::engine_error(id, &e),
        }
    };

    let Some(log_sink) = state.telemetry.as_ref().and_then(|t| t.logs()) else {
        return RpcResponse::success(id, json!({ "logs": [], "totalCount": 0, "enabled": false }));
    };

    let query = LogQuery {
        level: rpc::optional_str(params, "level").map(str::to_string),
        target: rpc::optional_str(params, "target").map(str::to_string),
        session_id: rpc::optional_str(params, "sessionId").map(str::to_string),
        user_id: Some(user_id),
        since: rpc::optional_str(params, "since").map(str::to_string),
        limit: rpc::optional_i64(params, "limit").and_then(|v| u32::try_from(v).ok()),
    };

    match log_sink.query(&query) {
        Ok(records) => {
            let count = records.len();
            RpcResponse::success(
                id,
                json!({ "logs": records, "totalCount": count, "enabled": true }),
            )
        }
        Err(e) => RpcResponse::internal_error(id, format!("Failed to query logs: {e}")),
    }
}

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let db_ok = state
        .db
        .with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(true)
        })
        .unwrap_or(false);

    RpcResponse::success(
        id,
        json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "components": {
                "database": if db_ok { "ok" } else { "error" },
                "model": state.tutor.client().model(),
            },
            "sessions": state.sessions.len(),
        }),
    )
}
