use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use netarch_core::SessionToken;
use netarch_engine::SessionContext;

/// One browser session: its tutoring state and the token that cancels
/// whatever generation is running for it.
pub struct SessionHandle {
    pub token: SessionToken,
    /// Held for the whole of a controller call, so each session runs one
    /// operation at a time.
    pub context: Mutex<SessionContext>,
    cancel: parking_lot::Mutex<CancellationToken>,
    last_seen: AtomicU64,
}

impl SessionHandle {
    fn new(token: SessionToken) -> Self {
        Self {
            token,
            context: Mutex::new(SessionContext::new()),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            last_seen: AtomicU64::new(now_secs()),
        }
    }

    /// Token for the next generation. A token that has already fired is
    /// replaced so one cancel does not poison later requests.
    pub fn generation_token(&self) -> CancellationToken {
        let mut current = self.cancel.lock();
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
        current.clone()
    }

    /// Abort the running generation, if any.
    pub fn cancel_generation(&self) {
        self.cancel.lock().cancel();
    }

    pub fn touch(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last = self.last_seen.load(Ordering::Relaxed);
        Duration::from_secs(now_secs().saturating_sub(last))
    }
}

/// Non-secret stand-in for a session token in logs. The token itself is a
/// bearer credential and never leaves the registry.
pub fn log_id(token: &SessionToken) -> String {
    let digest = Sha256::digest(token.as_str().as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// All live sessions, keyed by their opaque token.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionToken, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> Arc<SessionHandle> {
        let token = SessionToken::new();
        let handle = Arc::new(SessionHandle::new(token.clone()));
        self.sessions.insert(token, handle.clone());
        handle
    }

    pub fn get(&self, token: &SessionToken) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.get(token).map(|h| Arc::clone(h.value()))?;
        handle.touch();
        Some(handle)
    }

    /// Drop a session, cancelling any generation it still has running.
    pub fn close(&self, token: &SessionToken) -> bool {
        match self.sessions.remove(token) {
            Some((_, handle)) => {
                handle.cancel_generation();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close sessions idle for at least `max_idle`. Returns how many went.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let stale: Vec<SessionToken> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= max_idle)
            .map(|entry| entry.key().clone())
            .collect();
        stale.iter().filter(|token| self.close(token)).count()
    }
}

/// Periodically close idle sessions.
pub fn start_cleanup_task(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let pruned = registry.prune_idle(max_idle);
            if pruned > 0 {
                tracing::info!(pruned, remaining = registry.len(), "idle sessions closed");
            }
        }
    })
}
