use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One mutex per (agent, session), held across a whole turn so concurrent
/// messages in the same conversation serialize.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, agent_id: &str, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry((agent_id.to_string(), session_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_session_serializes() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("vamos", "web-1").await;
        let locks2 = locks.clone();
        let contended = tokio::spawn(async move {
            let _g = locks2.acquire("vamos", "web-1").await;
        });
        tokio::task::yield_now().await;
        assert!(!contended.is_finished());
        drop(guard);
        contended.await.unwrap();
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("vamos", "web-1").await;
        let _b = locks.acquire("vamos", "web-2").await;
        let _c = locks.acquire("otra", "web-1").await;
    }
}
