use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use brain_core::ids::SessionId;

use crate::session::Session;

/// Point-in-time view of a live session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub agents: Vec<String>,
    pub pending_tool_calls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
}

/// Sessions currently running on this server.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `session` until the returned guard is dropped.
    pub fn track(self: &Arc<Self>, session: Arc<Session>) -> SessionGuard {
        let id = session.id.clone();
        self.sessions.insert(id.clone(), session);
        SessionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Summaries of all live sessions, oldest first.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| {
                let s = entry.value();
                SessionSummary {
                    session_id: s.id.clone(),
                    started_at: s.started_at,
                    agents: s.agents.clone(),
                    pending_tool_calls: s.pending_calls(),
                    end_reason: s.end_reason(),
                }
            })
            .collect();
        out.sort_by_key(|s| s.started_at);
        out
    }
}

/// Removes its session from the registry when dropped.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.sessions.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::ids::RequestId;

    #[test]
    fn guard_removes_on_drop() {
        let registry = Arc::new(SessionRegistry::new());
        let session = Arc::new(Session::new(vec!["desktop".into()]));
        let id = session.id.clone();

        let guard = registry.track(session);
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&id).is_some());

        drop(guard);
        assert_eq!(registry.count(), 0);
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn summaries_reflect_live_state() {
        let registry = Arc::new(SessionRegistry::new());
        let session = Arc::new(Session::new(vec!["desktop".into()]));
        let _pending = session.table().register(RequestId::new()).unwrap();
        session.record_end("bye".into());
        let _guard = registry.track(Arc::clone(&session));

        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pending_tool_calls, 1);
        assert_eq!(summaries[0].end_reason.as_deref(), Some("bye"));

        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(json["agents"][0], "desktop");
        assert!(json["started_at"].as_str().unwrap().contains('T'));
    }
}
