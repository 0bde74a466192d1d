//! Connected clients and per-client rate limiting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::controller::ClientId;

#[derive(Clone, Debug)]
pub struct Session {
    pub connected_at: Instant,
    pub last_activity: Instant,
    /// Rate limiting: message count in current window
    message_count: u32,
    /// Rate limiting: window start time
    window_start: Instant,
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<ClientId, Session>,
    limit: u32,
    window: Duration,
}

impl SessionRegistry {
    pub fn new(rate_limit: &RateLimitConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            limit: rate_limit.messages,
            window: rate_limit.window(),
        }
    }

    pub fn connect(&mut self, client: ClientId, now: Instant) {
        self.sessions.insert(
            client,
            Session {
                connected_at: now,
                last_activity: now,
                message_count: 0,
                window_start: now,
            },
        );
    }

    pub fn disconnect(&mut self, client: ClientId) -> Option<Session> {
        self.sessions.remove(&client)
    }

    pub fn get(&self, client: ClientId) -> Option<&Session> {
        self.sessions.get(&client)
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.sessions.contains_key(&client)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Count a message from `client`. Returns false once it exceeds the window's budget.
    pub fn check_rate_limit(&mut self, client: ClientId, now: Instant) -> bool {
        let Some(session) = self.sessions.get_mut(&client) else {
            return false;
        };

        if now.duration_since(session.window_start) >= self.window {
            session.window_start = now;
            session.message_count = 0;
        }

        session.message_count += 1;
        session.last_activity = now;
        session.message_count <= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(&RateLimitConfig {
            messages: 5,
            window_ms: 100,
        })
    }

    #[test]
    fn rate_limiting() {
        let mut sessions = registry();
        let start = Instant::now();
        sessions.connect(100, start);

        for _ in 0..5 {
            assert!(sessions.check_rate_limit(100, start));
        }
        assert!(!sessions.check_rate_limit(100, start));

        let later = start + Duration::from_millis(110);
        assert!(sessions.check_rate_limit(100, later));
        assert_eq!(sessions.get(100).map(|s| s.last_activity), Some(later));
    }

    #[test]
    fn unknown_clients_are_refused() {
        let mut sessions = registry();
        assert!(!sessions.check_rate_limit(7, Instant::now()));
    }

    #[test]
    fn disconnect_forgets_the_client() {
        let mut sessions = registry();
        let now = Instant::now();
        sessions.connect(1, now);
        sessions.connect(2, now);
        assert_eq!(sessions.len(), 2);
        assert!(sessions.disconnect(1).is_some());
        assert!(sessions.disconnect(1).is_none());
        assert!(!sessions.is_connected(1));
        assert!(sessions.is_connected(2));
    }
}
