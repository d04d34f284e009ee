//! Session store configuration.

use std::time::Duration;

/// Lifetime and capacity policy for a [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Idle time after which a session is evicted. `None` keeps sessions
    /// until they are removed explicitly.
    pub session_ttl: Option<Duration>,
    /// How often the host should run [`evict_expired`](crate::SessionStore::evict_expired).
    pub sweep_interval: Duration,
    /// Maximum number of live sessions. `None` means unbounded.
    pub max_sessions: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            sweep_interval: Duration::from_secs(60),
            max_sessions: None,
        }
    }
}
