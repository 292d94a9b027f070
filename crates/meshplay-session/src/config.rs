//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Service name peers advertise and browse for. Browsing only reports
    /// peers advertising the same service type.
    pub service_type: String,

    /// Human-readable name shown in other peers' lobbies.
    pub display_name: String,

    /// How long an invited peer has to answer before the invite expires.
    pub invite_timeout: Duration,

    /// Whether an advertising peer accepts every invitation it receives.
    pub auto_accept_invitations: bool,

    /// Where the local identity is persisted. `None` generates a fresh
    /// identity each run.
    pub identity_path: Option<PathBuf>,

    /// Buffer size of the notification broadcast channel. Slow observers
    /// that fall further behind than this miss notifications.
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_type: "partyland-snake".to_string(),
            display_name: "player".to_string(),
            invite_timeout: Duration::from_secs(60),
            auto_accept_invitations: true,
            identity_path: None,
            notification_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.service_type, "partyland-snake");
        assert_eq!(config.invite_timeout, Duration::from_secs(60));
        assert!(config.auto_accept_invitations);
        assert!(config.identity_path.is_none());
        assert_eq!(config.notification_capacity, 64);
    }
}
