//! Bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a [`BridgeCore`](crate::BridgeCore).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Reject every outstanding call when an `uncaughtException` event
    /// arrives. Off by default: without it calls to a crashed worker never
    /// settle.
    pub reject_pending_on_uncaught_exception: bool,

    /// Deadline applied to `call_and_log` calls, in milliseconds. `None`
    /// leaves them unbounded.
    pub call_and_log_timeout_ms: Option<u64>,
}

impl BridgeConfig {
    /// Deadline for `call_and_log` calls.
    pub fn call_and_log_timeout(&self) -> Option<Duration> {
        self.call_and_log_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.reject_pending_on_uncaught_exception);
        assert_eq!(config.call_and_log_timeout(), None);
    }

    #[test]
    fn test_camel_case_keys() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{"rejectPendingOnUncaughtException":true,"callAndLogTimeoutMs":250}"#,
        )
        .unwrap();
        assert!(config.reject_pending_on_uncaught_exception);
        assert_eq!(config.call_and_log_timeout(), Some(Duration::from_millis(250)));
    }
}
