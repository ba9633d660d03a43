//! Admission policy types.

use serde::Deserialize;
use std::time::Duration;

use crate::error::AdmissionError;

/// Order in which queued callers are released when capacity frees up.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrder {
    /// Release the caller that has waited longest first
    #[default]
    OldestFirst,
    /// Release the most recent arrival first
    NewestFirst,
}

/// A fixed-window quota rule.
///
/// At most `permit_limit` requests are admitted per `window` and partition.
/// Overflow is queued up to `queue_limit` entries, then rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    permit_limit: u32,
    window: Duration,
    queue_limit: u32,
    queue_order: QueueOrder,
}

impl Policy {
    /// Create a policy with queueing disabled.
    pub fn new(name: impl Into<String>, permit_limit: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            permit_limit,
            window,
            queue_limit: 0,
            queue_order: QueueOrder::OldestFirst,
        }
    }

    /// Allow up to `queue_limit` callers to wait for the next window.
    pub fn with_queue(mut self, queue_limit: u32, queue_order: QueueOrder) -> Self {
        self.queue_limit = queue_limit;
        self.queue_order = queue_order;
        self
    }

    pub(crate) fn renamed(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permit_limit(&self) -> u32 {
        self.permit_limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn queue_limit(&self) -> u32 {
        self.queue_limit
    }

    pub fn queue_order(&self) -> QueueOrder {
        self.queue_order
    }

    /// Check the invariants a policy must satisfy before registration.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        let invalid = |reason: &str| AdmissionError::InvalidPolicy {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if self.permit_limit == 0 {
            return Err(invalid("permit_limit must be > 0"));
        }
        if self.window.is_zero() {
            return Err(invalid("window must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_policy_disables_queueing() {
        let policy = Policy::new("readCommon", 100, Duration::from_secs(60));
        assert_eq!(policy.queue_limit(), 0);
        assert_eq!(policy.queue_order(), QueueOrder::OldestFirst);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let policy = Policy::new("p", 0, Duration::from_secs(1));
        assert!(matches!(policy.validate(), Err(AdmissionError::InvalidPolicy { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let policy = Policy::new("p", 1, Duration::ZERO);
        assert!(matches!(policy.validate(), Err(AdmissionError::InvalidPolicy { .. })));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let policy = Policy::new("  ", 1, Duration::from_secs(1));
        assert!(policy.validate().is_err());
    }
}
