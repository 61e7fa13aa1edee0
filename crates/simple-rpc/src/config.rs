// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Socket configuration with validation.

use crate::error::{Result, RpcError};

/// Configuration for a [`Socket`](crate::Socket).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SocketConfig {
    /// Upper bound on tasks waiting in the pending queue (default: unbounded).
    ///
    /// Requests arriving while the queue is full are dropped with a warning.
    pub max_pending_tasks: Option<usize>,
    /// Measure time spent in API calls and in `poll` (default: true).
    pub collect_timers: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_pending_tasks: None,
            collect_timers: true,
        }
    }
}

impl SocketConfig {
    /// Set the pending queue bound.
    pub fn with_max_pending_tasks(mut self, max: usize) -> Self {
        self.max_pending_tasks = Some(max);
        self
    }

    /// Validate configuration. Returns Ok(()) if valid.
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_tasks == Some(0) {
            return Err(RpcError::Config("max_pending_tasks must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SocketConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_pending_tasks, None);
        assert!(config.collect_timers);
    }

    #[test]
    fn test_zero_pending_bound_rejected() {
        let config = SocketConfig::default().with_max_pending_tasks(0);
        assert!(matches!(config.validate(), Err(RpcError::Config(_))));

        let config = SocketConfig::default().with_max_pending_tasks(1);
        assert!(config.validate().is_ok());
    }
}
