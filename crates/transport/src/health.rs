//! Connectivity health monitor
//!
//! Derives an online/degraded/offline status from request outcomes. The
//! transports report here; a status-banner collaborator reads the current
//! value.

use parking_lot::RwLock;
use tracing::debug;

/// Connectivity state derived from recent outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Last authenticated request succeeded.
    Online,
    /// The backend is reachable but rejecting requests (non-auth 4xx).
    Degraded,
    /// Gateway or network retries were exhausted.
    Offline,
}

/// Current status plus the reason for any non-online state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityStatus {
    /// Derived state.
    pub state: ConnectivityState,
    /// Human-readable reason, absent when online.
    pub reason: Option<String>,
}

impl ConnectivityStatus {
    fn online() -> Self {
        Self { state: ConnectivityState::Online, reason: None }
    }
}

/// Tracks the most recent connectivity status.
#[derive(Debug)]
pub struct HealthMonitor {
    status: RwLock<ConnectivityStatus>,
}

impl HealthMonitor {
    /// Start in the online state.
    #[must_use]
    pub fn new() -> Self {
        Self { status: RwLock::new(ConnectivityStatus::online()) }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectivityStatus {
        self.status.read().clone()
    }

    /// Replace the current status.
    pub fn set_status(&self, state: ConnectivityState, reason: Option<String>) {
        let mut status = self.status.write();
        if status.state != state {
            debug!(?state, reason = reason.as_deref(), "connectivity status changed");
        }
        *status = ConnectivityStatus { state, reason };
    }

    /// A 2xx outcome was observed.
    pub fn report_online(&self) {
        self.set_status(ConnectivityState::Online, None);
    }

    /// A non-auth 4xx outcome was observed.
    pub fn report_degraded(&self, reason: impl Into<String>) {
        self.set_status(ConnectivityState::Degraded, Some(reason.into()));
    }

    /// Gateway/network retries were exhausted.
    pub fn report_offline(&self, reason: impl Into<String>) {
        self.set_status(ConnectivityState::Offline, Some(reason.into()));
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the health monitor.
    use super::*;

    #[test]
    fn starts_online() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.status().state, ConnectivityState::Online);
        assert!(monitor.status().reason.is_none());
    }

    #[test]
    fn transitions_follow_reports() {
        let monitor = HealthMonitor::new();

        monitor.report_degraded("validation failed");
        assert_eq!(monitor.status().state, ConnectivityState::Degraded);
        assert_eq!(monitor.status().reason.as_deref(), Some("validation failed"));

        monitor.report_offline("gateway retries exhausted");
        assert_eq!(monitor.status().state, ConnectivityState::Offline);

        monitor.report_online();
        assert_eq!(monitor.status().state, ConnectivityState::Online);
        assert!(monitor.status().reason.is_none());
    }
}
