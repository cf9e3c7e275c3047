//! Connectivity state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity of the sync manager.
///
/// Exactly one value is active at any instant. The sync manager is the
/// only writer; everything else reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// No connection. Initial state.
    #[default]
    Offline,
    /// A connection is being established.
    Connecting,
    /// Connected and idle.
    Online,
    /// Connected and draining the queue.
    Syncing,
}

impl ConnectivityState {
    /// Returns true if a sync cycle may run in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityState::Online | ConnectivityState::Syncing)
    }

    /// Returns the wire name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Offline => "offline",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Online => "online",
            ConnectivityState::Syncing => "syncing",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_offline() {
        assert_eq!(ConnectivityState::default(), ConnectivityState::Offline);
    }

    #[test]
    fn connected_states() {
        assert!(ConnectivityState::Online.is_connected());
        assert!(ConnectivityState::Syncing.is_connected());
        assert!(!ConnectivityState::Offline.is_connected());
        assert!(!ConnectivityState::Connecting.is_connected());
    }

    #[test]
    fn wire_names() {
        let json = serde_json::to_string(&ConnectivityState::Syncing).unwrap();
        assert_eq!(json, "\"syncing\"");
        assert_eq!(ConnectivityState::Connecting.to_string(), "connecting");
    }
}
