//! Connection states and the observable session view derived from them

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorCode;

/// Connection state as posted by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Preparing,
    Connecting,
    Connected,
    Disconnecting,
    Reconnecting,
    Error,
    /// Signal the connector sent that we do not recognise
    Unknown,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 8] = [
        ConnectionState::Disconnected,
        ConnectionState::Preparing,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Disconnecting,
        ConnectionState::Reconnecting,
        ConnectionState::Error,
        ConnectionState::Unknown,
    ];

    /// Map a connector signal name to a state, falling back to `Unknown`
    pub fn from_signal(signal: &str) -> Self {
        match signal.trim().to_ascii_lowercase().as_str() {
            "disconnected" => ConnectionState::Disconnected,
            "preparing" => ConnectionState::Preparing,
            "connecting" => ConnectionState::Connecting,
            "connected" => ConnectionState::Connected,
            "disconnecting" => ConnectionState::Disconnecting,
            "reconnecting" => ConnectionState::Reconnecting,
            "error" => ConnectionState::Error,
            _ => ConnectionState::Unknown,
        }
    }

    /// Whether the user may press connect/disconnect in this state
    pub fn connect_enabled(&self) -> bool {
        !matches!(
            self,
            ConnectionState::Preparing | ConnectionState::Connecting | ConnectionState::Disconnecting
        )
    }

    /// Whether the route mode may be changed in this state.
    ///
    /// Never while a tunnel is up or in transition.
    pub fn route_mode_editable(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Unknown | ConnectionState::Error
        )
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Preparing => "Preparing...",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting...",
            ConnectionState::Reconnecting => "Reconnecting...",
            ConnectionState::Error => "Error",
            ConnectionState::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a presentation layer needs to render the session.
///
/// Published through a `watch` channel; subscribers always see the latest
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub state: ConnectionState,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    /// Code of the last error reported by the connector
    #[serde(skip)]
    pub last_error: Option<ErrorCode>,
    /// Last error message shown to the user
    pub error_text: Option<String>,
    /// Connect affordance armed
    pub connect_enabled: bool,
    /// A connect request is outstanding or the tunnel is meant to be up
    pub connect_pending: bool,
    pub route_mode_editable: bool,
}

impl SessionView {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            bytes_received: 0,
            bytes_sent: 0,
            last_error: None,
            error_text: None,
            connect_enabled: state.connect_enabled(),
            connect_pending: false,
            route_mode_editable: state.route_mode_editable(),
        }
    }

    pub fn received_rate_text(&self) -> String {
        format_rate(self.bytes_received)
    }

    pub fn sent_rate_text(&self) -> String {
        format_rate(self.bytes_sent)
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

/// Format a bytes-per-second figure as megabits per second
pub fn format_rate(bytes_per_sec: u64) -> String {
    let mbps = bytes_per_sec as f64 * 8.0 / 1_000_000.0;
    format!("{:.2} Mbps", mbps)
}
