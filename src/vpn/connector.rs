use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::container::{ContainerConfig, ContainerKind, ServerCredentials};
use crate::error::ErrorCode;
use super::state::ConnectionState;

/// Notification posted by a connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// The tunnel moved to a new state
    StateChanged(ConnectionState),
    /// Current throughput counters
    BytesChanged { received: u64, sent: u64 },
    /// Protocol-level error; does not change state by itself
    ProtocolError(ErrorCode),
}

/// Sending half handed to a connector
pub type ConnectorEvents = mpsc::UnboundedSender<ConnectorEvent>;

/// Create the single-consumer queue that carries connector notifications.
///
/// The sender may be cloned into any thread; the receiver is given to
/// [`ConnectionStateMachine::spawn_event_loop`](super::ConnectionStateMachine::spawn_event_loop).
pub fn connector_channel() -> (ConnectorEvents, mpsc::UnboundedReceiver<ConnectorEvent>) {
    mpsc::unbounded_channel()
}

/// Owner of the actual VPN tunnel (OpenVPN, WireGuard, ...).
///
/// State changes are never returned from these calls; the connector posts
/// them as [`ConnectorEvent`]s instead.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Ask the connector to bring a tunnel up.
    ///
    /// An `Err` means the request was refused outright.
    async fn connect(
        &self,
        credentials: &ServerCredentials,
        container: ContainerKind,
        config: &ContainerConfig,
    ) -> Result<(), ErrorCode>;

    /// Request teardown; completion is reported as a state change
    async fn disconnect(&self);

    async fn is_disconnected(&self) -> bool;
}
