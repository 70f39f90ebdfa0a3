//! vpnctl - VPN Client Control Library
//!
//! Async client-side core of a self-hosted VPN service:
//! - Connection state machine driven by a VPN connector
//! - Remote provisioning of VPN containers on user-owned servers
//! - Persisted server list and per-server container configuration
//! - Optional progress/affordance feedback for long operations
//!
//! Tunnel drivers and the remote (SSH) transport are supplied by the
//! embedder through the [`vpn::Connector`] and
//! [`provision::RemoteTransport`] traits.

pub mod error;
pub mod config;
pub mod validation;
pub mod container;
pub mod store;
pub mod vpn;
pub mod provision;

// Re-export commonly used types
pub use error::{ErrorCatalog, ErrorCode, ErrorDescriber, VpnError, VpnResult};
pub use config::{ProvisioningSettings, SessionSettings, VpnctlConfig};
pub use container::{
    ContainerConfig, ContainerKind, ContainerSpec, ServerCredentials, TransportProto,
};
pub use store::{ConfigStore, RouteMode, ServerId, ServerRecord, ServerStore};
pub use vpn::{
    ConnectionState, ConnectionStateMachine, Connector, ConnectorEvent, SessionView,
};
pub use provision::{
    Feedback, NewServerSelection, ProtocolsOverview, ProvisioningBatch,
    ProvisioningOrchestrator, RemoteTransport, RemovalOutcome,
};
