//! VPN session module for vpnctl
//!
//! Tracks the lifecycle of the single active tunnel. The tunnel itself is
//! owned by a [`Connector`]; this module only reacts to what the connector
//! reports and decides which user actions are allowed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ConnectorEvent   ┌────────────────────────┐
//! │  Connector   │ ────────────────▶ │ ConnectionStateMachine │
//! │ (OpenVPN/WG) │ ◀──────────────── │                        │
//! └──────────────┘  connect/disconn. └───────────┬────────────┘
//!                                                │ watch
//!                                                ▼
//!                                          SessionView
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use libvpnctl::vpn::{connector_channel, ConnectionStateMachine};
//!
//! # async fn run(connector: Arc<dyn libvpnctl::vpn::Connector>,
//! #              store: Arc<dyn libvpnctl::store::ConfigStore>,
//! #              config: libvpnctl::VpnctlConfig) -> libvpnctl::VpnResult<()> {
//! let (events, queue) = connector_channel();
//! // hand `events` to the connector
//! # drop(events);
//! let machine = Arc::new(ConnectionStateMachine::new(
//!     connector,
//!     store,
//!     Arc::new(config.error_catalog()),
//!     config.session.clone(),
//! ));
//! machine.clone().spawn_event_loop(queue);
//! machine.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod connector;
pub mod session;
pub mod state;

pub use connector::{connector_channel, Connector, ConnectorEvent, ConnectorEvents};
pub use session::ConnectionStateMachine;
pub use state::{format_rate, ConnectionState, SessionView};
