//! Persisted client configuration
//!
//! The store keeps the list of provisioned servers, the containers installed
//! on each of them and the default selections. Everything else in the crate
//! talks to it through the [`ConfigStore`] trait so tests and embedders can
//! swap the backing storage.

pub mod server_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::container::{ContainerConfig, ContainerKind, ContainerSpec, ServerCredentials};
use crate::error::{VpnError, VpnResult};

pub use server_store::ServerStore;

/// Position of a server in the persisted server list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub usize);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which destinations are routed through the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteMode {
    /// Everything goes through the VPN
    #[default]
    AllSites,
    /// Only listed sites go through the VPN
    ForwardSites,
    /// Everything except listed sites goes through the VPN
    ExceptSites,
}

impl RouteMode {
    /// Whether the per-site list is meaningful in this mode
    pub fn uses_site_list(&self) -> bool {
        *self != RouteMode::AllSites
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMode::AllSites => "all-sites",
            RouteMode::ForwardSites => "forward-sites",
            RouteMode::ExceptSites => "except-sites",
        }
    }
}

impl FromStr for RouteMode {
    type Err = VpnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-sites" => Ok(RouteMode::AllSites),
            "forward-sites" => Ok(RouteMode::ForwardSites),
            "except-sites" => Ok(RouteMode::ExceptSites),
            other => Err(VpnError::InvalidParameter(format!("Unknown route mode '{}'", other))),
        }
    }
}

/// A provisioned server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    #[serde(flatten)]
    pub credentials: ServerCredentials,
    #[serde(default)]
    pub description: String,
    /// Always one of `containers`, or `None` when nothing is installed
    #[serde(rename = "default-container", default, skip_serializing_if = "Option::is_none")]
    pub default_container: Option<ContainerKind>,
    /// Installed containers in installation order
    #[serde(default, rename = "container", skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerSpec>,
}

impl ServerRecord {
    pub fn new(credentials: ServerCredentials, description: impl Into<String>) -> Self {
        Self {
            credentials,
            description: description.into(),
            default_container: None,
            containers: Vec::new(),
        }
    }

    /// Installed container kinds in stored order
    pub fn container_kinds(&self) -> Vec<ContainerKind> {
        self.containers.iter().map(|spec| spec.kind).collect()
    }

    pub fn has_container(&self, kind: ContainerKind) -> bool {
        self.containers.iter().any(|spec| spec.kind == kind)
    }

    pub fn container_config(&self, kind: ContainerKind) -> Option<&ContainerConfig> {
        self.containers
            .iter()
            .find(|spec| spec.kind == kind)
            .map(|spec| &spec.config)
    }

    /// Insert or replace a container config, keeping the position of an
    /// existing entry
    pub fn set_container_config(&mut self, kind: ContainerKind, config: ContainerConfig) {
        match self.containers.iter_mut().find(|spec| spec.kind == kind) {
            Some(spec) => spec.config = config,
            None => self.containers.push(ContainerSpec::new(kind, config)),
        }
    }

    /// Remove a container. When it was the default, the first remaining
    /// container becomes the default (or none).
    ///
    /// Returns whether an entry was removed.
    pub fn remove_container(&mut self, kind: ContainerKind) -> bool {
        let before = self.containers.len();
        self.containers.retain(|spec| spec.kind != kind);
        if self.default_container == Some(kind) {
            self.default_container = self.containers.first().map(|spec| spec.kind);
        }
        self.containers.len() != before
    }

    /// Set the default container.
    ///
    /// `None` is only accepted when no container is installed.
    pub fn set_default_container(&mut self, kind: Option<ContainerKind>) -> VpnResult<()> {
        match kind {
            Some(kind) if !self.has_container(kind) => {
                return Err(VpnError::InvalidParameter(format!(
                    "Container {} is not installed on {}",
                    kind, self.credentials.host_name
                )));
            }
            None if !self.containers.is_empty() => {
                return Err(VpnError::InvalidParameter(format!(
                    "{} has installed containers, a default must be chosen",
                    self.credentials.host_name
                )));
            }
            _ => {}
        }
        self.default_container = kind;
        Ok(())
    }

    /// Restore the default-container invariant: the default is installed,
    /// and present whenever anything is installed
    pub(crate) fn normalize(&mut self) {
        let valid = match self.default_container {
            Some(kind) => self.has_container(kind),
            None => self.containers.is_empty(),
        };
        if !valid {
            self.default_container = self.containers.first().map(|spec| spec.kind);
        }
    }
}

/// Key-value style access to persisted client configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Number of stored servers
    async fn servers_count(&self) -> usize;

    /// Snapshot of a stored server
    async fn server(&self, id: ServerId) -> VpnResult<ServerRecord>;

    /// Append a server, returning its id
    async fn add_server(&self, record: ServerRecord) -> VpnResult<ServerId>;

    /// Remove a server; later ids shift down by one
    async fn remove_server(&self, id: ServerId) -> VpnResult<()>;

    async fn default_server(&self) -> Option<ServerId>;

    async fn set_default_server(&self, id: ServerId) -> VpnResult<()>;

    async fn server_credentials(&self, id: ServerId) -> VpnResult<ServerCredentials>;

    /// Whether the stored credentials allow managing the server remotely
    async fn have_auth_data(&self, id: ServerId) -> VpnResult<bool>;

    /// Installed containers in stored order
    async fn containers(&self, id: ServerId) -> VpnResult<Vec<ContainerKind>>;

    /// Config of an installed container; empty when not stored
    async fn container_config(&self, id: ServerId, kind: ContainerKind) -> VpnResult<ContainerConfig>;

    async fn set_container_config(&self, id: ServerId, kind: ContainerKind, config: ContainerConfig) -> VpnResult<()>;

    /// Remove a container, reassigning the default when needed.
    ///
    /// Removing a container that is not installed is not an error.
    async fn remove_container_config(&self, id: ServerId, kind: ContainerKind) -> VpnResult<()>;

    async fn default_container(&self, id: ServerId) -> VpnResult<Option<ContainerKind>>;

    /// Set the default container; `Some` must name an installed container
    async fn set_default_container(&self, id: ServerId, kind: Option<ContainerKind>) -> VpnResult<()>;

    async fn route_mode(&self) -> RouteMode;

    async fn set_route_mode(&self, mode: RouteMode) -> VpnResult<()>;

    /// First unused "Server N" description
    async fn next_available_server_name(&self) -> String;
}
