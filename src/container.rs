//! Container kinds, per-protocol configuration and server credentials

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{VpnError, VpnResult};
use crate::validation;

/// Default ShadowSocks cipher offered for new servers
pub const DEFAULT_SS_CIPHER: &str = "chacha20-ietf-poly1305";

/// Deployable VPN container kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Plain OpenVPN tunnel
    #[serde(rename = "openvpn")]
    OpenVpn,
    /// OpenVPN wrapped in ShadowSocks
    #[serde(rename = "openvpn-over-shadowsocks")]
    OpenVpnOverShadowSocks,
    /// OpenVPN wrapped in ShadowSocks and Cloak
    #[serde(rename = "openvpn-over-cloak")]
    OpenVpnOverCloak,
    /// WireGuard
    #[serde(rename = "wireguard")]
    WireGuard,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 4] = [
        ContainerKind::OpenVpn,
        ContainerKind::OpenVpnOverShadowSocks,
        ContainerKind::OpenVpnOverCloak,
        ContainerKind::WireGuard,
    ];

    /// Stable identifier used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::OpenVpn => "openvpn",
            ContainerKind::OpenVpnOverShadowSocks => "openvpn-over-shadowsocks",
            ContainerKind::OpenVpnOverCloak => "openvpn-over-cloak",
            ContainerKind::WireGuard => "wireguard",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContainerKind::OpenVpn => "OpenVPN",
            ContainerKind::OpenVpnOverShadowSocks => "OpenVPN over ShadowSocks",
            ContainerKind::OpenVpnOverCloak => "OpenVPN over Cloak",
            ContainerKind::WireGuard => "WireGuard",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerKind {
    type Err = VpnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContainerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| VpnError::InvalidParameter(format!("Unknown container '{}'", s)))
    }
}

/// OpenVPN transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProto {
    #[default]
    Udp,
    Tcp,
}

impl FromStr for TransportProto {
    type Err = VpnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(TransportProto::Udp),
            "tcp" => Ok(TransportProto::Tcp),
            other => Err(VpnError::InvalidParameter(format!(
                "Unknown transport protocol '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenVpnSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(rename = "transport-proto", skip_serializing_if = "Option::is_none")]
    pub transport_proto: Option<TransportProto>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowSocksSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloakSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Site the Cloak server impersonates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGuardSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Protocol-specific container configuration.
///
/// Every section is optional; an empty config asks the server side to use
/// its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openvpn: Option<OpenVpnSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadowsocks: Option<ShadowSocksSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloak: Option<CloakSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wireguard: Option<WireGuardSection>,
}

impl ContainerConfig {
    pub fn is_empty(&self) -> bool {
        self.openvpn.is_none()
            && self.shadowsocks.is_none()
            && self.cloak.is_none()
            && self.wireguard.is_none()
    }

    /// Validate every present section
    pub fn validate(&self) -> VpnResult<()> {
        if let Some(ref openvpn) = self.openvpn {
            if let Some(port) = openvpn.port {
                validation::validate_port(port)?;
            }
        }
        if let Some(ref ss) = self.shadowsocks {
            if let Some(port) = ss.port {
                validation::validate_port(port)?;
            }
            if let Some(ref cipher) = ss.cipher {
                validation::validate_ss_cipher(cipher)?;
            }
        }
        if let Some(ref cloak) = self.cloak {
            if let Some(port) = cloak.port {
                validation::validate_port(port)?;
            }
            if let Some(ref site) = cloak.site {
                validation::validate_masking_site(site)?;
            }
        }
        if let Some(ref wg) = self.wireguard {
            if let Some(port) = wg.port {
                validation::validate_port(port)?;
            }
        }
        Ok(())
    }
}

/// A container kind together with the configuration it is installed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(rename = "container")]
    pub kind: ContainerKind,
    #[serde(default)]
    pub config: ContainerConfig,
}

impl ContainerSpec {
    pub fn new(kind: ContainerKind, config: ContainerConfig) -> Self {
        Self { kind, config }
    }

    /// Spec that lets the server pick every setting
    pub fn with_defaults(kind: ContainerKind) -> Self {
        Self::new(kind, ContainerConfig::default())
    }
}

/// SSH credentials of a user-owned server
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCredentials {
    #[serde(rename = "host-name")]
    pub host_name: String,
    #[serde(rename = "user-name", default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

impl ServerCredentials {
    pub fn new(host_name: impl Into<String>, user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            user_name: user_name.into(),
            password: password.into(),
            port: default_ssh_port(),
        }
    }

    /// Whether these credentials are complete enough to manage the server
    pub fn have_auth_data(&self) -> bool {
        !self.host_name.is_empty() && !self.user_name.is_empty() && !self.password.is_empty()
    }

    /// `host:port` identity of the server
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host_name, self.port)
    }
}

impl fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("host_name", &self.host_name)
            .field("user_name", &self.user_name)
            .field("password", &"********")
            .field("port", &self.port)
            .finish()
    }
}
