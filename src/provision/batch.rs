//! Ordered sets of containers to install on a new server

use serde::{Deserialize, Serialize};

use crate::container::{
    CloakSection, ContainerConfig, ContainerKind, ContainerSpec, OpenVpnSection,
    ShadowSocksSection, TransportProto, DEFAULT_SS_CIPHER,
};
use crate::error::VpnResult;
use crate::validation;

/// Containers to install, at most one per kind, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningBatch {
    entries: Vec<ContainerSpec>,
}

impl ProvisioningBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a container; an existing entry of the same kind is replaced in place
    pub fn insert(&mut self, spec: ContainerSpec) {
        match self.entries.iter_mut().find(|entry| entry.kind == spec.kind) {
            Some(entry) => entry.config = spec.config,
            None => self.entries.push(spec),
        }
    }

    pub fn with(mut self, spec: ContainerSpec) -> Self {
        self.insert(spec);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerSpec> {
        self.entries.iter()
    }

    pub fn kinds(&self) -> Vec<ContainerKind> {
        self.entries.iter().map(|entry| entry.kind).collect()
    }

    /// Validate every entry's config
    pub fn validate(&self) -> VpnResult<()> {
        for entry in &self.entries {
            entry.config.validate()?;
        }
        Ok(())
    }
}

impl FromIterator<ContainerSpec> for ProvisioningBatch {
    fn from_iter<I: IntoIterator<Item = ContainerSpec>>(iter: I) -> Self {
        let mut batch = Self::new();
        for spec in iter {
            batch.insert(spec);
        }
        batch
    }
}

impl<'a> IntoIterator for &'a ProvisioningBatch {
    type Item = &'a ContainerSpec;
    type IntoIter = std::slice::Iter<'a, ContainerSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub const DEFAULT_CLOAK_PORT: &str = "443";
pub const DEFAULT_CLOAK_SITE: &str = "tile.openstreetmap.org";
pub const DEFAULT_SS_PORT: &str = "6789";
pub const DEFAULT_OPENVPN_PORT: &str = "1194";

/// Protocol choices made while adding a new server.
///
/// Ports are kept as typed text; an empty port lets the server choose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewServerSelection {
    pub cloak_enabled: bool,
    pub cloak_port: String,
    pub cloak_site: String,
    pub shadowsocks_enabled: bool,
    pub shadowsocks_port: String,
    pub shadowsocks_cipher: String,
    pub openvpn_enabled: bool,
    pub openvpn_port: String,
    pub openvpn_transport: TransportProto,
}

impl Default for NewServerSelection {
    fn default() -> Self {
        Self {
            cloak_enabled: true,
            cloak_port: DEFAULT_CLOAK_PORT.to_string(),
            cloak_site: DEFAULT_CLOAK_SITE.to_string(),
            shadowsocks_enabled: false,
            shadowsocks_port: DEFAULT_SS_PORT.to_string(),
            shadowsocks_cipher: DEFAULT_SS_CIPHER.to_string(),
            openvpn_enabled: false,
            openvpn_port: DEFAULT_OPENVPN_PORT.to_string(),
            openvpn_transport: TransportProto::Udp,
        }
    }
}

fn optional_port(text: &str) -> VpnResult<Option<u16>> {
    if text.trim().is_empty() {
        Ok(None)
    } else {
        validation::parse_port(text).map(Some)
    }
}

fn optional_text(text: &str) -> VpnResult<Option<String>> {
    let value = validation::sanitize_config_value(text.trim())?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

impl NewServerSelection {
    /// Build the validated batch: Cloak, then ShadowSocks, then OpenVPN
    pub fn into_batch(self) -> VpnResult<ProvisioningBatch> {
        let mut batch = ProvisioningBatch::new();

        if self.cloak_enabled {
            batch.insert(ContainerSpec::new(
                ContainerKind::OpenVpnOverCloak,
                ContainerConfig {
                    cloak: Some(CloakSection {
                        port: optional_port(&self.cloak_port)?,
                        site: optional_text(&self.cloak_site)?,
                    }),
                    ..Default::default()
                },
            ));
        }

        if self.shadowsocks_enabled {
            batch.insert(ContainerSpec::new(
                ContainerKind::OpenVpnOverShadowSocks,
                ContainerConfig {
                    shadowsocks: Some(ShadowSocksSection {
                        port: optional_port(&self.shadowsocks_port)?,
                        cipher: optional_text(&self.shadowsocks_cipher)?,
                    }),
                    ..Default::default()
                },
            ));
        }

        if self.openvpn_enabled {
            batch.insert(ContainerSpec::new(
                ContainerKind::OpenVpn,
                ContainerConfig {
                    openvpn: Some(OpenVpnSection {
                        port: optional_port(&self.openvpn_port)?,
                        transport_proto: Some(self.openvpn_transport),
                    }),
                    ..Default::default()
                },
            ));
        }

        batch.validate()?;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut batch = ProvisioningBatch::new()
            .with(ContainerSpec::with_defaults(ContainerKind::WireGuard))
            .with(ContainerSpec::with_defaults(ContainerKind::OpenVpn));

        let config = ContainerConfig {
            wireguard: Some(crate::container::WireGuardSection { port: Some(51820) }),
            ..Default::default()
        };
        batch.insert(ContainerSpec::new(ContainerKind::WireGuard, config.clone()));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.kinds(), vec![ContainerKind::WireGuard, ContainerKind::OpenVpn]);
        assert_eq!(batch.iter().next().map(|s| &s.config), Some(&config));
    }

    #[test]
    fn test_default_selection_is_cloak_only() {
        let batch = NewServerSelection::default().into_batch().unwrap();
        assert_eq!(batch.kinds(), vec![ContainerKind::OpenVpnOverCloak]);

        let cloak = batch.iter().next().unwrap().config.cloak.clone().unwrap();
        assert_eq!(cloak.port, Some(443));
        assert_eq!(cloak.site.as_deref(), Some(DEFAULT_CLOAK_SITE));
    }

    #[test]
    fn test_full_selection_order() {
        let selection = NewServerSelection {
            shadowsocks_enabled: true,
            openvpn_enabled: true,
            openvpn_transport: TransportProto::Tcp,
            openvpn_port: String::new(),
            ..Default::default()
        };
        let batch = selection.into_batch().unwrap();
        assert_eq!(
            batch.kinds(),
            vec![
                ContainerKind::OpenVpnOverCloak,
                ContainerKind::OpenVpnOverShadowSocks,
                ContainerKind::OpenVpn,
            ]
        );

        let openvpn = batch.iter().last().unwrap().config.openvpn.clone().unwrap();
        assert_eq!(openvpn.port, None);
        assert_eq!(openvpn.transport_proto, Some(TransportProto::Tcp));
    }

    #[test]
    fn test_selection_rejects_bad_input() {
        let bad_port = NewServerSelection {
            cloak_port: "70000".to_string(),
            ..Default::default()
        };
        assert!(bad_port.into_batch().is_err());

        let bad_cipher = NewServerSelection {
            cloak_enabled: false,
            shadowsocks_enabled: true,
            shadowsocks_cipher: "rc4-md5".to_string(),
            ..Default::default()
        };
        assert!(bad_cipher.into_batch().is_err());
    }

    #[test]
    fn test_nothing_selected_gives_empty_batch() {
        let selection = NewServerSelection {
            cloak_enabled: false,
            ..Default::default()
        };
        assert!(selection.into_batch().unwrap().is_empty());
    }
}
