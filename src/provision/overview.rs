//! Per-protocol status of one stored server

use serde::Serialize;

use crate::container::ContainerKind;
use crate::error::VpnResult;
use crate::store::{ConfigStore, ServerId};

/// What can be done with one container kind on a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolStatus {
    pub container: ContainerKind,
    pub installed: bool,
    pub is_default: bool,
    /// "Make default" affordance shown
    pub default_visible: bool,
    /// "Share" affordance shown
    pub share_visible: bool,
    /// Install/remove affordance usable
    pub install_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolsOverview {
    pub server: ServerId,
    pub host_name: String,
    pub description: String,
    pub have_auth_data: bool,
    pub protocols: Vec<ProtocolStatus>,
}

impl ProtocolsOverview {
    pub async fn load(store: &dyn ConfigStore, server: ServerId) -> VpnResult<Self> {
        let record = store.server(server).await?;
        let have_auth_data = record.credentials.have_auth_data();

        let protocols = ContainerKind::ALL
            .into_iter()
            .map(|container| {
                let installed = record.has_container(container);
                ProtocolStatus {
                    container,
                    installed,
                    is_default: record.default_container == Some(container),
                    default_visible: have_auth_data && installed,
                    share_visible: have_auth_data && installed,
                    install_enabled: have_auth_data,
                }
            })
            .collect();

        Ok(Self {
            server,
            host_name: record.credentials.host_name,
            description: record.description,
            have_auth_data,
            protocols,
        })
    }

    pub fn status(&self, container: ContainerKind) -> Option<&ProtocolStatus> {
        self.protocols.iter().find(|status| status.container == container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerConfig, ServerCredentials};
    use crate::store::{ServerRecord, ServerStore};

    #[tokio::test]
    async fn test_overview_flags() {
        let store = ServerStore::in_memory();
        let mut record = ServerRecord::new(ServerCredentials::new("203.0.113.5", "root", "pw"), "Server 1");
        record.set_container_config(ContainerKind::WireGuard, ContainerConfig::default());
        record.default_container = Some(ContainerKind::WireGuard);
        let id = store.add_server(record).await.unwrap();

        let overview = ProtocolsOverview::load(&store, id).await.unwrap();
        assert_eq!(overview.protocols.len(), ContainerKind::ALL.len());

        let wg = overview.status(ContainerKind::WireGuard).unwrap();
        assert!(wg.installed && wg.is_default && wg.default_visible && wg.share_visible);

        let openvpn = overview.status(ContainerKind::OpenVpn).unwrap();
        assert!(!openvpn.installed && !openvpn.default_visible && openvpn.install_enabled);
    }

    #[tokio::test]
    async fn test_imported_server_without_password() {
        let store = ServerStore::in_memory();
        let mut record = ServerRecord::new(ServerCredentials::new("203.0.113.5", "root", ""), "Imported");
        record.set_container_config(ContainerKind::OpenVpn, ContainerConfig::default());
        let id = store.add_server(record).await.unwrap();

        let overview = ProtocolsOverview::load(&store, id).await.unwrap();
        let openvpn = overview.status(ContainerKind::OpenVpn).unwrap();
        assert!(openvpn.installed);
        assert!(!openvpn.share_visible);
        assert!(!openvpn.install_enabled);
    }
}
