//! In-memory and TOML-file backed [`ConfigStore`]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ConfigStore, RouteMode, ServerId, ServerRecord};
use crate::container::{ContainerConfig, ContainerKind, ServerCredentials};
use crate::error::{VpnError, VpnResult};

/// On-disk layout of the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(rename = "default-server", default, skip_serializing_if = "Option::is_none")]
    pub default_server: Option<ServerId>,
    #[serde(rename = "route-mode", default)]
    pub route_mode: RouteMode,
    #[serde(rename = "server", default)]
    pub servers: Vec<ServerRecord>,
}

impl StoreData {
    fn get(&self, id: ServerId) -> VpnResult<&ServerRecord> {
        self.servers
            .get(id.0)
            .ok_or_else(|| VpnError::NotFound(format!("Server {} not found", id)))
    }

    fn get_mut(&mut self, id: ServerId) -> VpnResult<&mut ServerRecord> {
        self.servers
            .get_mut(id.0)
            .ok_or_else(|| VpnError::NotFound(format!("Server {} not found", id)))
    }

    fn normalize(&mut self) {
        for server in &mut self.servers {
            server.normalize();
        }
        if let Some(id) = self.default_server {
            if id.0 >= self.servers.len() {
                self.default_server = None;
            }
        }
    }
}

/// Server list guarded by a lock, optionally mirrored to a TOML file.
///
/// Every mutation rewrites the whole file while the write lock is held and
/// only becomes visible once the file was written.
pub struct ServerStore {
    data: RwLock<StoreData>,
    path: Option<PathBuf>,
}

impl ServerStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
            path: None,
        }
    }

    /// Open a file-backed store; a missing file starts empty
    pub async fn open<P: AsRef<Path>>(path: P) -> VpnResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path).await {
            Ok(content) => {
                let mut data: StoreData = toml::from_str(&content)
                    .map_err(|e| VpnError::ConfigError(format!("Failed to parse {:?}: {}", path, e)))?;
                data.normalize();
                debug!("Loaded {} server(s) from {:?}", data.servers.len(), path);
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Server store {:?} does not exist yet, starting empty", path);
                StoreData::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
        })
    }

    /// Store seeded with existing data, not persisted
    pub fn from_data(mut data: StoreData) -> Self {
        data.normalize();
        Self {
            data: RwLock::new(data),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of everything currently stored
    pub async fn snapshot(&self) -> StoreData {
        self.data.read().await.clone()
    }

    async fn persist(&self, data: &StoreData) -> VpnResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let toml_str = toml::to_string_pretty(data)?;
        fs::write(path, toml_str).await?;
        debug!("Saved server store to {:?}", path);
        Ok(())
    }

    /// Apply a mutation to a copy of the data, persist the copy and swap it
    /// in. On any error the stored data is left untouched.
    async fn commit<F, T>(&self, f: F) -> VpnResult<T>
    where
        F: FnOnce(&mut StoreData) -> VpnResult<T> + Send,
        T: Send,
    {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        let result = f(&mut next)?;
        self.persist(&next).await?;
        *data = next;
        Ok(result)
    }

    /// Apply a mutation to one server, keeping its default container valid
    async fn update_server<F>(&self, id: ServerId, f: F) -> VpnResult<()>
    where
        F: FnOnce(&mut ServerRecord) -> VpnResult<()> + Send,
    {
        self.commit(|data| {
            let server = data.get_mut(id)?;
            f(server)?;
            server.normalize();
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ConfigStore for ServerStore {
    async fn servers_count(&self) -> usize {
        self.data.read().await.servers.len()
    }

    async fn server(&self, id: ServerId) -> VpnResult<ServerRecord> {
        self.data.read().await.get(id).cloned()
    }

    async fn add_server(&self, mut record: ServerRecord) -> VpnResult<ServerId> {
        record.normalize();
        let host_name = record.credentials.host_name.clone();
        let id = self
            .commit(|data| {
                data.servers.push(record);
                Ok(ServerId(data.servers.len() - 1))
            })
            .await?;
        info!("Added server {} ({})", id, host_name);
        Ok(id)
    }

    async fn remove_server(&self, id: ServerId) -> VpnResult<()> {
        let removed = self
            .commit(|data| {
                data.get(id)?;
                let removed = data.servers.remove(id.0);

                data.default_server = match data.default_server {
                    Some(current) if current == id => {
                        if data.servers.is_empty() { None } else { Some(ServerId(0)) }
                    }
                    Some(current) if current.0 > id.0 => Some(ServerId(current.0 - 1)),
                    other => other,
                };
                Ok(removed)
            })
            .await?;
        info!("Removed server {} ({})", id, removed.credentials.host_name);
        Ok(())
    }

    async fn default_server(&self) -> Option<ServerId> {
        self.data.read().await.default_server
    }

    async fn set_default_server(&self, id: ServerId) -> VpnResult<()> {
        self.commit(|data| {
            data.get(id)?;
            data.default_server = Some(id);
            Ok(())
        })
        .await
    }

    async fn server_credentials(&self, id: ServerId) -> VpnResult<ServerCredentials> {
        Ok(self.data.read().await.get(id)?.credentials.clone())
    }

    async fn have_auth_data(&self, id: ServerId) -> VpnResult<bool> {
        Ok(self.data.read().await.get(id)?.credentials.have_auth_data())
    }

    async fn containers(&self, id: ServerId) -> VpnResult<Vec<ContainerKind>> {
        Ok(self.data.read().await.get(id)?.container_kinds())
    }

    async fn container_config(&self, id: ServerId, kind: ContainerKind) -> VpnResult<ContainerConfig> {
        Ok(self
            .data
            .read()
            .await
            .get(id)?
            .container_config(kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_container_config(&self, id: ServerId, kind: ContainerKind, config: ContainerConfig) -> VpnResult<()> {
        self.update_server(id, |server| {
            server.set_container_config(kind, config);
            Ok(())
        })
        .await
    }

    async fn remove_container_config(&self, id: ServerId, kind: ContainerKind) -> VpnResult<()> {
        self.update_server(id, |server| {
            if !server.remove_container(kind) {
                debug!("Container {} was not stored for server {}", kind, id);
            }
            Ok(())
        })
        .await
    }

    async fn default_container(&self, id: ServerId) -> VpnResult<Option<ContainerKind>> {
        Ok(self.data.read().await.get(id)?.default_container)
    }

    async fn set_default_container(&self, id: ServerId, kind: Option<ContainerKind>) -> VpnResult<()> {
        self.update_server(id, |server| server.set_default_container(kind)).await
    }

    async fn route_mode(&self) -> RouteMode {
        self.data.read().await.route_mode
    }

    async fn set_route_mode(&self, mode: RouteMode) -> VpnResult<()> {
        self.commit(|data| {
            data.route_mode = mode;
            Ok(())
        })
        .await
    }

    async fn next_available_server_name(&self) -> String {
        let data = self.data.read().await;
        let mut n = data.servers.len() + 1;
        loop {
            let name = format!("Server {}", n);
            if !data.servers.iter().any(|s| s.description == name) {
                return name;
            }
            n += 1;
        }
    }
}
