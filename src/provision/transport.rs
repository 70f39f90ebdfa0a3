use async_trait::async_trait;

use crate::container::{ContainerConfig, ContainerKind, ServerCredentials};
use crate::error::ErrorCode;

/// Remote management channel to a user-owned server (usually SSH).
///
/// Calls may take minutes and carry no timeout of their own.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Deploy and configure one container
    async fn setup_container(
        &self,
        credentials: &ServerCredentials,
        container: ContainerKind,
        config: &ContainerConfig,
    ) -> Result<(), ErrorCode>;

    /// Tear down one container
    async fn remove_container(
        &self,
        credentials: &ServerCredentials,
        container: ContainerKind,
    ) -> Result<(), ErrorCode>;

    /// Drop any cached session to the host; best effort
    async fn disconnect_from_host(&self, credentials: &ServerCredentials);
}
