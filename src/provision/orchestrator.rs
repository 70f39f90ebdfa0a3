//! Container installation and removal on user-owned servers

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::batch::ProvisioningBatch;
use super::feedback::{Feedback, ProgressControl};
use super::transport::RemoteTransport;
use crate::config::ProvisioningSettings;
use crate::container::{ContainerKind, ContainerSpec, ServerCredentials};
use crate::error::{ErrorCode, ErrorDescriber, VpnError, VpnResult};
use crate::store::{ConfigStore, ServerId, ServerRecord};
use crate::validation;

pub const WAIT_NOTICE: &str = "Please wait, configuring process may take up to 5 minutes";
pub const SERVER_INSTALLED: &str = "VPN server installed";
pub const OPERATION_FINISHED: &str = "Operation finished";

/// Result of removing a container.
///
/// The local entry is always gone; `remote_error` reports whether the
/// server side teardown failed.
#[derive(Debug)]
pub struct RemovalOutcome {
    pub container: ContainerKind,
    pub remote_error: Option<VpnError>,
    /// Default container after the removal
    pub default_container: Option<ContainerKind>,
}

impl RemovalOutcome {
    pub fn is_clean(&self) -> bool {
        self.remote_error.is_none()
    }
}

/// Holds a server endpoint for the duration of one operation
struct ServerGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    endpoint: String,
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&self.endpoint);
    }
}

/// Runs remote container setup/teardown while driving a [`Feedback`]
/// surface.
///
/// Operations run to completion; there is no cancellation and no timeout
/// beyond what the transport imposes.
pub struct ProvisioningOrchestrator {
    transport: Arc<dyn RemoteTransport>,
    errors: Arc<dyn ErrorDescriber>,
    settings: ProvisioningSettings,
    busy: Arc<Mutex<HashSet<String>>>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        errors: Arc<dyn ErrorDescriber>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            transport,
            errors,
            settings,
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn acquire(&self, credentials: &ServerCredentials) -> VpnResult<ServerGuard> {
        let endpoint = credentials.endpoint();
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(endpoint.clone()) {
            warn!("Rejecting concurrent operation on {}", endpoint);
            return Err(VpnError::Busy(format!(
                "Another operation is already running on {}",
                endpoint
            )));
        }
        Ok(ServerGuard {
            busy: self.busy.clone(),
            endpoint,
        })
    }

    /// Install every container of `batch` in order.
    ///
    /// Stops at the first failure; containers installed before it stay on
    /// the server. Nothing is written to the config store.
    pub async fn install_batch(
        &self,
        credentials: &ServerCredentials,
        batch: &ProvisioningBatch,
        feedback: &Feedback<'_>,
    ) -> VpnResult<Vec<ContainerKind>> {
        if batch.is_empty() {
            debug!("Nothing to install on {}", credentials.host_name);
            return Ok(Vec::new());
        }
        let _guard = self.acquire(credentials)?;

        begin(feedback);

        let total = batch.len();
        let mut installed = Vec::with_capacity(total);
        for (index, spec) in batch.iter().enumerate() {
            feedback.progress.set_value(0);
            feedback.progress.set_text_visible(true);
            feedback.progress.set_text(&format!("Installing {} of {}", index + 1, total));
            info!(
                "Installing {} on {} ({}/{})",
                spec.kind, credentials.host_name, index + 1, total
            );

            if let Err(code) = self.setup(credentials, spec, feedback.progress).await {
                restore_after_failure(feedback);
                return Err(self.setup_failure(credentials, spec.kind, code));
            }

            self.fast_forward(feedback.progress).await;
            installed.push(spec.kind);
        }

        feedback.buttons.set_visible(true);
        feedback.page.set_enabled(true);
        feedback.label.set_text(SERVER_INSTALLED);
        info!("Installed {} container(s) on {}", installed.len(), credentials.host_name);

        Ok(installed)
    }

    /// Install one container. Nothing is written to the config store.
    pub async fn install_single(
        &self,
        credentials: &ServerCredentials,
        spec: &ContainerSpec,
        feedback: &Feedback<'_>,
    ) -> VpnResult<()> {
        spec.config.validate()?;
        let _guard = self.acquire(credentials)?;

        feedback.progress.set_visible(true);
        begin(feedback);
        feedback.progress.set_value(0);
        info!("Installing {} on {}", spec.kind, credentials.host_name);

        if let Err(code) = self.setup(credentials, spec, feedback.progress).await {
            restore_after_failure(feedback);
            feedback.progress.set_visible(false);
            return Err(self.setup_failure(credentials, spec.kind, code));
        }

        self.fast_forward(feedback.progress).await;

        feedback.progress.set_visible(false);
        feedback.buttons.set_visible(true);
        feedback.page.set_enabled(true);
        feedback.label.set_text(OPERATION_FINISHED);
        Ok(())
    }

    /// Remove a container from the server and from the local config.
    ///
    /// The local entry is removed even when the remote teardown fails; the
    /// failure is reported in the outcome rather than as an error. If the
    /// local update fails too, both failures are returned together.
    pub async fn remove_single(
        &self,
        store: &dyn ConfigStore,
        server: ServerId,
        container: ContainerKind,
    ) -> VpnResult<RemovalOutcome> {
        let credentials = store.server_credentials(server).await?;
        let _guard = self.acquire(&credentials)?;

        info!("Removing {} from {}", container, credentials.host_name);
        let remote_error = match self.transport.remove_container(&credentials, container).await {
            Ok(()) => None,
            Err(code) => {
                let message = self.errors.describe(code);
                warn!(
                    "Remote removal of {} from {} failed ({}): {}",
                    container, credentials.host_name, code, message
                );
                Some(VpnError::RemoteRemovalFailure {
                    container,
                    code,
                    message,
                })
            }
        };

        if let Err(local) = store.remove_container_config(server, container).await {
            warn!("Could not remove {} from the config of server {}: {}", container, server, local);
            return Err(match remote_error {
                Some(remote) => VpnError::RemovalIncomplete {
                    remote: Box::new(remote),
                    local: Box::new(local),
                },
                None => local,
            });
        }
        let default_container = store.default_container(server).await?;
        debug!("Default container of server {} is now {:?}", server, default_container);

        Ok(RemovalOutcome {
            container,
            remote_error,
            default_container,
        })
    }

    /// Install `batch` on a new server and persist it as the default server.
    ///
    /// Nothing is stored when any container fails to install.
    pub async fn provision_server(
        &self,
        store: &dyn ConfigStore,
        credentials: ServerCredentials,
        batch: &ProvisioningBatch,
        feedback: &Feedback<'_>,
    ) -> VpnResult<ServerId> {
        if batch.is_empty() {
            return Err(VpnError::RejectedPrecondition(
                "No VPN protocols selected".to_string(),
            ));
        }
        validation::validate_credentials(&credentials)?;
        batch.validate()?;

        let installed = self.install_batch(&credentials, batch, feedback).await?;

        let mut record = ServerRecord::new(credentials, store.next_available_server_name().await);
        for spec in batch {
            record.set_container_config(spec.kind, spec.config.clone());
        }
        record.set_default_container(installed.first().copied())?;

        let id = store.add_server(record).await?;
        store.set_default_server(id).await?;
        Ok(id)
    }

    /// Install one more container on a stored server and make it the default
    pub async fn add_container(
        &self,
        store: &dyn ConfigStore,
        server: ServerId,
        spec: &ContainerSpec,
        feedback: &Feedback<'_>,
    ) -> VpnResult<()> {
        let credentials = store.server_credentials(server).await?;
        if !credentials.have_auth_data() {
            return Err(VpnError::RejectedPrecondition(
                "Server credentials are incomplete".to_string(),
            ));
        }

        self.install_single(&credentials, spec, feedback).await?;

        store.set_container_config(server, spec.kind, spec.config.clone()).await?;
        store.set_default_container(server, Some(spec.kind)).await?;
        Ok(())
    }

    async fn setup(
        &self,
        credentials: &ServerCredentials,
        spec: &ContainerSpec,
        progress: &dyn ProgressControl,
    ) -> Result<(), ErrorCode> {
        let result = self
            .with_heartbeat(
                progress,
                self.transport.setup_container(credentials, spec.kind, &spec.config),
            )
            .await;
        self.transport.disconnect_from_host(credentials).await;
        result
    }

    fn setup_failure(
        &self,
        credentials: &ServerCredentials,
        container: ContainerKind,
        code: ErrorCode,
    ) -> VpnError {
        let description = self.errors.describe(code);
        error!(
            "Setup of {} on {} failed ({}): {}",
            container, credentials.host_name, code, description
        );
        VpnError::RemoteSetupFailure {
            container,
            code,
            message: format!("Error occurred while configuring server.\n{}", description),
        }
    }

    /// Await `call`, bumping progress once per heartbeat period meanwhile
    async fn with_heartbeat<F, T>(&self, progress: &dyn ProgressControl, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let period = self.settings.heartbeat();
        if period.is_zero() {
            return call.await;
        }

        tokio::pin!(call);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                result = &mut call => return result,
                _ = ticker.tick() => {
                    let value = progress.value();
                    if value < progress.maximum() {
                        progress.set_value(value + 1);
                    }
                }
            }
        }
    }

    /// Step progress up to its maximum
    async fn fast_forward(&self, progress: &dyn ProgressControl) {
        let step = self.settings.fast_forward_step();
        let remaining = progress.maximum().saturating_sub(progress.value());
        for _ in 0..remaining {
            if !step.is_zero() {
                time::sleep(step).await;
            }
            progress.set_value(progress.value().saturating_add(1));
        }
    }
}

fn begin(feedback: &Feedback<'_>) {
    feedback.page.set_enabled(false);
    feedback.buttons.set_visible(false);
    feedback.label.set_visible(true);
    feedback.label.set_text(WAIT_NOTICE);
}

fn restore_after_failure(feedback: &Feedback<'_>) {
    feedback.page.set_enabled(true);
    feedback.buttons.set_visible(true);
    feedback.label.set_visible(false);
}
