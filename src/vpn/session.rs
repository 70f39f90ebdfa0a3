use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionSettings;
use crate::error::{ErrorDescriber, VpnError, VpnResult};
use crate::store::{ConfigStore, RouteMode, ServerId};
use super::connector::{Connector, ConnectorEvent};
use super::state::{ConnectionState, SessionView};

/// Lifecycle of the single active VPN session.
///
/// The machine never changes state on its own: every transition comes from
/// a [`ConnectorEvent`]. Events, connect and disconnect requests are applied
/// one at a time, in the order they are received.
pub struct ConnectionStateMachine {
    connector: Arc<dyn Connector>,
    store: Arc<dyn ConfigStore>,
    errors: Arc<dyn ErrorDescriber>,
    settings: SessionSettings,
    view: Arc<watch::Sender<SessionView>>,
    /// Bumped on every state change so a pending cool-down can tell it is stale
    transitions: Arc<AtomicU64>,
    /// Serializes event handling with user requests
    apply_lock: Mutex<()>,
}

impl ConnectionStateMachine {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn ConfigStore>,
        errors: Arc<dyn ErrorDescriber>,
        settings: SessionSettings,
    ) -> Self {
        let (view, _) = watch::channel(SessionView::default());
        Self {
            connector,
            store,
            errors,
            settings,
            view: Arc::new(view),
            transitions: Arc::new(AtomicU64::new(0)),
            apply_lock: Mutex::new(()),
        }
    }

    /// Subscribe to session view updates
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Current session view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.view.borrow().state
    }

    /// Consume connector notifications until every sender is dropped
    pub fn spawn_event_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ConnectorEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
            debug!("Connector event queue closed");
        })
    }

    /// Apply one connector notification
    pub async fn handle_event(&self, event: ConnectorEvent) {
        let _guard = self.apply_lock.lock().await;
        match event {
            ConnectorEvent::StateChanged(state) => self.enter_state(state).await,
            ConnectorEvent::BytesChanged { received, sent } => {
                self.view.send_modify(|view| {
                    view.bytes_received = received;
                    view.bytes_sent = sent;
                });
            }
            ConnectorEvent::ProtocolError(code) => {
                let text = self.errors.describe(code);
                warn!("VPN protocol error ({}): {}", code, text);
                self.view.send_modify(|view| {
                    view.last_error = Some(code);
                    view.error_text = Some(text);
                });
            }
        }
    }

    async fn enter_state(&self, state: ConnectionState) {
        let previous = self.state();
        if previous != state {
            info!("Connection state changed: {} -> {}", previous, state);
        }

        self.view.send_modify(|view| {
            view.state = state;
            view.connect_enabled = state.connect_enabled();
            view.route_mode_editable = state.route_mode_editable();

            match state {
                ConnectionState::Disconnected => {
                    view.bytes_received = 0;
                    view.bytes_sent = 0;
                    view.connect_pending = false;
                }
                ConnectionState::Error => view.connect_enabled = false,
                _ => {}
            }
        });

        let transition = self.transitions.fetch_add(1, Ordering::SeqCst) + 1;
        if state == ConnectionState::Error {
            self.schedule_rearm(transition);
        }
    }

    /// Re-enable connect after the error cool-down unless another state
    /// change happened in the meantime.
    fn schedule_rearm(&self, transition: u64) {
        let cooldown = self.settings.error_cooldown();
        if cooldown.is_zero() {
            rearm_after_error(&self.view);
            return;
        }

        let view = self.view.clone();
        let transitions = self.transitions.clone();
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if transitions.load(Ordering::SeqCst) == transition {
                rearm_after_error(&view);
            } else {
                debug!("Error cool-down superseded by a later state change");
            }
        });
    }

    /// Connect to the default container of `server`.
    ///
    /// Refused without calling the connector when the server has no
    /// containers or no default container.
    pub async fn connect(&self, server: ServerId) -> VpnResult<()> {
        let _guard = self.apply_lock.lock().await;

        if self.store.containers(server).await?.is_empty() {
            return Err(self.reject(
                "VPN protocols are not installed.\nPlease install a VPN container first",
            ));
        }

        let Some(container) = self.store.default_container(server).await? else {
            return Err(self.reject("VPN protocol not chosen"));
        };

        let credentials = self.store.server_credentials(server).await?;
        let config = self.store.container_config(server, container).await?;

        self.view.send_modify(|view| {
            view.error_text = None;
            view.connect_pending = true;
        });

        info!("Connecting to server {} ({}) using {}", server, credentials.host_name, container);
        match self.connector.connect(&credentials, container, &config).await {
            Ok(()) => {
                self.view.send_modify(|view| view.connect_enabled = false);
                Ok(())
            }
            Err(code) => {
                let message = self.errors.describe(code);
                warn!("Connector refused connection to server {}: {}", server, message);
                self.view.send_modify(|view| {
                    view.last_error = Some(code);
                    view.error_text = Some(message.clone());
                    view.connect_pending = false;
                    view.connect_enabled = view.state.connect_enabled();
                });
                Err(VpnError::ConnectorRejected { code, message })
            }
        }
    }

    fn reject(&self, message: &str) -> VpnError {
        warn!("Connect rejected: {}", message.replace('\n', " "));
        self.view.send_modify(|view| {
            view.error_text = Some(message.to_string());
            view.connect_pending = false;
            view.connect_enabled = view.state.connect_enabled();
        });
        VpnError::RejectedPrecondition(message.to_string())
    }

    /// Request teardown of the current tunnel.
    ///
    /// Returns once the request is made; the `Disconnected` state arrives
    /// later as a connector notification.
    pub async fn disconnect(&self) {
        let _guard = self.apply_lock.lock().await;
        self.view.send_modify(|view| view.connect_pending = false);
        info!("Disconnect requested");
        self.connector.disconnect().await;
    }

    /// Connect/disconnect toggle: `checked` connects to `server`
    pub async fn toggle(&self, server: ServerId, checked: bool) -> VpnResult<()> {
        if checked {
            self.connect(server).await
        } else {
            self.disconnect().await;
            Ok(())
        }
    }

    /// Change the route mode; refused while a tunnel is up or in transition
    pub async fn set_route_mode(&self, mode: RouteMode) -> VpnResult<()> {
        if !self.view.borrow().route_mode_editable {
            return Err(VpnError::InvalidState(format!(
                "Route mode cannot be changed while {}",
                self.state().label().trim_end_matches("...").to_lowercase()
            )));
        }
        self.store.set_route_mode(mode).await?;
        info!("Route mode set to {}", mode.as_str());
        Ok(())
    }

    /// Publish the initial state and auto-connect to the default server
    /// when configured
    pub async fn start(&self) -> VpnResult<()> {
        self.handle_event(ConnectorEvent::StateChanged(ConnectionState::Disconnected)).await;

        if !self.settings.auto_connect {
            return Ok(());
        }
        let Some(server) = self.store.default_server().await else {
            debug!("Auto-connect enabled but no default server is set");
            return Ok(());
        };

        tokio::time::sleep(self.settings.auto_connect_delay()).await;
        self.view.send_modify(|view| view.connect_enabled = false);
        info!("Auto-connecting to server {}", server);
        self.connect(server).await
    }

    /// Disconnect and wait a bounded time for the connector to confirm.
    ///
    /// Returns `false` when the wait timed out and teardown was forced.
    pub async fn shutdown(&self) -> bool {
        info!("Shutting down VPN session");
        self.connector.disconnect().await;

        let attempts = self.settings.shutdown_poll_attempts;
        let interval = self.settings.shutdown_poll_interval();
        for _ in 0..attempts {
            if self.connector.is_disconnected().await {
                info!("VPN session closed");
                return true;
            }
            tokio::time::sleep(interval).await;
        }

        warn!(
            "Connector still connected after {} checks, forcing teardown",
            attempts
        );
        false
    }
}

fn rearm_after_error(view: &watch::Sender<SessionView>) {
    view.send_if_modified(|view| {
        if view.state == ConnectionState::Error && !view.connect_enabled {
            view.connect_enabled = true;
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerConfig, ContainerKind, ServerCredentials};
    use crate::error::{ErrorCatalog, ErrorCode};
    use crate::store::{ServerRecord, ServerStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeConnector {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        refuse: Option<ErrorCode>,
        disconnected: AtomicBool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            _credentials: &ServerCredentials,
            _container: ContainerKind,
            _config: &ContainerConfig,
        ) -> Result<(), ErrorCode> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.refuse {
                Some(code) => Err(code),
                None => Ok(()),
            }
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn is_disconnected(&self) -> bool {
            self.disconnected.load(Ordering::SeqCst)
        }
    }

    fn quick_settings() -> SessionSettings {
        SessionSettings {
            error_cooldown_ms: 0,
            shutdown_poll_interval_ms: 1,
            shutdown_poll_attempts: 3,
            auto_connect: false,
            auto_connect_delay_ms: 0,
        }
    }

    async fn machine_with(connector: Arc<FakeConnector>, record: ServerRecord) -> (ConnectionStateMachine, ServerId) {
        let store = Arc::new(ServerStore::in_memory());
        let id = store.add_server(record).await.unwrap();
        store.set_default_server(id).await.unwrap();
        let errors = Arc::new(ErrorCatalog::new().with(ErrorCode(9), "Tunnel handshake failed"));
        (ConnectionStateMachine::new(connector, store, errors, quick_settings()), id)
    }

    fn installed_record() -> ServerRecord {
        let mut record = ServerRecord::new(ServerCredentials::new("192.0.2.1", "root", "pw"), "Server 1");
        record.set_container_config(ContainerKind::OpenVpn, ContainerConfig::default());
        record.default_container = Some(ContainerKind::OpenVpn);
        record
    }

    #[tokio::test]
    async fn test_disconnected_resets_counters() {
        let (machine, _) = machine_with(Arc::new(FakeConnector::default()), installed_record()).await;

        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Connected)).await;
        machine.handle_event(ConnectorEvent::BytesChanged { received: 4096, sent: 512 }).await;
        assert_eq!(machine.view().bytes_received, 4096);

        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Disconnected)).await;
        let view = machine.view();
        assert_eq!((view.bytes_received, view.bytes_sent), (0, 0));
        assert!(view.route_mode_editable);
    }

    #[tokio::test]
    async fn test_protocol_error_does_not_change_state() {
        let (machine, _) = machine_with(Arc::new(FakeConnector::default()), installed_record()).await;

        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Connected)).await;
        machine.handle_event(ConnectorEvent::ProtocolError(ErrorCode(9))).await;

        let view = machine.view();
        assert_eq!(view.state, ConnectionState::Connected);
        assert_eq!(view.last_error, Some(ErrorCode(9)));
        assert_eq!(view.error_text.as_deref(), Some("Tunnel handshake failed"));
    }

    #[tokio::test]
    async fn test_connect_without_containers_is_rejected() {
        let connector = Arc::new(FakeConnector::default());
        let record = ServerRecord::new(ServerCredentials::new("192.0.2.1", "root", "pw"), "Server 1");
        let (machine, id) = machine_with(connector.clone(), record).await;

        let err = machine.connect(id).await.unwrap_err();
        assert!(matches!(err, VpnError::RejectedPrecondition(_)));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(!machine.view().connect_pending);
    }

    #[tokio::test]
    async fn test_connect_accepted_arms_pending() {
        let connector = Arc::new(FakeConnector::default());
        let (machine, id) = machine_with(connector.clone(), installed_record()).await;

        machine.connect(id).await.unwrap();
        let view = machine.view();
        assert!(view.connect_pending);
        assert!(!view.connect_enabled);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connector_refusal_latches_error_without_transition() {
        let connector = Arc::new(FakeConnector {
            refuse: Some(ErrorCode(9)),
            ..Default::default()
        });
        let (machine, id) = machine_with(connector, installed_record()).await;

        let err = machine.connect(id).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode(9)));

        let view = machine.view();
        assert_eq!(view.state, ConnectionState::Disconnected);
        assert!(!view.connect_pending);
        assert!(view.connect_enabled);
        assert_eq!(view.error_text.as_deref(), Some("Tunnel handshake failed"));
    }

    fn cooling_machine(connector: Arc<FakeConnector>) -> ConnectionStateMachine {
        let mut settings = quick_settings();
        settings.error_cooldown_ms = 300;
        ConnectionStateMachine::new(
            connector,
            Arc::new(ServerStore::in_memory()),
            Arc::new(ErrorCatalog::new()),
            settings,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_rearms_after_cooldown() {
        let connector = Arc::new(FakeConnector::default());
        let machine = cooling_machine(connector.clone());

        let started = tokio::time::Instant::now();
        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Error)).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(machine.state(), ConnectionState::Error);
        assert!(!machine.view().connect_enabled);

        // requests are not held up by the cool-down
        machine.disconnect().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!machine.view().connect_enabled);

        tokio::time::sleep(Duration::from_millis(151)).await;
        assert!(machine.view().connect_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cooldown_does_not_rearm_later_error() {
        let machine = cooling_machine(Arc::new(FakeConnector::default()));

        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Error)).await;
        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Connecting)).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Error)).await;

        // first timer fires here and must be ignored
        tokio::time::sleep(Duration::from_millis(101)).await;
        assert!(!machine.view().connect_enabled);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(machine.view().connect_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_ignored_after_leaving_error() {
        let machine = cooling_machine(Arc::new(FakeConnector::default()));

        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Error)).await;
        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Connecting)).await;
        assert!(!machine.view().connect_enabled);

        tokio::time::sleep(Duration::from_millis(301)).await;
        let view = machine.view();
        assert_eq!(view.state, ConnectionState::Connecting);
        assert!(!view.connect_enabled);
    }

    #[tokio::test]
    async fn test_route_mode_locked_while_connected() {
        let (machine, _) = machine_with(Arc::new(FakeConnector::default()), installed_record()).await;

        machine.set_route_mode(RouteMode::ForwardSites).await.unwrap();

        machine.handle_event(ConnectorEvent::StateChanged(ConnectionState::Connected)).await;
        assert!(matches!(
            machine.set_route_mode(RouteMode::AllSites).await,
            Err(VpnError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_gives_up_after_bounded_polls() {
        let connector = Arc::new(FakeConnector::default());
        let (machine, _) = machine_with(connector.clone(), installed_record()).await;

        assert!(!machine.shutdown().await);
        assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);

        connector.disconnected.store(true, Ordering::SeqCst);
        assert!(machine.shutdown().await);
    }

    #[tokio::test]
    async fn test_event_loop_applies_in_order() {
        let (machine, _) = machine_with(Arc::new(FakeConnector::default()), installed_record()).await;
        let machine = Arc::new(machine);
        let (tx, rx) = crate::vpn::connector_channel();
        let handle = machine.clone().spawn_event_loop(rx);

        tx.send(ConnectorEvent::StateChanged(ConnectionState::Connecting)).unwrap();
        tx.send(ConnectorEvent::StateChanged(ConnectionState::Connected)).unwrap();
        tx.send(ConnectorEvent::BytesChanged { received: 10, sent: 20 }).unwrap();
        tx.send(ConnectorEvent::StateChanged(ConnectionState::Disconnected)).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        let view = machine.view();
        assert_eq!(view.state, ConnectionState::Disconnected);
        assert_eq!(view.bytes_received, 0);
    }
}
