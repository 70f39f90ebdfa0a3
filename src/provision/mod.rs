//! Remote provisioning of VPN containers
//!
//! The [`ProvisioningOrchestrator`] installs and removes containers on a
//! user-owned server through a [`RemoteTransport`], reporting progress to an
//! optional [`Feedback`] surface. Only the higher level helpers
//! (`provision_server`, `add_container`, `remove_single`) touch the config
//! store.

pub mod batch;
pub mod feedback;
pub mod orchestrator;
pub mod overview;
pub mod transport;

pub use batch::{NewServerSelection, ProvisioningBatch};
pub use feedback::{
    ButtonControl, Feedback, FeedbackState, LabelControl, ObservableFeedback, PageControl,
    ProgressControl, Silent,
};
pub use orchestrator::{ProvisioningOrchestrator, RemovalOutcome};
pub use overview::{ProtocolStatus, ProtocolsOverview};
pub use transport::RemoteTransport;
