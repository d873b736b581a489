//! Command/response bridge for MQTT sensor nodes
//!
//! Publishes command envelopes to `command/<id>/req/`, listens on
//! `command/<id>/resp/` and correlates what comes back, with every task of a
//! run owned by a [`supervisor::TaskSupervisor`].

pub mod command;
pub mod config;
pub mod error;
pub mod listener;
pub mod scenarios;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use command::{CommandDispatcher, DispatchPlan, PendingCommands};
pub use config::{BridgeConfig, BrokerConfig, ProtocolVersion};
pub use error::{BridgeError, CancellationFailure};
pub use listener::{ListenSummary, ResponseListener};
pub use scenarios::Scenario;
pub use session::{Session, SessionHandle, Subscription};
pub use supervisor::{RunReport, SupervisorState, TaskSupervisor};
pub use transport::{QoS, Transport, TransportError};
