//! Command dispatch and correlation tracking
//!
//! This module handles:
//! - Publishing command envelopes, in sequence or fanned out to many devices
//! - Tracking issued commands until a device answers them

mod dispatcher;
mod pending;

pub use dispatcher::{CommandDispatcher, DispatchPlan};
pub use pending::{PendingCommand, PendingCommands};
