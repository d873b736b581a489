//! Transport session owned by the supervisor
//!
//! This module handles:
//! - Opening the broker connection for a run
//! - Tracking live response subscriptions so each is released at most once
//! - Closing the connection exactly once on teardown
//!
//! Tasks never see the [`Session`] itself, only a [`SessionHandle`], which can
//! publish and subscribe but cannot close anything.

mod handle;
mod manager;

pub use handle::{SessionHandle, Subscription};
pub use manager::Session;
