//! Simulated sensor nodes
//!
//! Each node subscribes its request topic, applies commands to an in-memory
//! copy of the firmware state and answers on its response topic with the
//! request's correlation id.

pub mod node;
pub mod state;

pub use node::SimulatedNode;
pub use state::DeviceState;
