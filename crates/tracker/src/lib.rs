//! Tracker registry mapping resources to the peers that hold them.

mod registry;

pub use registry::{RegistryStats, SwarmRegistry};
