//! Application module
//!
//! Wires the cluster client, the pod watch and the consumer loop together
//! and runs them until a fatal error or a termination signal.

pub mod builder;
pub mod core;
pub mod tasks;

// Re-export main types
pub use builder::ApplicationBuilder;
pub use core::Application;
