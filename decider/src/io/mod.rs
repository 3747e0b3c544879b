//! Side-effecting helpers: definition loading, configuration, transport.

pub mod config;
pub mod loader;
pub mod transport;
