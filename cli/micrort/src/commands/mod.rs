//! CLI command implementations.

pub mod compile;
pub mod config;
pub mod device;
pub mod session;
