//! CLI command implementations.

pub mod common;
pub mod decompose;
pub mod locations;
pub mod plugins;
pub mod version;
