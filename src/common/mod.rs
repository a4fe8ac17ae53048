//! Common types and utilities shared across the crate.

// Submodule declarations
pub mod binary;
pub mod bitfield;
pub mod detection;

// Re-exports for convenience
pub use detection::{ContainerFamily, detect_container};
