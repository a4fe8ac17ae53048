//! OLE2 file writing module
//!
//! Serializes an [`OleFileSystem`](super::OleFileSystem) into a fresh,
//! compacted compound file.

/// MiniFAT (Mini File Allocation Table) generation
mod minifat;

/// FAT/DIFAT sector count fixed point
mod layout;

/// Core serializer
mod core;

/// Integration tests for the writer
#[cfg(test)]
mod tests;

pub use layout::{FatLayout, fat_layout};
pub use minifat::MiniFatBuilder;
