/// Constants for OLE file format
pub mod consts;

/// Error types
pub mod error;

/// Header block parsing and generation
pub mod header;

/// FAT and MiniFAT allocation tables
pub mod fat;

/// DIFAT reading and generation
pub mod difat;

/// Mini stream and its allocator
pub mod minifat;

/// Directory entries and sibling trees
pub mod directory;

/// Sector store with copy-on-write overlay
pub mod store;

/// Append-only buffer for fragmented streams
pub mod stream;

/// Open and create options
mod options;

/// Filesystem façade
mod file;

/// Compacting writer
pub mod writer;

// Re-export public types for convenient access
pub use directory::{DirectoryEntry, EntryInfo, EntryKind, StreamLocation};
pub use error::{OleError, Result, TableKind};
pub use file::{OleFileSystem, is_ole_file};
pub use header::{Header, SectorSize};
pub use options::OleOptions;
pub use stream::StreamHolder;
