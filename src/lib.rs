//! Litchi CFB - OLE2 Compound File Binary Format storage engine
//!
//! This library reads, edits and writes OLE2 structured storage files, the
//! container format behind legacy Microsoft Office documents (.doc, .xls,
//! .ppt) and many other Windows formats.
//!
//! # Features
//!
//! - **Reader**: Header, DIFAT, FAT, MiniFAT and directory validation with
//!   bounded, cycle-checked chain walks
//! - **Editing**: Create, rewrite, rename, move and remove storages and
//!   streams in memory, with copy-on-write over the source bytes
//! - **Writer**: Compacting serializer that only needs [`std::io::Write`]
//! - **512 and 4096 byte sectors**, including DIFAT for large files
//! - **Diagnostics**: ZIP, raw XML and raw BIFF inputs are reported as such
//!
//! # Example - Reading a compound file
//!
//! ```no_run
//! use std::fs::File;
//! use litchi_cfb::ole::OleFileSystem;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = OleFileSystem::open(File::open("document.doc")?)?;
//!
//! // List all streams
//! for path in fs.list_streams() {
//!     println!("Stream: {}", path);
//! }
//!
//! // Read a specific stream
//! let data = fs.open_stream("WordDocument")?;
//! println!("Stream size: {} bytes", data.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Writing a compound file
//!
//! ```
//! use litchi_cfb::ole::OleFileSystem;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut fs = OleFileSystem::new();
//! fs.create_storage("Data")?;
//! fs.create_stream("Data/Stream1", b"Hello, World!")?;
//!
//! let bytes = fs.to_bytes()?;
//! let reopened = OleFileSystem::from_bytes(bytes)?;
//! assert_eq!(reopened.open_stream("Data/Stream1")?, b"Hello, World!");
//! # Ok(())
//! # }
//! ```

/// Common helpers shared by the container code
pub mod common;

/// OLE2 (Object Linking and Embedding) compound file storage
///
/// This module provides functionality to parse, edit and write OLE2
/// structured storage files.
pub mod ole;

// Re-export commonly used types for convenience
pub use ole::{OleError, OleFileSystem};
