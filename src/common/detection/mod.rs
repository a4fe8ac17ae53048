//! Container family detection.
//!
//! The detection is based on file signatures (magic numbers) and reads only the
//! minimal amount of data required for identification. It backs the diagnostic
//! errors raised when a non-OLE2 byte stream is handed to the OLE2 parser.

// Submodule declarations
pub mod functions;
pub mod types;

// Re-exports
pub use functions::{detect_container, signature_matches};
pub use types::{ContainerFamily, RawRecordFormat};
