//! Error types for compound file parsing and writing.
//!
//! Every failure a corrupt or foreign container can cause has its own variant,
//! so callers can tell "route this to another parser" apart from "this file is
//! damaged" without matching on message strings.

use std::fmt;

use thiserror::Error;

use crate::common::detection::RawRecordFormat;

/// Which allocation structure a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Main file allocation table
    Fat,
    /// Mini allocation table (64-byte sectors inside the mini stream)
    MiniFat,
    /// Double-indirect FAT sector chain
    Difat,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableKind::Fat => "FAT",
            TableKind::MiniFat => "MiniFAT",
            TableKind::Difat => "DIFAT",
        })
    }
}

/// Error types for OLE file parsing and writing
#[derive(Error, Debug)]
pub enum OleError {
    /// IO error from the underlying source or sink
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The data is a ZIP-based container (OOXML, ODF), not OLE2
    #[error(
        "The supplied data appears to be in the Office 2007+ XML format (ZIP container), not OLE2"
    )]
    OfficeXmlFile,

    /// The data is a raw spreadsheet record stream without an OLE2 wrapper
    #[error("The supplied data appears to be a raw {0} record stream, not an OLE2 container")]
    OldBinaryFormat(RawRecordFormat),

    /// The data is a plain XML document
    #[error("The supplied data appears to be a raw XML file, not an OLE2 container")]
    RawXmlFile,

    /// Header signature does not match the OLE2 magic
    #[error("Invalid header signature; read {found:#018X}, expected {expected:#018X}")]
    InvalidSignature { found: u64, expected: u64 },

    /// Sector shift is neither 9 (512 bytes) nor 12 (4096 bytes)
    #[error("Unsupported sector size: shift {0}")]
    UnsupportedSectorSize(u16),

    /// Other header field is invalid
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Fewer bytes are available than a structure requires
    #[error("Truncated data reading {context}: needed {needed} bytes, {available} available")]
    Truncated {
        context: String,
        needed: u64,
        available: u64,
    },

    /// A chain revisits a sector it already passed through
    #[error("Corrupt {table} chain: cycle detected at sector {sector}")]
    ChainCycle { table: TableKind, sector: u32 },

    /// A chain points outside its allocation table
    #[error("Corrupt {table} chain: sector {sector} is outside the table of {limit} entries")]
    ChainOutOfRange {
        table: TableKind,
        sector: u32,
        limit: u32,
    },

    /// A chain link holds a reserved value other than end-of-chain
    #[error("Corrupt {table} chain: sector {sector} links to reserved value {value:#010X}")]
    ChainInvalidLink {
        table: TableKind,
        sector: u32,
        value: u32,
    },

    /// A stream's chain does not cover its declared size
    #[error("Corrupt {table} chain: declared size {declared} bytes, chain holds {available} bytes")]
    ChainLengthMismatch {
        table: TableKind,
        declared: u64,
        available: u64,
    },

    /// A directory link points outside the directory table
    #[error("Corrupt directory: entry {sid} is outside the table of {limit} entries")]
    DirectoryIndexOutOfRange { sid: u32, limit: u32 },

    /// A directory entry is reachable more than once
    #[error("Corrupt directory: entry {sid} is reachable more than once")]
    DirectoryCycle { sid: u32 },

    /// Root entry missing, misplaced, or duplicated
    #[error("Invalid root entry: {0}")]
    InvalidRoot(String),

    /// Other directory corruption
    #[error("Corrupt directory: {0}")]
    CorruptDirectory(String),

    /// No entry at the given path
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// An entry with the same name already exists under the parent
    #[error("Entry already exists: {0}")]
    EntryExists(String),

    /// The entry is not a stream
    #[error("Not a stream: {0}")]
    NotAStream(String),

    /// The entry is not a storage
    #[error("Not a storage: {0}")]
    NotAStorage(String),

    /// The entry name cannot be stored
    #[error("Invalid entry name: {0}")]
    InvalidName(String),

    /// The path cannot address an entry
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The container would need more sectors than the format can address
    #[error("Container too large: {0}")]
    ContainerTooLarge(String),
}

impl OleError {
    /// True when the input belongs to another container family and should be
    /// handed to a different parser.
    pub fn is_wrong_container_family(&self) -> bool {
        matches!(
            self,
            OleError::OfficeXmlFile | OleError::OldBinaryFormat(_) | OleError::RawXmlFile
        )
    }

    /// True for errors caused by missing bytes.
    pub fn is_truncation(&self) -> bool {
        matches!(self, OleError::Truncated { .. })
    }

    /// True for broken allocation chains.
    pub fn is_chain_integrity(&self) -> bool {
        matches!(
            self,
            OleError::ChainCycle { .. }
                | OleError::ChainOutOfRange { .. }
                | OleError::ChainInvalidLink { .. }
                | OleError::ChainLengthMismatch { .. }
        )
    }

    /// True for a damaged directory hierarchy.
    pub fn is_directory_integrity(&self) -> bool {
        matches!(
            self,
            OleError::DirectoryIndexOutOfRange { .. }
                | OleError::DirectoryCycle { .. }
                | OleError::InvalidRoot(_)
                | OleError::CorruptDirectory(_)
        )
    }

    pub(crate) fn truncated(context: impl Into<String>, needed: u64, available: u64) -> Self {
        OleError::Truncated {
            context: context.into(),
            needed,
            available,
        }
    }
}

/// Result type for compound file operations
pub type Result<T> = std::result::Result<T, OleError>;
