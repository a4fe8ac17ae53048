//! Container family type enumeration.

use std::fmt;

/// Container families that can be told apart from the first bytes of a file.
///
/// Only [`ContainerFamily::Ole2`] can be opened by this crate; the other
/// variants exist so callers can route the input to a different parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFamily {
    /// OLE2 Compound File Binary container
    Ole2,
    /// ZIP-based container (OOXML .docx/.xlsx/.pptx, ODF)
    OfficeXml,
    /// Raw XML document (e.g. Office 2003 XML)
    RawXml,
    /// Bare spreadsheet record stream without an OLE2 wrapper
    RawRecords(RawRecordFormat),
    /// Anything else
    Unknown,
}

/// Raw BIFF record-stream flavours recognised by their leading BOF record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawRecordFormat {
    Biff2,
    Biff3,
    Biff4,
    /// BIFF5 or BIFF8 workbook stream saved without its container
    Biff5,
}

impl fmt::Display for RawRecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RawRecordFormat::Biff2 => "BIFF2",
            RawRecordFormat::Biff3 => "BIFF3",
            RawRecordFormat::Biff4 => "BIFF4",
            RawRecordFormat::Biff5 => "BIFF5/BIFF8",
        };
        f.write_str(name)
    }
}
