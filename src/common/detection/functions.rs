//! Core container detection functions.

use super::types::{ContainerFamily, RawRecordFormat};
use crate::ole::consts::{
    BIFF2_BOF, BIFF3_BOF, BIFF4_BOF, BIFF5_BOF_ID, MAGIC, RAW_XML_HEADER, ZIP_LOCAL_HEADER,
};

/// Check if a byte slice starts with a given signature.
#[inline]
pub fn signature_matches(data: &[u8], signature: &[u8]) -> bool {
    data.len() >= signature.len() && &data[..signature.len()] == signature
}

/// Detect the container family from a byte prefix.
///
/// Only the first few bytes are inspected, so this is cheap enough to run
/// before any real parsing.
///
/// # Examples
///
/// ```
/// use litchi_cfb::common::detection::{ContainerFamily, detect_container};
///
/// assert_eq!(detect_container(b"PK\x03\x04rest"), ContainerFamily::OfficeXml);
/// assert_eq!(detect_container(b"hello"), ContainerFamily::Unknown);
/// ```
pub fn detect_container(data: &[u8]) -> ContainerFamily {
    if signature_matches(data, MAGIC) {
        return ContainerFamily::Ole2;
    }
    if signature_matches(data, ZIP_LOCAL_HEADER) {
        return ContainerFamily::OfficeXml;
    }
    if signature_matches(data, RAW_XML_HEADER) {
        return ContainerFamily::RawXml;
    }
    if let Some(format) = detect_raw_records(data) {
        return ContainerFamily::RawRecords(format);
    }
    ContainerFamily::Unknown
}

/// Recognise a bare BIFF stream by its BOF record header.
fn detect_raw_records(data: &[u8]) -> Option<RawRecordFormat> {
    if signature_matches(data, BIFF2_BOF) {
        return Some(RawRecordFormat::Biff2);
    }
    if signature_matches(data, BIFF3_BOF) {
        return Some(RawRecordFormat::Biff3);
    }
    if signature_matches(data, BIFF4_BOF) {
        return Some(RawRecordFormat::Biff4);
    }
    // BIFF5/8 BOF payload is 8 or 16 bytes long
    if signature_matches(data, BIFF5_BOF_ID) && data.len() >= 4 {
        let len = u16::from_le_bytes([data[2], data[3]]);
        if len == 0x08 || len == 0x10 {
            return Some(RawRecordFormat::Biff5);
        }
    }
    None
}
