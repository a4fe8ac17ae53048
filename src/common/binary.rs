//! Binary data helpers shared by the container structures.
//!
//! This module decodes little-endian entry arrays and UTF-16LE names as they
//! appear in compound file sectors.

use zerocopy::{FromBytes, LE, U32};

/// Decode a sector full of little-endian u32 entries.
///
/// Trailing bytes that do not form a whole entry are ignored.
pub fn read_u32_array_le(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .filter_map(|chunk| U32::<LE>::read_from_bytes(chunk).ok())
        .map(|value| value.get())
        .collect()
}

/// Decode a UTF-16LE name, stopping at the first null code unit.
///
/// Invalid surrogate sequences are replaced rather than rejected, since
/// names written by other tools are not always well formed.
///
/// # Examples
///
/// ```
/// use litchi_cfb::common::binary::parse_utf16le_string;
/// let data = vec![0x48, 0x00, 0x65, 0x00, 0x6C, 0x00, 0x6C, 0x00, 0x6F, 0x00, 0x00, 0x00];
/// assert_eq!(parse_utf16le_string(&data), "Hello");
/// ```
pub fn parse_utf16le_string(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}
