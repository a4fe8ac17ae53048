//! OLE2 header block
//!
//! Parses and generates the 512-byte OLE2 file header with magic bytes,
//! version information, and FAT/directory locations. For 4096-byte sector
//! files the header occupies a full sector and the remainder is zero filled.

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, IntoBytes, LE, U16, U32};
use zerocopy_derive::{FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout};

use super::consts::*;
use super::error::{OleError, Result};
use crate::common::detection::{ContainerFamily, detect_container};

/// Sector size class of a compound file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SectorSize {
    /// 512-byte sectors (major version 3)
    #[default]
    Small,
    /// 4096-byte sectors (major version 4)
    Large,
}

impl SectorSize {
    /// Resolve a header sector shift
    pub fn from_shift(shift: u16) -> Result<Self> {
        match shift {
            SECTOR_SHIFT_V3 => Ok(SectorSize::Small),
            SECTOR_SHIFT_V4 => Ok(SectorSize::Large),
            other => Err(OleError::UnsupportedSectorSize(other)),
        }
    }

    /// Sector size in bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            SectorSize::Small => SECTOR_SIZE_V3,
            SectorSize::Large => SECTOR_SIZE_V4,
        }
    }

    /// Sector shift stored in the header
    pub const fn shift(self) -> u16 {
        match self {
            SectorSize::Small => SECTOR_SHIFT_V3,
            SectorSize::Large => SECTOR_SHIFT_V4,
        }
    }

    /// Major (DLL) version that goes with this sector size
    pub const fn major_version(self) -> u16 {
        match self {
            SectorSize::Small => 3,
            SectorSize::Large => 4,
        }
    }

    /// Number of 4-byte allocation entries per sector
    #[inline]
    pub const fn entries_per_sector(self) -> usize {
        self.bytes() / 4
    }

    /// Number of FAT locations per DIFAT sector (last slot is the next pointer)
    #[inline]
    pub const fn difat_entries_per_sector(self) -> usize {
        self.entries_per_sector() - 1
    }

    /// Number of directory entries per sector
    #[inline]
    pub const fn dir_entries_per_sector(self) -> usize {
        self.bytes() / DIRENTRY_SIZE
    }

    /// Number of sectors needed to hold `len` bytes
    #[inline]
    pub fn sectors_for(self, len: u64) -> u64 {
        len.div_ceil(self.bytes() as u64)
    }

    /// Byte offset of a sector in the file (sector 0 follows the header block)
    #[inline]
    pub fn offset_of(self, sector: u32) -> u64 {
        (sector as u64 + 1) * self.bytes() as u64
    }
}

/// Raw OLE header structure (512 bytes)
///
/// This represents the on-disk format of the header.
/// Based on Microsoft OLE2 specification.
#[derive(Debug, Clone, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawHeader {
    /// Magic signature
    signature: [u8; 8],
    /// Reserved class id, must be zero
    clsid: [u8; 16],
    /// Minor version (0x003E)
    minor_version: U16<LE>,
    /// Major (DLL) version, 3 or 4
    major_version: U16<LE>,
    /// Byte order mark (0xFFFE)
    byte_order: U16<LE>,
    /// Sector shift, 9 or 12
    sector_shift: U16<LE>,
    /// Mini sector shift, 6
    mini_sector_shift: U16<LE>,
    /// Reserved
    reserved: [u8; 6],
    /// Number of directory sectors (0 for 512-byte sectors)
    num_dir_sectors: U32<LE>,
    /// Number of FAT sectors
    num_fat_sectors: U32<LE>,
    /// First directory sector
    first_dir_sector: U32<LE>,
    /// Transaction signature
    transaction_signature: U32<LE>,
    /// Mini stream cutoff size
    mini_stream_cutoff: U32<LE>,
    /// First MiniFAT sector
    first_minifat_sector: U32<LE>,
    /// Number of MiniFAT sectors
    num_minifat_sectors: U32<LE>,
    /// First DIFAT sector
    first_difat_sector: U32<LE>,
    /// Number of DIFAT sectors
    num_difat_sectors: U32<LE>,
    /// First 109 FAT sector locations
    difat: [U32<LE>; HEADER_DIFAT_SLOTS],
}

/// Parsed OLE2 header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Sector size class
    pub sector_size: SectorSize,
    /// Minor version
    pub minor_version: u16,
    /// Number of directory sectors (always 0 for 512-byte sector files)
    pub num_dir_sectors: u32,
    /// Number of FAT sectors
    pub num_fat_sectors: u32,
    /// First sector of directory chain
    pub first_dir_sector: u32,
    /// Transaction signature number
    pub transaction_signature: u32,
    /// Streams below this size live in the mini stream
    pub mini_stream_cutoff: u32,
    /// First sector of MiniFAT chain
    pub first_minifat_sector: u32,
    /// Number of MiniFAT sectors
    pub num_minifat_sectors: u32,
    /// First DIFAT sector
    pub first_difat_sector: u32,
    /// Number of DIFAT sectors
    pub num_difat_sectors: u32,
    /// FAT sector locations stored inline (first 109)
    pub difat: [u32; HEADER_DIFAT_SLOTS],
}

impl Header {
    /// Create a header for an empty container
    pub fn new(sector_size: SectorSize) -> Self {
        Self {
            sector_size,
            minor_version: MINOR_VERSION,
            num_dir_sectors: 0,
            num_fat_sectors: 0,
            first_dir_sector: ENDOFCHAIN,
            transaction_signature: 0,
            mini_stream_cutoff: MINI_STREAM_CUTOFF,
            first_minifat_sector: ENDOFCHAIN,
            num_minifat_sectors: 0,
            first_difat_sector: ENDOFCHAIN,
            num_difat_sectors: 0,
            difat: [FREESECT; HEADER_DIFAT_SLOTS],
        }
    }

    /// Parse a header from the start of a file
    ///
    /// The signature is checked first. On mismatch the leading bytes are
    /// inspected so that ZIP containers, raw XML and raw BIFF record streams
    /// fail with their own error instead of a generic signature error.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !data.starts_with(MAGIC) {
            match detect_container(data) {
                ContainerFamily::OfficeXml => return Err(OleError::OfficeXmlFile),
                ContainerFamily::RawXml => return Err(OleError::RawXmlFile),
                ContainerFamily::RawRecords(format) => {
                    return Err(OleError::OldBinaryFormat(format));
                },
                ContainerFamily::Ole2 | ContainerFamily::Unknown => {},
            }
        }

        if data.len() < HEADER_SIZE {
            return Err(OleError::truncated(
                "header",
                HEADER_SIZE as u64,
                data.len() as u64,
            ));
        }

        let raw = RawHeader::read_from_bytes(&data[..HEADER_SIZE])
            .map_err(|_| OleError::InvalidHeader("Failed to parse header".to_string()))?;

        if &raw.signature != MAGIC {
            return Err(OleError::InvalidSignature {
                found: u64::from_le_bytes(raw.signature),
                expected: u64::from_le_bytes(*MAGIC),
            });
        }

        let byte_order = raw.byte_order.get();
        if byte_order != BYTE_ORDER_MARK {
            return Err(OleError::InvalidHeader(format!(
                "Invalid byte order {:#06X}",
                byte_order
            )));
        }

        let sector_size = SectorSize::from_shift(raw.sector_shift.get())?;

        let major_version = raw.major_version.get();
        if major_version != sector_size.major_version() {
            log::warn!(
                "Header major version {} does not match {}-byte sectors; trusting the sector shift",
                major_version,
                sector_size.bytes()
            );
        }

        let mini_sector_shift = raw.mini_sector_shift.get();
        if mini_sector_shift != MINI_SECTOR_SHIFT {
            return Err(OleError::InvalidHeader(format!(
                "Unsupported mini sector shift {}",
                mini_sector_shift
            )));
        }

        let mut mini_stream_cutoff = raw.mini_stream_cutoff.get();
        if mini_stream_cutoff != MINI_STREAM_CUTOFF {
            log::warn!(
                "Unusual mini stream cutoff {}; using {}",
                mini_stream_cutoff,
                MINI_STREAM_CUTOFF
            );
            mini_stream_cutoff = MINI_STREAM_CUTOFF;
        }

        let mut difat = [FREESECT; HEADER_DIFAT_SLOTS];
        for (slot, value) in difat.iter_mut().zip(raw.difat.iter()) {
            *slot = value.get();
        }

        Ok(Self {
            sector_size,
            minor_version: raw.minor_version.get(),
            num_dir_sectors: raw.num_dir_sectors.get(),
            num_fat_sectors: raw.num_fat_sectors.get(),
            first_dir_sector: raw.first_dir_sector.get(),
            transaction_signature: raw.transaction_signature.get(),
            mini_stream_cutoff,
            first_minifat_sector: raw.first_minifat_sector.get(),
            num_minifat_sectors: raw.num_minifat_sectors.get(),
            first_difat_sector: raw.first_difat_sector.get(),
            num_difat_sectors: raw.num_difat_sectors.get(),
            difat,
        })
    }

    /// Record the FAT sector locations; the first 109 go inline
    pub fn set_fat_sectors(&mut self, fat_sectors: &[u32]) {
        self.num_fat_sectors = fat_sectors.len() as u32;
        self.difat = [FREESECT; HEADER_DIFAT_SLOTS];
        for (slot, &sector) in self.difat.iter_mut().zip(fat_sectors) {
            *slot = sector;
        }
    }

    /// Inline FAT sector locations actually in use
    ///
    /// Stops at the first unused slot even if the FAT count claims more.
    pub fn inline_fat_sectors(&self) -> impl Iterator<Item = u32> + '_ {
        self.difat
            .iter()
            .take(self.num_fat_sectors as usize)
            .copied()
            .take_while(|&sector| sector <= MAXREGSECT)
    }

    /// Generate the header block
    ///
    /// Returns exactly one sector: the 512 header bytes followed by zero
    /// filler when the sector size is 4096.
    pub fn serialize(&self) -> Vec<u8> {
        let mut difat = [U32::<LE>::new(FREESECT); HEADER_DIFAT_SLOTS];
        for (slot, &value) in difat.iter_mut().zip(self.difat.iter()) {
            *slot = U32::new(value);
        }

        // csectDir must be zero for version 3 files
        let num_dir_sectors = match self.sector_size {
            SectorSize::Small => 0,
            SectorSize::Large => self.num_dir_sectors,
        };

        let raw = RawHeader {
            signature: *MAGIC,
            clsid: [0; 16],
            minor_version: U16::new(self.minor_version),
            major_version: U16::new(self.sector_size.major_version()),
            byte_order: U16::new(BYTE_ORDER_MARK),
            sector_shift: U16::new(self.sector_size.shift()),
            mini_sector_shift: U16::new(MINI_SECTOR_SHIFT),
            reserved: [0; 6],
            num_dir_sectors: U32::new(num_dir_sectors),
            num_fat_sectors: U32::new(self.num_fat_sectors),
            first_dir_sector: U32::new(self.first_dir_sector),
            transaction_signature: U32::new(self.transaction_signature),
            mini_stream_cutoff: U32::new(self.mini_stream_cutoff),
            first_minifat_sector: U32::new(self.first_minifat_sector),
            num_minifat_sectors: U32::new(self.num_minifat_sectors),
            first_difat_sector: U32::new(self.first_difat_sector),
            num_difat_sectors: U32::new(self.num_difat_sectors),
            difat,
        };

        let mut block = vec![0u8; self.sector_size.bytes()];
        block[..HEADER_SIZE].copy_from_slice(raw.as_bytes());
        block
    }
}
