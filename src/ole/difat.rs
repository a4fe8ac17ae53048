//! DIFAT (Double Indirect FAT)
//!
//! The header stores the first 109 FAT sector locations. Files whose FAT
//! needs more sectors keep the rest in a chain of DIFAT sectors:
//! - Each DIFAT sector holds FAT sector IDs and a pointer to the next DIFAT sector
//! - For 512-byte sectors: 127 FAT sector IDs + 1 next pointer (128 * 4 = 512)
//! - For 4096-byte sectors: 1023 FAT sector IDs + 1 next pointer (1024 * 4 = 4096)
//!
//! The DIFAT chain is not recorded in the FAT, so it is walked by its own
//! next pointers, bounded by the DIFAT sector count from the header.

use fixedbitset::FixedBitSet;

use super::consts::*;
use super::error::{OleError, Result, TableKind};
use super::header::{Header, SectorSize};
use super::store::BlockStore;
use crate::common::binary::read_u32_array_le;

/// FAT and DIFAT sector locations recovered from a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FatLocations {
    /// FAT sectors, in table order
    pub fat_sectors: Vec<u32>,
    /// DIFAT sectors, in chain order
    pub difat_sectors: Vec<u32>,
}

/// Merge the inline header slots with the DIFAT chain into one list of FAT
/// sector locations.
pub fn read_fat_locations(header: &Header, store: &BlockStore) -> Result<FatLocations> {
    let declared = header.num_fat_sectors as usize;
    let available = store.sector_count() as usize;
    if declared > available {
        let size = header.sector_size.bytes() as u64;
        return Err(OleError::truncated(
            "FAT",
            declared as u64 * size,
            available as u64 * size,
        ));
    }

    let mut locations = FatLocations {
        fat_sectors: header.inline_fat_sectors().collect(),
        difat_sectors: Vec::new(),
    };

    let per_sector = header.sector_size.difat_entries_per_sector();
    let limit = store.sector_count();
    let mut visited = FixedBitSet::with_capacity(limit as usize);
    let mut sector = header.first_difat_sector;

    for _ in 0..header.num_difat_sectors {
        if locations.fat_sectors.len() >= declared || sector > MAXREGSECT {
            break;
        }
        if sector >= limit {
            return Err(OleError::ChainOutOfRange {
                table: TableKind::Difat,
                sector,
                limit,
            });
        }
        if visited.put(sector as usize) {
            return Err(OleError::ChainCycle {
                table: TableKind::Difat,
                sector,
            });
        }

        let entries = read_u32_array_le(&store.read_sector(sector)?);
        let remaining = declared - locations.fat_sectors.len();
        locations
            .fat_sectors
            .extend(entries[..per_sector].iter().take(remaining).copied());
        locations.difat_sectors.push(sector);
        sector = entries[per_sector];
    }

    if locations.fat_sectors.len() < declared {
        let size = header.sector_size.bytes() as u64;
        return Err(OleError::ChainLengthMismatch {
            table: TableKind::Difat,
            declared: declared as u64 * size,
            available: locations.fat_sectors.len() as u64 * size,
        });
    }

    Ok(locations)
}

/// Number of DIFAT sectors needed to locate `fat_sectors` FAT sectors
pub fn difat_sectors_for(fat_sectors: usize, sector_size: SectorSize) -> usize {
    fat_sectors
        .saturating_sub(HEADER_DIFAT_SLOTS)
        .div_ceil(sector_size.difat_entries_per_sector())
}

/// DIFAT builder for large file support
///
/// Splits FAT sector locations beyond the first 109 into DIFAT sectors.
#[derive(Debug)]
pub struct DifatBuilder {
    /// FAT sector IDs beyond the first 109
    fat_sector_ids: Vec<u32>,
    sector_size: SectorSize,
}

impl DifatBuilder {
    /// Create a new DIFAT builder
    pub fn new(sector_size: SectorSize) -> Self {
        Self {
            fat_sector_ids: Vec::new(),
            sector_size,
        }
    }

    /// Take the complete list of FAT sector IDs
    ///
    /// The first 109 IDs are skipped (they go in the header),
    /// and the rest will be stored in DIFAT sectors.
    pub fn set_fat_sectors(&mut self, fat_sectors: &[u32]) {
        self.fat_sector_ids = fat_sectors
            .get(HEADER_DIFAT_SLOTS..)
            .map(<[u32]>::to_vec)
            .unwrap_or_default();
    }

    /// Number of DIFAT sectors required
    pub fn sector_count(&self) -> usize {
        self.fat_sector_ids
            .len()
            .div_ceil(self.sector_size.difat_entries_per_sector())
    }

    /// Check if DIFAT is needed (more than 109 FAT sectors)
    pub fn is_needed(&self) -> bool {
        !self.fat_sector_ids.is_empty()
    }

    /// Generate DIFAT sectors placed at `locations`
    ///
    /// Each sector holds as many FAT sector IDs as fit, padding with
    /// FREESECT, and ends with the location of the next DIFAT sector
    /// (ENDOFCHAIN for the last one).
    pub fn generate(&self, locations: &[u32]) -> Vec<Vec<u8>> {
        let ids_per_sector = self.sector_size.difat_entries_per_sector();
        let next_pointer_offset = self.sector_size.bytes() - 4;

        self.fat_sector_ids
            .chunks(ids_per_sector)
            .enumerate()
            .map(|(idx, ids)| {
                let mut sector_data = vec![0xFFu8; self.sector_size.bytes()];
                for (i, &fat_sector_id) in ids.iter().enumerate() {
                    sector_data[i * 4..i * 4 + 4].copy_from_slice(&fat_sector_id.to_le_bytes());
                }
                let next = locations.get(idx + 1).copied().unwrap_or(ENDOFCHAIN);
                sector_data[next_pointer_offset..].copy_from_slice(&next.to_le_bytes());
                sector_data
            })
            .collect()
    }
}
