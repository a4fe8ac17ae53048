//! FAT and DIFAT sector counts for a file being written
//!
//! The FAT has to describe every sector of the file, including its own
//! sectors and the DIFAT sectors that locate it. With `U` data sectors and
//! `E = sector_size / 4` entries per sector, the writer needs the least `F`
//! such that
//!
//! ```text
//! F * E >= U + F + D(F)        D(F) = ceil(max(0, F - 109) / (E - 1))
//! ```
//!
//! The map `F -> ceil((U + F + D(F)) / E)` is monotone, so iterating it from
//! zero climbs towards the least fixed point without passing it and stops
//! there. Each step raises `F` by at least one until then, which bounds the
//! loop by the size of the answer.

use super::super::consts::MAXREGSECT;
use super::super::difat::difat_sectors_for;
use super::super::error::{OleError, Result};
use super::super::header::SectorSize;

/// Sector counts reserved for allocation metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatLayout {
    /// Number of FAT sectors
    pub fat_sectors: usize,
    /// Number of DIFAT sectors
    pub difat_sectors: usize,
}

impl FatLayout {
    /// Total number of sectors in the file
    pub fn total_sectors(&self, used: usize) -> usize {
        used + self.fat_sectors + self.difat_sectors
    }
}

/// Least FAT/DIFAT sector counts covering `used` other sectors
pub fn fat_layout(used: usize, sector_size: SectorSize) -> Result<FatLayout> {
    let per_sector = sector_size.entries_per_sector();
    let mut fat_sectors = 0usize;

    loop {
        let difat_sectors = difat_sectors_for(fat_sectors, sector_size);
        let total = used + fat_sectors + difat_sectors;
        if total > MAXREGSECT as usize {
            return Err(OleError::ContainerTooLarge(format!(
                "{} sectors exceed the addressable range",
                total
            )));
        }

        let next = total.div_ceil(per_sector);
        if next == fat_sectors {
            return Ok(FatLayout {
                fat_sectors,
                difat_sectors,
            });
        }
        fat_sectors = next;
    }
}
