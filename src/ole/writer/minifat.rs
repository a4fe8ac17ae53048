//! MiniFAT generation for the compacting writer
//!
//! Small streams are packed back to back into a fresh mini stream, each one
//! padded to a 64-byte mini sector boundary. The builder records the chains
//! in a MiniFAT that is written out alongside the packed stream.

use super::super::consts::*;
use super::super::error::TableKind;
use super::super::fat::AllocationTable;
use super::super::header::SectorSize;

/// Packs small streams into a new mini stream
///
/// Chains are allocated contiguously in call order, so the resulting MiniFAT
/// has no free entries and no fragmentation.
#[derive(Debug)]
pub struct MiniFatBuilder {
    /// MiniFAT being built
    minifat: AllocationTable,
    /// Ministream data (concatenated small streams)
    ministream_data: Vec<u8>,
}

impl MiniFatBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            minifat: AllocationTable::new(TableKind::MiniFat),
            ministream_data: Vec::new(),
        }
    }

    /// Allocate a chain of mini sectors for a small stream
    ///
    /// # Arguments
    ///
    /// * `data` - Stream data (must be smaller than the mini stream cutoff)
    ///
    /// # Returns
    ///
    /// * `u32` - The starting mini sector, or ENDOFCHAIN for empty data
    pub fn allocate_mini_chain(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return ENDOFCHAIN;
        }

        let count = data.len().div_ceil(MINI_SECTOR_SIZE);
        let start = self.minifat.append_contiguous(count);

        // Pad to the mini sector boundary
        let offset = self.ministream_data.len();
        self.ministream_data
            .resize(offset + count * MINI_SECTOR_SIZE, 0);
        self.ministream_data[offset..offset + data.len()].copy_from_slice(data);

        start
    }

    /// Packed ministream bytes
    ///
    /// Written to regular sectors and referenced from the root entry.
    pub fn ministream_data(&self) -> &[u8] {
        &self.ministream_data
    }

    pub fn ministream_size(&self) -> u64 {
        self.ministream_data.len() as u64
    }

    /// Number of mini sectors allocated
    pub fn mini_sector_count(&self) -> usize {
        self.minifat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minifat.is_empty()
    }

    /// The MiniFAT built so far
    pub fn minifat(&self) -> &AllocationTable {
        &self.minifat
    }

    /// Encode the MiniFAT as regular sectors
    pub fn generate_minifat_sectors(&self, sector_size: SectorSize) -> Vec<Vec<u8>> {
        self.minifat.to_sectors(sector_size)
    }
}

impl Default for MiniFatBuilder {
    fn default() -> Self {
        Self::new()
    }
}
