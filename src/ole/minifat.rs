//! MiniFAT and the mini stream
//!
//! Streams smaller than the cutoff (4096 bytes) are stored in 64-byte mini
//! sectors. The mini sectors live inside the mini stream, which is itself an
//! ordinary chain in the main FAT starting at the root entry's start sector.
//! The MiniFAT links mini sectors into chains the same way the FAT links
//! regular sectors.

use super::consts::*;
use super::error::{OleError, Result, TableKind};
use super::fat::AllocationTable;
use super::header::SectorSize;
use super::store::BlockStore;

/// Mini sector allocator plus the main-FAT chain backing the mini stream
#[derive(Debug, Clone)]
pub struct MiniStream {
    sector_size: SectorSize,
    table: AllocationTable,
    /// Main sectors holding the mini stream, in order
    backing: Vec<u32>,
    /// Mini stream length in bytes; mini sectors past it are unreadable
    len: u64,
}

impl MiniStream {
    /// Create an empty mini stream
    pub fn new(sector_size: SectorSize) -> Self {
        Self {
            sector_size,
            table: AllocationTable::new(TableKind::MiniFat),
            backing: Vec::new(),
            len: 0,
        }
    }

    /// Bind a MiniFAT to the root entry's main chain
    ///
    /// `stream_size` is the mini stream length recorded in the root entry;
    /// the backing chain must be long enough to hold it.
    pub fn from_parts(
        sector_size: SectorSize,
        table: AllocationTable,
        fat: &AllocationTable,
        start: u32,
        stream_size: u64,
    ) -> Result<Self> {
        let backing = fat.collect_chain(start)?;
        let available = backing.len() as u64 * sector_size.bytes() as u64;
        if available < stream_size {
            return Err(OleError::ChainLengthMismatch {
                table: TableKind::Fat,
                declared: stream_size,
                available,
            });
        }
        Ok(Self {
            sector_size,
            table,
            backing,
            len: stream_size,
        })
    }

    /// The MiniFAT
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    /// Main sectors backing the mini stream
    pub fn backing(&self) -> &[u32] {
        &self.backing
    }

    /// First main sector of the mini stream
    pub fn start(&self) -> u32 {
        self.backing.first().copied().unwrap_or(ENDOFCHAIN)
    }

    /// Mini stream length in bytes
    pub fn stream_size(&self) -> u64 {
        self.len
    }

    /// Number of mini sectors the backing chain can hold
    fn capacity(&self) -> usize {
        self.backing.len() * self.sector_size.bytes() / MINI_SECTOR_SIZE
    }

    /// Main sector and byte offset of a mini sector
    fn locate(&self, mini_sector: u32) -> Result<(u32, usize)> {
        let size = self.sector_size.bytes();
        let offset = mini_sector as usize * MINI_SECTOR_SIZE;
        if (offset + MINI_SECTOR_SIZE) as u64 > self.len {
            return Err(OleError::truncated(
                format!("mini sector {}", mini_sector),
                (offset + MINI_SECTOR_SIZE) as u64,
                self.len,
            ));
        }
        match self.backing.get(offset / size) {
            Some(&sector) => Ok((sector, offset % size)),
            None => Err(OleError::truncated(
                format!("mini sector {}", mini_sector),
                (offset + MINI_SECTOR_SIZE) as u64,
                (self.backing.len() * size) as u64,
            )),
        }
    }

    /// Read a stream of `size` bytes starting at mini sector `start`
    pub fn read(&self, store: &BlockStore, start: u32, size: u64) -> Result<Vec<u8>> {
        let len = size as usize;
        let mut out = Vec::with_capacity(len);
        for mini_sector in self.table.chain(start) {
            if out.len() >= len {
                break;
            }
            let (sector, offset) = self.locate(mini_sector?)?;
            let block = store.read_sector(sector)?;
            let take = (len - out.len()).min(MINI_SECTOR_SIZE);
            out.extend_from_slice(&block[offset..offset + take]);
        }
        if out.len() < len {
            return Err(OleError::ChainLengthMismatch {
                table: TableKind::MiniFat,
                declared: size,
                available: out.len() as u64,
            });
        }
        Ok(out)
    }

    /// Write `data` across an existing mini chain
    pub fn write(&self, store: &mut BlockStore, start: u32, data: &[u8]) -> Result<()> {
        let chain = self.table.collect_chain(start)?;
        for (&mini_sector, piece) in chain.iter().zip(data.chunks(MINI_SECTOR_SIZE)) {
            let (sector, offset) = self.locate(mini_sector)?;
            let mut padded = [0u8; MINI_SECTOR_SIZE];
            padded[..piece.len()].copy_from_slice(piece);
            store.write_at(sector, offset, &padded)?;
        }
        Ok(())
    }

    /// Allocate a mini chain for `size` bytes, growing the mini stream
    pub fn allocate(&mut self, fat: &mut AllocationTable, size: u64) -> Result<u32> {
        let start = self.table.allocate(mini_sectors_for(size));
        self.ensure_capacity(fat)?;
        Ok(start)
    }

    /// Resize a mini chain to hold `size` bytes
    pub fn resize(&mut self, fat: &mut AllocationTable, start: u32, size: u64) -> Result<u32> {
        let start = self.table.resize_chain(start, mini_sectors_for(size))?;
        self.ensure_capacity(fat)?;
        Ok(start)
    }

    /// Release a mini chain
    pub fn free(&mut self, start: u32) -> Result<()> {
        self.table.free_chain(start)
    }

    /// Append main sectors until the mini stream covers every MiniFAT entry
    fn ensure_capacity(&mut self, fat: &mut AllocationTable) -> Result<()> {
        let needed = self.table.len();
        self.len = self.len.max((needed * MINI_SECTOR_SIZE) as u64);
        let have = self.capacity();
        if have >= needed {
            return Ok(());
        }

        let per_sector = self.sector_size.bytes() / MINI_SECTOR_SIZE;
        let extra = (needed - have).div_ceil(per_sector);
        let tail = fat.allocate(extra);
        if let Some(&last) = self.backing.last() {
            fat.set(last, tail);
        }
        self.backing.extend(fat.collect_chain(tail)?);
        log::trace!(
            "Mini stream grew by {} sectors to {}",
            extra,
            self.backing.len()
        );
        Ok(())
    }
}

/// Number of mini sectors needed for `size` bytes
#[inline]
pub fn mini_sectors_for(size: u64) -> usize {
    (size as usize).div_ceil(MINI_SECTOR_SIZE)
}
