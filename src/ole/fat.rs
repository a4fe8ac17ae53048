//! Allocation tables (FAT and MiniFAT)
//!
//! An allocation table maps every sector to the next sector in its chain.
//! Both the main FAT and the MiniFAT use the same encoding:
//! - Regular sectors hold the index of their successor
//! - End of chain is marked with ENDOFCHAIN (0xFFFFFFFE)
//! - Free sectors are marked with FREESECT (0xFFFFFFFF)
//! - FAT and DIFAT sectors are marked with FATSECT / DIFSECT (main FAT only)
//!
//! Chain walks are bounded by the table length and cycle checked, so corrupt
//! input can never make a walk loop.

use fixedbitset::FixedBitSet;

use super::consts::*;
use super::error::{OleError, Result, TableKind};
use super::header::SectorSize;
use crate::common::binary::read_u32_array_le;

/// In-memory allocation table
#[derive(Debug, Clone)]
pub struct AllocationTable {
    kind: TableKind,
    entries: Vec<u32>,
}

impl AllocationTable {
    /// Create an empty table
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Create a table from raw entries
    pub fn from_entries(kind: TableKind, entries: Vec<u32>) -> Self {
        Self { kind, entries }
    }

    /// Decode a table from its sectors, in table order
    pub fn from_sectors<'a, I>(kind: TableKind, sectors: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut entries = Vec::new();
        for sector in sectors {
            entries.extend(read_u32_array_le(sector));
        }
        Self { kind, entries }
    }

    /// Which table this is
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw entries
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Entry for a sector, if inside the table
    #[inline]
    pub fn get(&self, sector: u32) -> Option<u32> {
        self.entries.get(sector as usize).copied()
    }

    /// Set an entry, growing the table with free entries if needed
    pub fn set(&mut self, sector: u32, value: u32) {
        let idx = sector as usize;
        if idx >= self.entries.len() {
            self.entries.resize(idx + 1, FREESECT);
        }
        self.entries[idx] = value;
    }

    /// Number of free entries
    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|&&v| v == FREESECT).count()
    }

    /// Walk a chain lazily
    ///
    /// The walk yields at most `len()` sectors. A revisited sector, an index
    /// outside the table, or a link to a reserved value other than
    /// ENDOFCHAIN ends the walk with an error.
    pub fn chain(&self, start: u32) -> Chain<'_> {
        Chain {
            table: self,
            next: start,
            prev: None,
            visited: FixedBitSet::with_capacity(self.entries.len()),
            done: false,
        }
    }

    /// Collect a whole chain
    pub fn collect_chain(&self, start: u32) -> Result<Vec<u32>> {
        self.chain(start).collect()
    }

    /// Number of sectors in a chain
    pub fn chain_len(&self, start: u32) -> Result<usize> {
        let mut n = 0;
        for sector in self.chain(start) {
            sector?;
            n += 1;
        }
        Ok(n)
    }

    /// Allocate a new chain of `count` sectors
    ///
    /// Free entries are reused lowest first; the table is extended once they
    /// run out. Returns ENDOFCHAIN for an empty allocation.
    pub fn allocate(&mut self, count: usize) -> u32 {
        if count == 0 {
            return ENDOFCHAIN;
        }

        let mut sectors = Vec::with_capacity(count);
        for (idx, &value) in self.entries.iter().enumerate() {
            if sectors.len() == count {
                break;
            }
            if value == FREESECT {
                sectors.push(idx as u32);
            }
        }
        while sectors.len() < count {
            sectors.push(self.entries.len() as u32);
            self.entries.push(FREESECT);
        }

        self.link(&sectors);
        log::trace!(
            "{}: allocated {} sectors starting at {}",
            self.kind,
            count,
            sectors[0]
        );
        sectors[0]
    }

    /// Link sectors into a chain terminated with ENDOFCHAIN
    fn link(&mut self, sectors: &[u32]) {
        for pair in sectors.windows(2) {
            self.entries[pair[0] as usize] = pair[1];
        }
        if let Some(&last) = sectors.last() {
            self.entries[last as usize] = ENDOFCHAIN;
        }
    }

    /// Grow or shrink a chain to exactly `count` sectors
    ///
    /// Growing appends freshly allocated sectors and relinks the old tail.
    /// Shrinking terminates the chain early and frees the rest; freed
    /// sectors keep whatever bytes they held. Returns the (possibly new)
    /// start sector.
    pub fn resize_chain(&mut self, start: u32, count: usize) -> Result<u32> {
        let chain = self.collect_chain(start)?;

        if count == 0 {
            self.release(&chain);
            return Ok(ENDOFCHAIN);
        }

        match chain.len() {
            0 => Ok(self.allocate(count)),
            len if count < len => {
                self.entries[chain[count - 1] as usize] = ENDOFCHAIN;
                self.release(&chain[count..]);
                Ok(start)
            },
            len if count > len => {
                let tail = self.allocate(count - len);
                self.entries[chain[len - 1] as usize] = tail;
                Ok(start)
            },
            _ => Ok(start),
        }
    }

    /// Free every sector of a chain
    pub fn free_chain(&mut self, start: u32) -> Result<()> {
        let chain = self.collect_chain(start)?;
        self.release(&chain);
        Ok(())
    }

    /// Mark sectors free without following any links
    pub fn release(&mut self, sectors: &[u32]) {
        for &sector in sectors {
            if let Some(slot) = self.entries.get_mut(sector as usize) {
                *slot = FREESECT;
            }
        }
    }

    /// Drop free entries at the end of the table
    pub fn trim_free_tail(&mut self) {
        while self.entries.last() == Some(&FREESECT) {
            self.entries.pop();
        }
    }

    /// Append a contiguous chain of `count` sectors at the end of the table
    ///
    /// Used by the compacting writer, which lays sectors out in order.
    pub fn append_contiguous(&mut self, count: usize) -> u32 {
        if count == 0 {
            return ENDOFCHAIN;
        }
        let start = self.entries.len() as u32;
        for i in 1..count as u32 {
            self.entries.push(start + i);
        }
        self.entries.push(ENDOFCHAIN);
        start
    }

    /// Append `count` sectors marked with a special value (FATSECT or DIFSECT)
    pub fn append_special(&mut self, count: usize, marker: u32) -> u32 {
        if count == 0 {
            return ENDOFCHAIN;
        }
        let start = self.entries.len() as u32;
        self.entries.extend(std::iter::repeat_n(marker, count));
        start
    }

    /// Encode the table as sectors, padding the last one with FREESECT
    pub fn to_sectors(&self, sector_size: SectorSize) -> Vec<Vec<u8>> {
        let per_sector = sector_size.entries_per_sector();
        self.entries
            .chunks(per_sector)
            .map(|chunk| {
                let mut sector = vec![0xFFu8; sector_size.bytes()];
                for (i, &value) in chunk.iter().enumerate() {
                    sector[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
                }
                sector
            })
            .collect()
    }

    /// Number of sectors needed to store this table
    pub fn sector_count(&self, sector_size: SectorSize) -> usize {
        self.entries.len().div_ceil(sector_size.entries_per_sector())
    }
}

/// Lazy, bounded walk over one chain
#[derive(Debug)]
pub struct Chain<'a> {
    table: &'a AllocationTable,
    next: u32,
    prev: Option<u32>,
    visited: FixedBitSet,
    done: bool,
}

impl Chain<'_> {
    fn fail(&mut self, err: OleError) -> Option<Result<u32>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for Chain<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let current = self.next;
        if current == ENDOFCHAIN {
            self.done = true;
            return None;
        }

        let kind = self.table.kind;
        if current > MAXREGSECT {
            match self.prev {
                // Some writers use FREESECT as the start of an empty chain
                None if current == FREESECT => {
                    self.done = true;
                    return None;
                },
                None => {
                    return self.fail(OleError::ChainInvalidLink {
                        table: kind,
                        sector: current,
                        value: current,
                    });
                },
                Some(prev) => {
                    return self.fail(OleError::ChainInvalidLink {
                        table: kind,
                        sector: prev,
                        value: current,
                    });
                },
            }
        }

        let limit = self.table.entries.len() as u32;
        if current >= limit {
            return self.fail(OleError::ChainOutOfRange {
                table: kind,
                sector: current,
                limit,
            });
        }

        if self.visited.put(current as usize) {
            return self.fail(OleError::ChainCycle {
                table: kind,
                sector: current,
            });
        }

        self.prev = Some(current);
        self.next = self.table.entries[current as usize];
        Some(Ok(current))
    }
}
