//! Sector storage backing an open compound file.
//!
//! The bytes a file was opened from are held in an immutable [`Bytes`]
//! buffer. Sectors written afterwards live in a copy-on-write overlay, so the
//! source buffer is never mutated and can be shared between several file
//! systems opened over the same data.

use std::borrow::Cow;
use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::{OleError, Result};
use super::header::SectorSize;

/// Sector-addressed byte store with a copy-on-write overlay
#[derive(Debug, Clone)]
pub struct BlockStore {
    sector_size: SectorSize,
    /// File contents after the header block
    base: Bytes,
    /// Number of (possibly partial) sectors present in `base`
    base_sectors: u32,
    /// Sectors modified since open
    dirty: BTreeMap<u32, Box<[u8]>>,
    /// Logical number of sectors, including ones grown but never written
    len: u32,
}

impl BlockStore {
    /// Create an empty store
    pub fn new(sector_size: SectorSize) -> Self {
        Self {
            sector_size,
            base: Bytes::new(),
            base_sectors: 0,
            dirty: BTreeMap::new(),
            len: 0,
        }
    }

    /// Wrap a whole file; the header block is skipped
    pub fn from_file(data: Bytes, sector_size: SectorSize) -> Self {
        let header_len = sector_size.bytes().min(data.len());
        let base = data.slice(header_len..);
        let base_sectors = sector_size.sectors_for(base.len() as u64) as u32;
        Self {
            sector_size,
            base,
            base_sectors,
            dirty: BTreeMap::new(),
            len: base_sectors,
        }
    }

    /// Sector size of this store
    #[inline]
    pub fn sector_size(&self) -> SectorSize {
        self.sector_size
    }

    /// Logical sector count
    #[inline]
    pub fn sector_count(&self) -> u32 {
        self.len
    }

    /// Number of sectors backed by the original file bytes
    pub fn base_sector_count(&self) -> u32 {
        self.base_sectors
    }

    /// Number of sectors held in the overlay
    pub fn dirty_sector_count(&self) -> usize {
        self.dirty.len()
    }

    /// Grow the logical sector count to at least `count`
    pub fn ensure_sectors(&mut self, count: u32) {
        self.len = self.len.max(count);
    }

    /// Read one sector
    ///
    /// A partial trailing sector in the source is zero padded. Sectors past
    /// the end of the store fail with [`OleError::Truncated`].
    pub fn read_sector(&self, sector: u32) -> Result<Cow<'_, [u8]>> {
        if let Some(data) = self.dirty.get(&sector) {
            return Ok(Cow::Borrowed(data));
        }

        let size = self.sector_size.bytes();
        if sector < self.base_sectors {
            let start = sector as usize * size;
            let end = (start + size).min(self.base.len());
            if end - start == size {
                return Ok(Cow::Borrowed(&self.base[start..end]));
            }
            let mut padded = vec![0u8; size];
            padded[..end - start].copy_from_slice(&self.base[start..end]);
            return Ok(Cow::Owned(padded));
        }

        if sector < self.len {
            return Ok(Cow::Owned(vec![0u8; size]));
        }

        Err(OleError::truncated(
            format!("sector {}", sector),
            self.sector_size.offset_of(sector) + size as u64,
            (self.base.len() + size) as u64,
        ))
    }

    /// Mutable view of a sector, copying it into the overlay first
    fn sector_mut(&mut self, sector: u32) -> Result<&mut [u8]> {
        if !self.dirty.contains_key(&sector) {
            if sector >= self.len {
                self.ensure_sectors(sector + 1);
            }
            let current: Box<[u8]> = self.read_sector(sector)?.into_owned().into_boxed_slice();
            self.dirty.insert(sector, current);
        }
        self.dirty
            .get_mut(&sector)
            .map(|data| &mut data[..])
            .ok_or_else(|| OleError::truncated(format!("sector {}", sector), 0, 0))
    }

    /// Replace a whole sector; shorter data is zero padded
    pub fn write_sector(&mut self, sector: u32, data: &[u8]) {
        let size = self.sector_size.bytes();
        let mut block = vec![0u8; size].into_boxed_slice();
        let n = data.len().min(size);
        block[..n].copy_from_slice(&data[..n]);
        self.ensure_sectors(sector + 1);
        self.dirty.insert(sector, block);
    }

    /// Overwrite part of a sector
    pub fn write_at(&mut self, sector: u32, offset: usize, data: &[u8]) -> Result<()> {
        let size = self.sector_size.bytes();
        if offset + data.len() > size {
            return Err(OleError::truncated(
                format!("write into sector {}", sector),
                (offset + data.len()) as u64,
                size as u64,
            ));
        }
        let block = self.sector_mut(sector)?;
        block[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read the bytes of a chain, truncated to `len`
    pub fn read_chain(&self, chain: &[u32], len: usize) -> Result<Vec<u8>> {
        let size = self.sector_size.bytes();
        let mut out = Vec::with_capacity(len.min(chain.len() * size));
        for &sector in chain {
            if out.len() >= len {
                break;
            }
            let block = self.read_sector(sector)?;
            let take = (len - out.len()).min(size);
            out.extend_from_slice(&block[..take]);
        }
        Ok(out)
    }

    /// Write `data` across the sectors of a chain
    ///
    /// The chain must hold at least `data.len()` bytes.
    pub fn write_chain(&mut self, chain: &[u32], data: &[u8]) {
        let size = self.sector_size.bytes();
        for (&sector, piece) in chain.iter().zip(data.chunks(size)) {
            self.write_sector(sector, piece);
        }
    }
}
