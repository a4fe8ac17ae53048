//! Compacting serializer for [`OleFileSystem`]
//!
//! Every write produces a fresh, defragmented file. Sectors are handed out in
//! the order they are emitted, so the sink only needs [`Write`]:
//!
//! ```text
//! header | large streams | mini stream | directory | MiniFAT | DIFAT | FAT
//! ```
//!
//! Large streams keep their directory order, small streams are repacked into
//! a new mini stream, and the FAT/DIFAT sizes come from the fixed point in
//! [`fat_layout`](super::layout::fat_layout).

use std::io::{BufWriter, Write};
use std::path::Path;

use super::super::consts::*;
use super::super::difat::DifatBuilder;
use super::super::directory::{DirectoryEntry, StreamLocation};
use super::super::error::{Result, TableKind};
use super::super::fat::AllocationTable;
use super::super::file::OleFileSystem;
use super::super::header::{Header, SectorSize};
use super::layout::fat_layout;
use super::minifat::MiniFatBuilder;

/// Source chain of a large stream being copied into the new file
struct LargeStream {
    chain: Vec<u32>,
    size: usize,
}

impl OleFileSystem {
    /// Serialize the container to `sink`
    ///
    /// The in-memory filesystem is left untouched; reopening the output
    /// yields the same hierarchy, names, class ids, timestamps and stream
    /// contents.
    ///
    /// # Errors
    ///
    /// Fails if a stream chain is corrupt, if the file would exceed the
    /// addressable sector range, or with [`OleError::Io`] when the sink
    /// fails.
    ///
    /// [`OleError::Io`]: super::super::OleError::Io
    pub fn write_out<W: Write>(&self, mut sink: W) -> Result<()> {
        let sector_size = self.sector_size();
        let cutoff = self.header.mini_stream_cutoff;

        let mut fat = AllocationTable::new(TableKind::Fat);
        let mut minifat = MiniFatBuilder::new();
        let mut directory = self.directory.clone();
        let mut large_streams = Vec::new();

        // Large streams take the first sectors, in directory order
        for sid in 0..self.directory.len() as u32 {
            let Some(stream) = self.directory.get(sid).and_then(DirectoryEntry::as_stream) else {
                continue;
            };
            if stream.location(cutoff) != StreamLocation::Main {
                continue;
            }
            let chain = self.main_chain(stream)?;
            let start = fat.append_contiguous(chain.len());
            if let Some(entry) = directory.get_mut(sid).and_then(DirectoryEntry::as_stream_mut) {
                entry.start = start;
            }
            large_streams.push(LargeStream {
                chain,
                size: stream.size as usize,
            });
        }

        // Small streams are packed into a new mini stream
        for sid in 0..self.directory.len() as u32 {
            let Some(stream) = self.directory.get(sid).and_then(DirectoryEntry::as_stream) else {
                continue;
            };
            if stream.location(cutoff) != StreamLocation::Mini {
                continue;
            }
            let data = self.read_stream_entry(stream)?;
            let start = minifat.allocate_mini_chain(&data);
            if let Some(entry) = directory.get_mut(sid).and_then(DirectoryEntry::as_stream_mut) {
                entry.start = start;
            }
        }

        let ministream_sectors = sector_size.sectors_for(minifat.ministream_size()) as usize;
        let ministream_start = fat.append_contiguous(ministream_sectors);
        directory.set_mini_stream(ministream_start, minifat.ministream_size());

        let dir_sectors = directory.sector_count(sector_size);
        let dir_start = fat.append_contiguous(dir_sectors);

        let minifat_sectors = minifat.generate_minifat_sectors(sector_size);
        let minifat_start = fat.append_contiguous(minifat_sectors.len());

        let layout = fat_layout(fat.len(), sector_size)?;
        let difat_start = fat.append_special(layout.difat_sectors, DIFSECT);
        let fat_start = fat.append_special(layout.fat_sectors, FATSECT);
        let difat_locations: Vec<u32> = (difat_start..).take(layout.difat_sectors).collect();
        let fat_locations: Vec<u32> = (fat_start..).take(layout.fat_sectors).collect();

        let mut header = Header::new(sector_size);
        header.minor_version = self.header.minor_version;
        header.first_dir_sector = dir_start;
        header.num_dir_sectors = dir_sectors as u32;
        header.first_minifat_sector = minifat_start;
        header.num_minifat_sectors = minifat_sectors.len() as u32;
        header.first_difat_sector = difat_start;
        header.num_difat_sectors = layout.difat_sectors as u32;
        header.set_fat_sectors(&fat_locations);

        let mut difat = DifatBuilder::new(sector_size);
        difat.set_fat_sectors(&fat_locations);
        let difat_data = difat.generate(&difat_locations);
        let fat_data = fat.to_sectors(sector_size);
        debug_assert_eq!(fat_data.len(), layout.fat_sectors);

        sink.write_all(&header.serialize())?;
        for stream in &large_streams {
            let mut remaining = stream.size;
            for &sector in &stream.chain {
                let block = self.store.read_sector(sector)?;
                let take = remaining.min(block.len());
                write_padded(&mut sink, &block[..take], sector_size)?;
                remaining -= take;
            }
        }
        write_padded(&mut sink, minifat.ministream_data(), sector_size)?;
        sink.write_all(&directory.serialize(sector_size))?;
        for sector in minifat_sectors
            .iter()
            .chain(difat_data.iter())
            .chain(fat_data.iter())
        {
            sink.write_all(sector)?;
        }
        sink.flush()?;

        log::debug!(
            "Wrote compound file: {} sectors of {} bytes ({} FAT, {} DIFAT), {} mini sectors, {} directory entries",
            fat.len(),
            sector_size.bytes(),
            layout.fat_sectors,
            layout.difat_sectors,
            minifat.mini_sector_count(),
            directory.len()
        );
        Ok(())
    }

    /// Serialize the container into a new buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_out(&mut out)?;
        Ok(out)
    }

    /// Serialize the container to a file, replacing it if it exists
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use litchi_cfb::ole::OleFileSystem;
    /// let mut fs = OleFileSystem::new();
    /// fs.create_stream("Test", b"Hello")?;
    /// fs.save("output.ole")?;
    /// # Ok::<(), litchi_cfb::ole::OleError>(())
    /// ```
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut buffered = BufWriter::new(file);
        self.write_out(&mut buffered)?;
        buffered.flush()?;
        Ok(())
    }
}

/// Write `data` and zero-fill up to the next sector boundary
fn write_padded<W: Write>(sink: &mut W, data: &[u8], sector_size: SectorSize) -> Result<()> {
    sink.write_all(data)?;
    let tail = data.len() % sector_size.bytes();
    if tail != 0 {
        sink.write_all(&vec![0u8; sector_size.bytes() - tail])?;
    }
    Ok(())
}
