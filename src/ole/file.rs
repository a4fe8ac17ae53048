//! Compound file filesystem
//!
//! [`OleFileSystem`] ties the header, the allocation tables, the directory and
//! the sector store together and exposes path based access to storages and
//! streams. Files are opened from memory; edits go to a copy-on-write overlay
//! and never touch the source bytes. [`OleFileSystem::write_out`] produces a
//! fresh, compacted file.

use std::io::Read;

use bytes::Bytes;

use super::consts::*;
use super::difat::read_fat_locations;
use super::directory::{
    Directory, DirectoryEntry, EntryInfo, EntryKind, StorageEntry, StreamEntry, StreamLocation,
    split_path,
};
use super::error::{OleError, Result, TableKind};
use super::fat::AllocationTable;
use super::header::{Header, SectorSize};
use super::minifat::MiniStream;
use super::options::OleOptions;
use super::store::BlockStore;
use super::stream::StreamHolder;

/// An OLE2 compound file held in memory
///
/// # Example
///
/// ```
/// use litchi_cfb::ole::OleFileSystem;
///
/// let mut fs = OleFileSystem::new();
/// fs.create_storage("Data")?;
/// fs.create_stream("Data/Stream1", &[0u8; 10000])?;
///
/// let bytes = fs.to_bytes()?;
/// let reopened = OleFileSystem::from_bytes(bytes)?;
/// assert_eq!(reopened.open_stream("Data/Stream1")?.len(), 10000);
/// # Ok::<(), litchi_cfb::ole::OleError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OleFileSystem {
    /// Header as read at open time (fresh for new files)
    pub(crate) header: Header,
    pub(crate) options: OleOptions,
    pub(crate) store: BlockStore,
    /// Main FAT; metadata sectors of the source file are released at open
    pub(crate) fat: AllocationTable,
    pub(crate) mini: MiniStream,
    pub(crate) directory: Directory,
}

impl OleFileSystem {
    /// Create an empty container with 512-byte sectors
    pub fn new() -> Self {
        Self::with_options(OleOptions::default())
    }

    /// Create an empty container with the given sector size
    pub fn with_sector_size(sector_size: SectorSize) -> Self {
        Self::with_options(OleOptions::default().with_sector_size(sector_size))
    }

    /// Create an empty container
    pub fn with_options(options: OleOptions) -> Self {
        let sector_size = options.sector_size;
        let mut directory = Directory::new();
        if let Some(clsid) = options.root_clsid
            && let Some(DirectoryEntry::Root(root)) = directory.get_mut(0)
        {
            root.storage.clsid = clsid;
        }

        Self {
            header: Header::new(sector_size),
            options,
            store: BlockStore::new(sector_size),
            fat: AllocationTable::new(TableKind::Fat),
            mini: MiniStream::new(sector_size),
            directory,
        }
    }

    /// Read a whole container from a reader
    pub fn open<R: Read>(reader: R) -> Result<Self> {
        Self::open_with_options(reader, OleOptions::default())
    }

    /// Read a whole container from a reader
    pub fn open_with_options<R: Read>(mut reader: R, options: OleOptions) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes_with_options(data, options)
    }

    /// Open a container held in memory
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::from_bytes_with_options(data, OleOptions::default())
    }

    /// Open a container held in memory
    ///
    /// The header, DIFAT, FAT, MiniFAT and directory are validated here and
    /// any corruption fails the open. Stream chains are only checked when a
    /// stream is read, unless [`OleOptions::verify_streams_on_open`] is set.
    pub fn from_bytes_with_options(data: impl Into<Bytes>, options: OleOptions) -> Result<Self> {
        let data = data.into();
        let header = Header::parse(&data)?;
        let sector_size = header.sector_size;
        let store = BlockStore::from_file(data, sector_size);

        let locations = read_fat_locations(&header, &store)?;
        let mut fat = read_table(&store, TableKind::Fat, &locations.fat_sectors)?;

        let dir_chain = fat.collect_chain(header.first_dir_sector)?;
        let dir_data = store.read_chain(&dir_chain, dir_chain.len() * sector_size.bytes())?;
        let directory = Directory::parse(&dir_data, sector_size)?;

        let minifat_chain = fat.collect_chain(header.first_minifat_sector)?;
        let mut minifat = read_table(&store, TableKind::MiniFat, &minifat_chain)?;
        minifat.trim_free_tail();

        let (mini_start, mini_size) = directory.mini_stream();
        // An empty mini stream may carry any start value
        let mini_start = if mini_size == 0 { ENDOFCHAIN } else { mini_start };
        let mini = MiniStream::from_parts(sector_size, minifat, &fat, mini_start, mini_size)?;

        // Metadata is regenerated on write, so its sectors become reusable
        fat.release(&locations.fat_sectors);
        fat.release(&locations.difat_sectors);
        fat.release(&dir_chain);
        fat.release(&minifat_chain);
        fat.trim_free_tail();

        log::debug!(
            "Opened compound file: {}-byte sectors, {} FAT entries, {} mini sectors, {} live directory entries",
            sector_size.bytes(),
            fat.len(),
            mini.table().len(),
            directory.live_count()
        );

        let fs = Self {
            header,
            options,
            store,
            fat,
            mini,
            directory,
        };
        if fs.options.verify_streams_on_open {
            fs.verify()?;
        }
        Ok(fs)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn sector_size(&self) -> SectorSize {
        self.header.sector_size
    }

    pub fn options(&self) -> &OleOptions {
        &self.options
    }

    /// The directory arena
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    fn cutoff(&self) -> u32 {
        self.header.mini_stream_cutoff
    }

    fn entry_at(&self, sid: u32) -> Result<&DirectoryEntry> {
        self.directory
            .get(sid)
            .ok_or_else(|| OleError::EntryNotFound(format!("entry {}", sid)))
    }

    /// Look up an entry by path (empty path for the root)
    pub fn entry(&self, path: &str) -> Result<&DirectoryEntry> {
        let sid = self.directory.resolve(path)?;
        self.entry_at(sid)
    }

    /// Summary of the entry at `path`
    pub fn entry_info(&self, path: &str) -> Result<EntryInfo> {
        let sid = self.directory.resolve(path)?;
        let full = self.directory.path_of(sid).unwrap_or_default();
        self.directory
            .info(sid, full, self.cutoff())
            .ok_or_else(|| OleError::EntryNotFound(path.to_string()))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.directory.resolve(path).is_ok()
    }

    pub fn is_storage(&self, path: &str) -> bool {
        self.entry(path).is_ok_and(DirectoryEntry::is_storage)
    }

    pub fn is_stream(&self, path: &str) -> bool {
        self.entry(path).is_ok_and(DirectoryEntry::is_stream)
    }

    /// Paths of every stream, in hierarchy order
    pub fn list_streams(&self) -> Vec<String> {
        self.walk()
            .into_iter()
            .filter(|info| info.kind == EntryKind::Stream)
            .map(|info| info.path)
            .collect()
    }

    /// Direct children of a storage, in name order
    pub fn list_directory(&self, path: &str) -> Result<Vec<EntryInfo>> {
        let sid = self.directory.resolve(path)?;
        if !self.entry_at(sid)?.is_storage() {
            return Err(OleError::NotAStorage(path.to_string()));
        }
        let prefix = self.directory.path_of(sid).unwrap_or_default();
        Ok(self
            .directory
            .children(sid)
            .into_iter()
            .filter_map(|child| {
                let name = self.directory.get(child)?.name();
                self.directory
                    .info(child, join_path(&prefix, name), self.cutoff())
            })
            .collect())
    }

    /// Every live entry below the root, depth first, siblings in name order
    pub fn walk(&self) -> Vec<EntryInfo> {
        let mut out = Vec::with_capacity(self.directory.live_count());
        let mut stack: Vec<(u32, String)> = self
            .directory
            .children(0)
            .into_iter()
            .rev()
            .map(|sid| (sid, self.directory.get(sid).map_or("", DirectoryEntry::name).to_string()))
            .collect();

        while let Some((sid, path)) = stack.pop() {
            let Some(info) = self.directory.info(sid, path.clone(), self.cutoff()) else {
                continue;
            };
            if info.kind == EntryKind::Storage {
                for child in self.directory.children(sid).into_iter().rev() {
                    let name = self.directory.get(child).map_or("", DirectoryEntry::name);
                    stack.push((child, join_path(&path, name)));
                }
            }
            out.push(info);
        }
        out
    }

    /// Resolve a path, creating missing storages along the way
    fn ensure_storages(&mut self, components: &[&str]) -> Result<u32> {
        let mut current = 0;
        for &name in components {
            current = match self.directory.find_child(current, name) {
                Some(sid) if self.directory.get(sid).is_some_and(DirectoryEntry::is_storage) => {
                    sid
                },
                Some(_) => return Err(OleError::NotAStorage(name.to_string())),
                None => {
                    log::trace!("Creating intermediate storage '{}'", name);
                    self.directory
                        .insert(current, DirectoryEntry::Storage(StorageEntry::new(name)))?
                },
            };
        }
        Ok(current)
    }

    /// Create a storage, along with any missing parent storages
    pub fn create_storage(&mut self, path: &str) -> Result<&DirectoryEntry> {
        let components = split_path(path);
        let Some((name, parents)) = components.split_last() else {
            return Err(OleError::InvalidPath(path.to_string()));
        };
        let parent = self.ensure_storages(parents)?;
        let sid = self
            .directory
            .insert(parent, DirectoryEntry::Storage(StorageEntry::new(*name)))?;
        self.entry_at(sid)
    }

    /// Create a new stream holding `data`
    ///
    /// Missing parent storages are created. Fails with
    /// [`OleError::EntryExists`] if the name is taken.
    pub fn create_stream(&mut self, path: &str, data: &[u8]) -> Result<&DirectoryEntry> {
        let components = split_path(path);
        let Some((name, parents)) = components.split_last() else {
            return Err(OleError::InvalidPath(path.to_string()));
        };
        let parent = self.ensure_storages(parents)?;
        let sid = self.directory.insert(
            parent,
            DirectoryEntry::Stream(StreamEntry::new(*name, ENDOFCHAIN, 0)),
        )?;
        self.store_stream(sid, data)?;
        self.entry_at(sid)
    }

    /// Replace the contents of an existing stream
    ///
    /// Data stays where it is when the allocator and sector count do not
    /// change; otherwise the chain is resized, or moved to the other
    /// allocator when the new size crosses the mini stream cutoff.
    pub fn write_stream(&mut self, path: &str, data: &[u8]) -> Result<&DirectoryEntry> {
        let sid = self.stream_sid(path)?;
        self.store_stream(sid, data)?;
        self.entry_at(sid)
    }

    fn stream_sid(&self, path: &str) -> Result<u32> {
        let sid = self.directory.resolve(path)?;
        if !self.entry_at(sid)?.is_stream() {
            return Err(OleError::NotAStream(path.to_string()));
        }
        Ok(sid)
    }

    fn store_stream(&mut self, sid: u32, data: &[u8]) -> Result<()> {
        let cutoff = self.cutoff();
        let sector_size = self.sector_size();
        let (old_start, old_size) = match self.directory.get(sid).and_then(DirectoryEntry::as_stream)
        {
            Some(stream) => (stream.start, stream.size),
            None => return Err(OleError::NotAStream(format!("entry {}", sid))),
        };
        // Empty streams own no sectors whatever their start field says
        let old_start = if old_size == 0 { ENDOFCHAIN } else { old_start };
        let new_size = data.len() as u64;
        let sectors = sector_size.sectors_for(new_size) as usize;

        let start = match (
            StreamLocation::for_size(old_size, cutoff),
            StreamLocation::for_size(new_size, cutoff),
        ) {
            (StreamLocation::Main, StreamLocation::Main) => {
                let start = self.fat.resize_chain(old_start, sectors)?;
                self.write_main(start, data)?;
                start
            },
            (StreamLocation::Mini, StreamLocation::Mini) => {
                let start = self.mini.resize(&mut self.fat, old_start, new_size)?;
                self.mini.write(&mut self.store, start, data)?;
                start
            },
            (StreamLocation::Mini, StreamLocation::Main) => {
                self.mini.free(old_start)?;
                let start = self.fat.allocate(sectors);
                self.write_main(start, data)?;
                start
            },
            (StreamLocation::Main, StreamLocation::Mini) => {
                self.fat.free_chain(old_start)?;
                let start = self.mini.allocate(&mut self.fat, new_size)?;
                self.mini.write(&mut self.store, start, data)?;
                start
            },
        };

        if let Some(stream) = self
            .directory
            .get_mut(sid)
            .and_then(DirectoryEntry::as_stream_mut)
        {
            stream.start = start;
            stream.size = new_size;
        }
        self.sync_mini_stream();
        log::trace!("Stored {} bytes in entry {} at sector {}", new_size, sid, start);
        Ok(())
    }

    fn write_main(&mut self, start: u32, data: &[u8]) -> Result<()> {
        let chain = self.fat.collect_chain(start)?;
        self.store.write_chain(&chain, data);
        Ok(())
    }

    fn sync_mini_stream(&mut self) {
        self.directory
            .set_mini_stream(self.mini.start(), self.mini.stream_size());
    }

    /// Read a whole stream
    pub fn open_stream(&self, path: &str) -> Result<Vec<u8>> {
        let sid = self.stream_sid(path)?;
        match self.entry_at(sid)?.as_stream() {
            Some(stream) => self.read_stream_entry(stream),
            None => Err(OleError::NotAStream(path.to_string())),
        }
    }

    pub(crate) fn read_stream_entry(&self, stream: &StreamEntry) -> Result<Vec<u8>> {
        if stream.size == 0 {
            return Ok(Vec::new());
        }
        match stream.location(self.cutoff()) {
            StreamLocation::Mini => self.mini.read(&self.store, stream.start, stream.size),
            StreamLocation::Main => {
                let chain = self.main_chain(stream)?;
                self.store.read_chain(&chain, stream.size as usize)
            },
        }
    }

    /// Main sectors holding a large stream, exactly as many as its size needs
    pub(crate) fn main_chain(&self, stream: &StreamEntry) -> Result<Vec<u32>> {
        let sector_size = self.sector_size();
        let needed = sector_size.sectors_for(stream.size) as usize;
        let mut chain = Vec::with_capacity(needed);
        for sector in self.fat.chain(stream.start).take(needed) {
            chain.push(sector?);
        }
        if chain.len() < needed {
            return Err(OleError::ChainLengthMismatch {
                table: TableKind::Fat,
                declared: stream.size,
                available: (chain.len() * sector_size.bytes()) as u64,
            });
        }
        Ok(chain)
    }

    /// Allocator and sector chain of a stream
    ///
    /// Main streams report main sector indices, mini streams report mini
    /// sector indices.
    pub fn stream_sectors(&self, path: &str) -> Result<(StreamLocation, Vec<u32>)> {
        let sid = self.stream_sid(path)?;
        let Some(stream) = self.entry_at(sid)?.as_stream() else {
            return Err(OleError::NotAStream(path.to_string()));
        };
        match stream.location(self.cutoff()) {
            StreamLocation::Main => Ok((StreamLocation::Main, self.main_chain(stream)?)),
            StreamLocation::Mini if stream.size == 0 => Ok((StreamLocation::Mini, Vec::new())),
            StreamLocation::Mini => Ok((
                StreamLocation::Mini,
                self.mini.table().collect_chain(stream.start)?,
            )),
        }
    }

    /// Concatenate several streams into one holder, in the given order
    pub fn join_streams(&self, paths: &[&str]) -> Result<StreamHolder> {
        let mut holder = StreamHolder::new();
        for &path in paths {
            let data = self.open_stream(path)?;
            holder.append_fragment(path, &data);
        }
        Ok(holder)
    }

    /// Remove a stream, or a storage with everything below it
    ///
    /// The entries leave the directory even when a stream's chain is corrupt;
    /// the first such chain error is returned after every other chain has
    /// been released.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let sid = self.directory.resolve(path)?;
        let cutoff = self.cutoff();
        let removed = self.directory.remove(sid)?;
        let mut first_error = None;

        for entry in &removed {
            let DirectoryEntry::Stream(stream) = entry else {
                continue;
            };
            if stream.size == 0 {
                continue;
            }
            let freed = match stream.location(cutoff) {
                StreamLocation::Mini => self.mini.free(stream.start),
                StreamLocation::Main => self.fat.free_chain(stream.start),
            };
            if let Err(err) = freed {
                log::warn!("Sectors of removed stream '{}' not reclaimed: {}", stream.name, err);
                first_error.get_or_insert(err);
            }
        }
        self.sync_mini_stream();
        log::debug!("Removed '{}' ({} entries)", path, removed.len());
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rename an entry within its storage
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<()> {
        let sid = self.directory.resolve(path)?;
        self.directory.rename(sid, new_name)
    }

    /// Move an entry under another storage, keeping its name
    pub fn move_entry(&mut self, path: &str, new_parent: &str) -> Result<()> {
        let sid = self.directory.resolve(path)?;
        let parent = self.directory.resolve(new_parent)?;
        self.directory.move_to(sid, parent)
    }

    /// Set the class id of a storage (or the root)
    pub fn set_clsid(&mut self, path: &str, clsid: [u8; 16]) -> Result<()> {
        let sid = self.directory.resolve(path)?;
        match self
            .directory
            .get_mut(sid)
            .and_then(DirectoryEntry::as_storage_mut)
        {
            Some(storage) => {
                storage.clsid = clsid;
                Ok(())
            },
            None => Err(OleError::NotAStorage(path.to_string())),
        }
    }

    /// Drop unused directory slots and renumber the live entries
    pub fn compact_directory(&mut self) {
        let before = self.directory.len();
        self.directory.compact();
        log::debug!(
            "Compacted directory from {} to {} entries",
            before,
            self.directory.len()
        );
    }

    /// Walk every stream chain and report the first broken one
    pub fn verify(&self) -> Result<()> {
        for entry in self.directory.entries() {
            if let DirectoryEntry::Stream(stream) = entry {
                self.read_stream_entry(stream)?;
            }
        }
        Ok(())
    }
}

impl Default for OleFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an allocation table stored in the given sectors
fn read_table(store: &BlockStore, kind: TableKind, sectors: &[u32]) -> Result<AllocationTable> {
    let blocks = sectors
        .iter()
        .map(|&sector| store.read_sector(sector))
        .collect::<Result<Vec<_>>>()?;
    Ok(AllocationTable::from_sectors(
        kind,
        blocks.iter().map(|block| block.as_ref()),
    ))
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Check if a file/data is an OLE file by checking magic bytes
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MINIMAL_OLEFILE_SIZE && data.starts_with(MAGIC)
}
