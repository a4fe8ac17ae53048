//! Directory (property table) of a compound file
//!
//! The directory is an array of 128-byte records. Entry 0 is the root
//! storage; every storage points at the root of a binary search tree holding
//! its children, linked through left/right sibling indices.
//!
//! ## Directory Entry Ordering
//!
//! Siblings are ordered the way CFBF readers search them:
//!
//! 1. **Sort by name length first** (shorter names come before longer names)
//! 2. **Then by UTF-16 code unit** after simple upper-casing
//!
//! Example ordering:
//! - `"Data"` (length 4) comes before `"1Table"` (length 6)
//! - `"ABC"` comes before `"xyz"` (both length 3)
//!
//! New entries are inserted with red-black balancing. Deletion is logical:
//! the slot becomes [`DirectoryEntry::Unused`] and the parent's remaining
//! children are relinked into a balanced tree, so no other entry moves.
//! [`Directory::compact`] is the separate bulk operation that renumbers
//! live entries and drops unused slots.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use fixedbitset::FixedBitSet;
use serde::Serialize;
use smallvec::SmallVec;
use zerocopy::{FromBytes, IntoBytes, LE, U16, U32, U64};
use zerocopy_derive::{FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout};

use super::consts::*;
use super::error::{OleError, Result};
use super::header::SectorSize;
use crate::common::binary::parse_utf16le_string;
use crate::common::bitfield::bit_field;

/// Number of 100ns intervals between 1601-01-01 and 1970-01-01
const WINDOWS_EPOCH_OFFSET: i64 = 116_444_736_000_000_000;

/// Color bit in the directory record color byte
const COLOR_MASK: u32 = 0x01;

/// Raw directory entry structure (128 bytes)
#[derive(Debug, Clone, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    /// Entry type (1 = storage, 2 = stream, 5 = root)
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    /// Left sibling SID
    sid_left: U32<LE>,
    /// Right sibling SID
    sid_right: U32<LE>,
    /// Child SID
    sid_child: U32<LE>,
    /// CLSID (16 bytes)
    clsid: [u8; 16],
    /// State bits
    state_bits: U32<LE>,
    /// Creation time (FILETIME)
    creation_time: U64<LE>,
    /// Modified time (FILETIME)
    modified_time: U64<LE>,
    /// Starting sector
    start_sector: U32<LE>,
    /// Stream size
    stream_size: U64<LE>,
}

/// Red-black node color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeColor {
    Red,
    #[default]
    Black,
}

/// Sibling links of an entry inside its parent's tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLinks {
    pub left: u32,
    pub right: u32,
    pub color: NodeColor,
}

impl Default for TreeLinks {
    fn default() -> Self {
        Self {
            left: NOSTREAM,
            right: NOSTREAM,
            color: NodeColor::Black,
        }
    }
}

/// Storage (folder) entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub links: TreeLinks,
    /// Root of the children tree
    pub child: u32,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    /// Creation time as a raw FILETIME
    pub created: u64,
    /// Modification time as a raw FILETIME
    pub modified: u64,
}

impl StorageEntry {
    /// Create an empty storage stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        let now = datetime_to_filetime(Utc::now());
        Self {
            name: name.into(),
            links: TreeLinks::default(),
            child: NOSTREAM,
            clsid: [0; 16],
            state_bits: 0,
            created: now,
            modified: now,
        }
    }
}

/// Root storage entry; also locates the mini stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootEntry {
    pub storage: StorageEntry,
    /// First main sector of the mini stream
    pub mini_stream_start: u32,
    /// Mini stream length in bytes
    pub mini_stream_size: u64,
}

impl RootEntry {
    pub fn new() -> Self {
        let mut storage = StorageEntry::new(ROOT_ENTRY_NAME);
        storage.created = 0;
        storage.modified = 0;
        Self {
            storage,
            mini_stream_start: ENDOFCHAIN,
            mini_stream_size: 0,
        }
    }
}

impl Default for RootEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// Which allocator holds a stream's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamLocation {
    /// 64-byte mini sectors inside the mini stream
    Mini,
    /// Regular sectors in the main FAT
    Main,
}

impl StreamLocation {
    /// Location for a stream of `size` bytes
    #[inline]
    pub fn for_size(size: u64, cutoff: u32) -> Self {
        if size < cutoff as u64 {
            StreamLocation::Mini
        } else {
            StreamLocation::Main
        }
    }
}

/// Stream (file) entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub name: String,
    pub links: TreeLinks,
    /// First sector, in the allocator given by [`StreamEntry::location`]
    pub start: u32,
    pub size: u64,
    pub state_bits: u32,
}

impl StreamEntry {
    pub fn new(name: impl Into<String>, start: u32, size: u64) -> Self {
        Self {
            name: name.into(),
            links: TreeLinks::default(),
            start,
            size,
            state_bits: 0,
        }
    }

    /// Allocator holding this stream, derived from the recorded size only
    #[inline]
    pub fn location(&self, cutoff: u32) -> StreamLocation {
        StreamLocation::for_size(self.size, cutoff)
    }
}

/// One directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry {
    Unused,
    Root(RootEntry),
    Storage(StorageEntry),
    Stream(StreamEntry),
}

impl DirectoryEntry {
    /// Entry name; empty for unused slots
    pub fn name(&self) -> &str {
        match self {
            DirectoryEntry::Unused => "",
            DirectoryEntry::Root(root) => &root.storage.name,
            DirectoryEntry::Storage(storage) => &storage.name,
            DirectoryEntry::Stream(stream) => &stream.name,
        }
    }

    fn set_name(&mut self, name: String) {
        match self {
            DirectoryEntry::Unused => {},
            DirectoryEntry::Root(root) => root.storage.name = name,
            DirectoryEntry::Storage(storage) => storage.name = name,
            DirectoryEntry::Stream(stream) => stream.name = name,
        }
    }

    /// On-disk type tag
    pub fn entry_type(&self) -> u8 {
        match self {
            DirectoryEntry::Unused => STGTY_EMPTY,
            DirectoryEntry::Root(_) => STGTY_ROOT,
            DirectoryEntry::Storage(_) => STGTY_STORAGE,
            DirectoryEntry::Stream(_) => STGTY_STREAM,
        }
    }

    pub fn links(&self) -> Option<&TreeLinks> {
        match self {
            DirectoryEntry::Unused => None,
            DirectoryEntry::Root(root) => Some(&root.storage.links),
            DirectoryEntry::Storage(storage) => Some(&storage.links),
            DirectoryEntry::Stream(stream) => Some(&stream.links),
        }
    }

    pub fn links_mut(&mut self) -> Option<&mut TreeLinks> {
        match self {
            DirectoryEntry::Unused => None,
            DirectoryEntry::Root(root) => Some(&mut root.storage.links),
            DirectoryEntry::Storage(storage) => Some(&mut storage.links),
            DirectoryEntry::Stream(stream) => Some(&mut stream.links),
        }
    }

    /// Storage view; the root counts as a storage
    pub fn as_storage(&self) -> Option<&StorageEntry> {
        match self {
            DirectoryEntry::Root(root) => Some(&root.storage),
            DirectoryEntry::Storage(storage) => Some(storage),
            DirectoryEntry::Unused | DirectoryEntry::Stream(_) => None,
        }
    }

    pub fn as_storage_mut(&mut self) -> Option<&mut StorageEntry> {
        match self {
            DirectoryEntry::Root(root) => Some(&mut root.storage),
            DirectoryEntry::Storage(storage) => Some(storage),
            DirectoryEntry::Unused | DirectoryEntry::Stream(_) => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamEntry> {
        match self {
            DirectoryEntry::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut StreamEntry> {
        match self {
            DirectoryEntry::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Root of the children tree (NOSTREAM for streams and unused slots)
    pub fn child(&self) -> u32 {
        self.as_storage().map_or(NOSTREAM, |storage| storage.child)
    }

    pub fn is_storage(&self) -> bool {
        self.as_storage().is_some()
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, DirectoryEntry::Stream(_))
    }

    pub fn is_root(&self) -> bool {
        matches!(self, DirectoryEntry::Root(_))
    }

    pub fn is_unused(&self) -> bool {
        matches!(self, DirectoryEntry::Unused)
    }

    /// Stream size in bytes (0 for storages)
    pub fn size(&self) -> u64 {
        self.as_stream().map_or(0, |stream| stream.size)
    }

    /// Class id (all zero for streams)
    pub fn clsid(&self) -> [u8; 16] {
        self.as_storage().map_or([0; 16], |storage| storage.clsid)
    }

    /// Creation time, if recorded
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.as_storage()
            .and_then(|storage| filetime_to_datetime(storage.created))
    }

    /// Modification time, if recorded
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.as_storage()
            .and_then(|storage| filetime_to_datetime(storage.modified))
    }

    fn color(&self) -> NodeColor {
        self.links().map_or(NodeColor::Black, |links| links.color)
    }

    fn from_raw(raw: &RawDirectoryEntry, sid: u32, sector_size: SectorSize) -> Self {
        let name_len = raw.name_len.get() as usize;
        let name = parse_utf16le_string(&raw.name[..name_len.saturating_sub(2).min(64)]);

        let color = if bit_field(COLOR_MASK).is_set(raw.node_color as u32) {
            NodeColor::Black
        } else {
            NodeColor::Red
        };
        let links = TreeLinks {
            left: raw.sid_left.get(),
            right: raw.sid_right.get(),
            color,
        };

        let storage = || StorageEntry {
            name: name.clone(),
            links,
            child: raw.sid_child.get(),
            clsid: raw.clsid,
            state_bits: raw.state_bits.get(),
            created: raw.creation_time.get(),
            modified: raw.modified_time.get(),
        };

        // 512-byte sector files only use the low 32 bits of the size
        let size = match sector_size {
            SectorSize::Small => raw.stream_size.get() & 0xFFFF_FFFF,
            SectorSize::Large => raw.stream_size.get(),
        };

        match raw.entry_type {
            STGTY_EMPTY => DirectoryEntry::Unused,
            STGTY_ROOT => DirectoryEntry::Root(RootEntry {
                storage: storage(),
                mini_stream_start: raw.start_sector.get(),
                mini_stream_size: size,
            }),
            STGTY_STORAGE => DirectoryEntry::Storage(storage()),
            STGTY_STREAM => DirectoryEntry::Stream(StreamEntry {
                name: name.clone(),
                links,
                start: raw.start_sector.get(),
                size,
                state_bits: raw.state_bits.get(),
            }),
            other => {
                log::warn!(
                    "Directory entry {} has unsupported type {}; treating it as unused",
                    sid,
                    other
                );
                DirectoryEntry::Unused
            },
        }
    }

    fn to_raw(&self, sector_size: SectorSize) -> RawDirectoryEntry {
        let mut raw = RawDirectoryEntry {
            name: [0; 64],
            name_len: U16::new(0),
            entry_type: self.entry_type(),
            node_color: 0,
            sid_left: U32::new(NOSTREAM),
            sid_right: U32::new(NOSTREAM),
            sid_child: U32::new(NOSTREAM),
            clsid: [0; 16],
            state_bits: U32::new(0),
            creation_time: U64::new(0),
            modified_time: U64::new(0),
            start_sector: U32::new(0),
            stream_size: U64::new(0),
        };
        if self.is_unused() {
            return raw;
        }

        // Encode name to UTF-16LE (max 31 characters + null)
        let utf16: Vec<u16> = self.name().encode_utf16().take(MAX_NAME_LEN).collect();
        for (i, &unit) in utf16.iter().enumerate() {
            raw.name[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        raw.name_len = U16::new(((utf16.len() + 1) * 2) as u16);

        if let Some(links) = self.links() {
            let black = links.color == NodeColor::Black;
            raw.node_color = bit_field(COLOR_MASK).set_boolean(0, black) as u8;
            raw.sid_left = U32::new(links.left);
            raw.sid_right = U32::new(links.right);
        }

        let clamp = |size: u64| match sector_size {
            SectorSize::Small => size & 0xFFFF_FFFF,
            SectorSize::Large => size,
        };

        match self {
            DirectoryEntry::Unused => {},
            DirectoryEntry::Root(root) => {
                write_storage_fields(&mut raw, &root.storage);
                raw.start_sector = U32::new(root.mini_stream_start);
                raw.stream_size = U64::new(clamp(root.mini_stream_size));
            },
            DirectoryEntry::Storage(storage) => write_storage_fields(&mut raw, storage),
            DirectoryEntry::Stream(stream) => {
                raw.state_bits = U32::new(stream.state_bits);
                raw.start_sector = U32::new(stream.start);
                raw.stream_size = U64::new(clamp(stream.size));
            },
        }
        raw
    }
}

fn write_storage_fields(raw: &mut RawDirectoryEntry, storage: &StorageEntry) {
    raw.sid_child = U32::new(storage.child);
    raw.clsid = storage.clsid;
    raw.state_bits = U32::new(storage.state_bits);
    raw.creation_time = U64::new(storage.created);
    raw.modified_time = U64::new(storage.modified);
}

/// Convert a FILETIME (100ns ticks since 1601) to a UTC timestamp
///
/// Zero means "not recorded" and maps to `None`.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let ticks = i64::try_from(filetime).ok()? - WINDOWS_EPOCH_OFFSET;
    let secs = ticks.div_euclid(10_000_000);
    let nanos = (ticks.rem_euclid(10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Convert a UTC timestamp to a FILETIME
pub fn datetime_to_filetime(time: DateTime<Utc>) -> u64 {
    let ticks = time.timestamp() * 10_000_000
        + (time.timestamp_subsec_nanos() / 100) as i64
        + WINDOWS_EPOCH_OFFSET;
    ticks.max(0) as u64
}

/// Upper-case one UTF-16 code unit when the mapping stays one unit wide
fn fold_unit(unit: u16) -> u16 {
    match char::from_u32(unit as u32) {
        Some(c) => {
            let mut upper = c.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) if (u as u32) <= 0xFFFF => u as u16,
                _ => unit,
            }
        },
        None => unit,
    }
}

/// Compare two entry names in sibling-tree order
///
/// Shorter names sort first; names of equal length compare by UTF-16 code
/// unit after simple upper-casing.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let a_len = a.encode_utf16().count();
    let b_len = b.encode_utf16().count();
    a_len.cmp(&b_len).then_with(|| {
        a.encode_utf16()
            .map(fold_unit)
            .cmp(b.encode_utf16().map(fold_unit))
    })
}

/// Check that a name can be stored in a directory record
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(OleError::InvalidName("name is empty".to_string()));
    }
    if name.encode_utf16().count() > MAX_NAME_LEN {
        return Err(OleError::InvalidName(format!(
            "'{}' is longer than {} UTF-16 code units",
            name, MAX_NAME_LEN
        )));
    }
    if name.contains(['/', '\\', ':', '!', '\0']) {
        return Err(OleError::InvalidName(format!(
            "'{}' contains a reserved character",
            name
        )));
    }
    Ok(())
}

/// Split a path into components
///
/// Accepts `/` separated paths with or without a leading slash. A leading
/// `Root Entry` component names the root storage and is dropped.
pub fn split_path(path: &str) -> SmallVec<[&str; 8]> {
    let mut components: SmallVec<[&str; 8]> =
        path.split('/').filter(|part| !part.is_empty()).collect();
    if components.first() == Some(&ROOT_ENTRY_NAME) {
        components.remove(0);
    }
    components
}

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Root,
    Storage,
    Stream,
}

/// Summary of a live directory entry, as returned by listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Directory index
    pub sid: u32,
    pub name: String,
    /// Full path from the root, `/` separated
    pub path: String,
    pub kind: EntryKind,
    /// Stream size (0 for storages)
    pub size: u64,
    /// Allocator holding the stream data
    pub location: Option<StreamLocation>,
    pub clsid: [u8; 16],
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// The directory arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// A directory holding only the root storage
    pub fn new() -> Self {
        Self {
            entries: vec![DirectoryEntry::Root(RootEntry::new())],
        }
    }

    /// Parse the directory stream and validate its hierarchy
    ///
    /// Link indices outside the table, entries reachable twice, links to
    /// unused records and a missing or duplicated root all fail. Live
    /// entries not reachable from the root are demoted to unused.
    pub fn parse(data: &[u8], sector_size: SectorSize) -> Result<Self> {
        let mut entries = Vec::with_capacity(data.len() / DIRENTRY_SIZE);
        for (sid, chunk) in data.chunks_exact(DIRENTRY_SIZE).enumerate() {
            let raw = RawDirectoryEntry::read_from_bytes(chunk).map_err(|_| {
                OleError::CorruptDirectory(format!("Failed to parse directory entry {}", sid))
            })?;
            entries.push(DirectoryEntry::from_raw(&raw, sid as u32, sector_size));
        }

        match entries.first() {
            None => return Err(OleError::InvalidRoot("directory is empty".to_string())),
            Some(DirectoryEntry::Root(_)) => {},
            Some(_) => {
                return Err(OleError::InvalidRoot(
                    "entry 0 is not a root storage".to_string(),
                ));
            },
        }
        if let Some(sid) = entries.iter().skip(1).position(DirectoryEntry::is_root) {
            return Err(OleError::InvalidRoot(format!(
                "second root storage at entry {}",
                sid + 1
            )));
        }

        let mut directory = Self { entries };
        let reachable = directory.validate_links()?;
        for sid in 1..directory.entries.len() {
            if !reachable.contains(sid) && !directory.entries[sid].is_unused() {
                log::warn!(
                    "Directory entry {} ('{}') is not reachable from the root; dropping it",
                    sid,
                    directory.entries[sid].name()
                );
                directory.entries[sid] = DirectoryEntry::Unused;
            }
        }

        log::debug!(
            "Parsed directory with {} records ({} live)",
            directory.entries.len(),
            directory.live_count()
        );
        Ok(directory)
    }

    /// Walk every tree from the root with an explicit stack
    fn validate_links(&self) -> Result<FixedBitSet> {
        let limit = self.entries.len() as u32;
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        visited.insert(0);

        let mut stack = vec![self.entries[0].child()];
        while let Some(sid) = stack.pop() {
            if sid == NOSTREAM {
                continue;
            }
            if sid >= limit {
                return Err(OleError::DirectoryIndexOutOfRange { sid, limit });
            }
            if visited.put(sid as usize) {
                return Err(OleError::DirectoryCycle { sid });
            }
            let entry = &self.entries[sid as usize];
            let Some(links) = entry.links() else {
                return Err(OleError::CorruptDirectory(format!(
                    "entry {} is linked into the tree but unused",
                    sid
                )));
            };
            stack.push(links.left);
            stack.push(links.right);
            stack.push(entry.child());
        }
        Ok(visited)
    }

    /// Number of records, including unused ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of live (non-unused) records
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_unused()).count()
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn get(&self, sid: u32) -> Option<&DirectoryEntry> {
        self.entries.get(sid as usize)
    }

    pub fn get_mut(&mut self, sid: u32) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(sid as usize)
    }

    /// Start sector and size of the mini stream
    pub fn mini_stream(&self) -> (u32, u64) {
        match self.entries.first() {
            Some(DirectoryEntry::Root(root)) => (root.mini_stream_start, root.mini_stream_size),
            _ => (ENDOFCHAIN, 0),
        }
    }

    /// Record the mini stream location in the root entry
    pub fn set_mini_stream(&mut self, start: u32, size: u64) {
        if let Some(DirectoryEntry::Root(root)) = self.entries.first_mut() {
            root.mini_stream_start = start;
            root.mini_stream_size = size;
        }
    }

    fn links_of(&self, sid: u32) -> TreeLinks {
        self.entries
            .get(sid as usize)
            .and_then(DirectoryEntry::links)
            .copied()
            .unwrap_or_default()
    }

    fn links_mut(&mut self, sid: u32) -> Option<&mut TreeLinks> {
        self.entries
            .get_mut(sid as usize)
            .and_then(DirectoryEntry::links_mut)
    }

    fn set_left(&mut self, sid: u32, left: u32) {
        if let Some(links) = self.links_mut(sid) {
            links.left = left;
        }
    }

    fn set_right(&mut self, sid: u32, right: u32) {
        if let Some(links) = self.links_mut(sid) {
            links.right = right;
        }
    }

    fn set_color(&mut self, sid: u32, color: NodeColor) {
        if let Some(links) = self.links_mut(sid) {
            links.color = color;
        }
    }

    fn color_of(&self, sid: u32) -> NodeColor {
        if sid == NOSTREAM {
            return NodeColor::Black;
        }
        self.entries
            .get(sid as usize)
            .map_or(NodeColor::Black, DirectoryEntry::color)
    }

    fn child_of(&self, storage: u32) -> u32 {
        self.entries
            .get(storage as usize)
            .map_or(NOSTREAM, DirectoryEntry::child)
    }

    fn set_child(&mut self, storage: u32, child: u32) {
        if let Some(storage) = self
            .entries
            .get_mut(storage as usize)
            .and_then(DirectoryEntry::as_storage_mut)
        {
            storage.child = child;
        }
    }

    fn name_of(&self, sid: u32) -> &str {
        self.entries
            .get(sid as usize)
            .map_or("", DirectoryEntry::name)
    }

    /// Children of a storage, in tree order
    pub fn children(&self, storage: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut seen = FixedBitSet::with_capacity(self.entries.len());
        let mut stack: Vec<u32> = Vec::new();
        let mut current = self.child_of(storage);

        loop {
            while current != NOSTREAM
                && (current as usize) < self.entries.len()
                && !seen.put(current as usize)
            {
                stack.push(current);
                current = self.links_of(current).left;
            }
            let Some(sid) = stack.pop() else {
                break;
            };
            out.push(sid);
            current = self.links_of(sid).right;
        }
        out
    }

    /// Parent storage of every live entry (NOSTREAM for the root and unused slots)
    pub fn parent_map(&self) -> Vec<u32> {
        let mut parents = vec![NOSTREAM; self.entries.len()];
        for (sid, entry) in self.entries.iter().enumerate() {
            if entry.is_storage() {
                for child in self.children(sid as u32) {
                    parents[child as usize] = sid as u32;
                }
            }
        }
        parents
    }

    /// Parent storage of an entry
    pub fn parent_of(&self, sid: u32) -> Option<u32> {
        self.parent_map()
            .get(sid as usize)
            .copied()
            .filter(|&parent| parent != NOSTREAM)
    }

    /// Full path of an entry (empty for the root)
    pub fn path_of(&self, sid: u32) -> Option<String> {
        self.path_with(sid, &self.parent_map())
    }

    pub(crate) fn path_with(&self, sid: u32, parents: &[u32]) -> Option<String> {
        let entry = self.get(sid)?;
        if entry.is_unused() {
            return None;
        }
        let mut names = Vec::new();
        let mut current = sid;
        while current != 0 {
            names.push(self.name_of(current));
            current = *parents.get(current as usize)?;
            if current == NOSTREAM || names.len() > self.entries.len() {
                return None;
            }
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Find a child by name
    ///
    /// Searches the sibling tree first. Trees written by other tools are not
    /// always ordered, so a miss falls back to scanning every child.
    pub fn find_child(&self, storage: u32, name: &str) -> Option<u32> {
        let mut current = self.child_of(storage);
        let mut steps = 0;
        while current != NOSTREAM && steps <= self.entries.len() {
            match compare_names(name, self.name_of(current)) {
                Ordering::Equal => return Some(current),
                Ordering::Less => current = self.links_of(current).left,
                Ordering::Greater => current = self.links_of(current).right,
            }
            steps += 1;
        }

        let found = self
            .children(storage)
            .into_iter()
            .find(|&sid| compare_names(name, self.name_of(sid)) == Ordering::Equal);
        if let Some(sid) = found {
            log::debug!(
                "Sibling tree under entry {} is not ordered; found '{}' at entry {} by scan",
                storage,
                name,
                sid
            );
        }
        found
    }

    /// Resolve a path to a directory index
    pub fn resolve(&self, path: &str) -> Result<u32> {
        let mut current = 0u32;
        for component in split_path(path) {
            if !self.entries[current as usize].is_storage() {
                return Err(OleError::NotAStorage(self.path_of(current).unwrap_or_default()));
            }
            current = self
                .find_child(current, component)
                .ok_or_else(|| OleError::EntryNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Insert a new entry under a storage
    ///
    /// The first unused slot is reused, otherwise the table grows. Returns
    /// the entry's directory index.
    pub fn insert(&mut self, parent: u32, entry: DirectoryEntry) -> Result<u32> {
        if !self.get(parent).is_some_and(DirectoryEntry::is_storage) {
            return Err(OleError::NotAStorage(format!("entry {}", parent)));
        }
        if entry.is_unused() || entry.is_root() {
            return Err(OleError::InvalidName(
                "only storages and streams can be inserted".to_string(),
            ));
        }
        validate_name(entry.name())?;
        if self.find_child(parent, entry.name()).is_some() {
            return Err(OleError::EntryExists(entry.name().to_string()));
        }

        let sid = match self.entries.iter().skip(1).position(DirectoryEntry::is_unused) {
            Some(idx) => {
                let sid = idx + 1;
                self.entries[sid] = entry;
                sid
            },
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            },
        };
        if sid as u32 > MAXREGSID {
            self.entries[sid] = DirectoryEntry::Unused;
            return Err(OleError::ContainerTooLarge(
                "directory has no addressable entry left".to_string(),
            ));
        }

        self.attach(parent, sid as u32);
        Ok(sid as u32)
    }

    /// Link an entry into a storage's tree with red-black insertion
    fn attach(&mut self, storage: u32, sid: u32) {
        if let Some(links) = self.links_mut(sid) {
            *links = TreeLinks {
                left: NOSTREAM,
                right: NOSTREAM,
                color: NodeColor::Red,
            };
        }

        let root = self.child_of(storage);
        if root == NOSTREAM {
            self.set_child(storage, sid);
            self.set_color(sid, NodeColor::Black);
            return;
        }

        // Ancestors from the tree root down to the new node's parent
        let mut path: SmallVec<[u32; 16]> = SmallVec::new();
        let mut current = root;
        loop {
            path.push(current);
            let links = self.links_of(current);
            if compare_names(self.name_of(sid), self.name_of(current)) == Ordering::Less {
                if links.left == NOSTREAM {
                    self.set_left(current, sid);
                    break;
                }
                current = links.left;
            } else {
                if links.right == NOSTREAM {
                    self.set_right(current, sid);
                    break;
                }
                current = links.right;
            }
        }

        let mut node = sid;
        while let Some(&parent) = path.last() {
            if self.color_of(parent) == NodeColor::Black {
                break;
            }
            // A red parent is never the tree root, so the grandparent exists
            let Some(&grand) = path.get(path.len().wrapping_sub(2)) else {
                break;
            };
            let parent_is_left = self.links_of(grand).left == parent;
            let uncle = if parent_is_left {
                self.links_of(grand).right
            } else {
                self.links_of(grand).left
            };

            if self.color_of(uncle) == NodeColor::Red {
                self.set_color(parent, NodeColor::Black);
                self.set_color(uncle, NodeColor::Black);
                self.set_color(grand, NodeColor::Red);
                node = grand;
                path.truncate(path.len() - 2);
                continue;
            }

            let mut top = parent;
            if parent_is_left && self.links_of(parent).right == node {
                top = self.rotate_left(parent);
                self.set_left(grand, top);
            } else if !parent_is_left && self.links_of(parent).left == node {
                top = self.rotate_right(parent);
                self.set_right(grand, top);
            }

            self.set_color(top, NodeColor::Black);
            self.set_color(grand, NodeColor::Red);
            let rotated = if parent_is_left {
                self.rotate_right(grand)
            } else {
                self.rotate_left(grand)
            };
            match path.len().checked_sub(3).map(|idx| path[idx]) {
                Some(above) => {
                    if self.links_of(above).left == grand {
                        self.set_left(above, rotated);
                    } else {
                        self.set_right(above, rotated);
                    }
                },
                None => self.set_child(storage, rotated),
            }
            break;
        }

        let root = self.child_of(storage);
        self.set_color(root, NodeColor::Black);
    }

    /// Rotate `node` left; returns the new subtree root
    fn rotate_left(&mut self, node: u32) -> u32 {
        let pivot = self.links_of(node).right;
        let inner = self.links_of(pivot).left;
        self.set_right(node, inner);
        self.set_left(pivot, node);
        pivot
    }

    /// Rotate `node` right; returns the new subtree root
    fn rotate_right(&mut self, node: u32) -> u32 {
        let pivot = self.links_of(node).left;
        let inner = self.links_of(pivot).right;
        self.set_left(node, inner);
        self.set_right(pivot, node);
        pivot
    }

    /// Relink sorted siblings into a balanced tree under `storage`
    ///
    /// The middle element becomes the root of each subtree. Nodes on the
    /// deepest level are red when the tree has more than one level, which
    /// keeps every root-to-leaf path at the same black height.
    fn rebuild_tree(&mut self, storage: u32, sorted: &[u32]) {
        fn height(n: usize) -> usize {
            (usize::BITS - n.leading_zeros()) as usize
        }

        fn build(dir: &mut Directory, sorted: &[u32], depth: usize, max_depth: usize) -> u32 {
            if sorted.is_empty() {
                return NOSTREAM;
            }
            let mid = sorted.len() / 2;
            let sid = sorted[mid];
            let left = build(dir, &sorted[..mid], depth + 1, max_depth);
            let right = build(dir, &sorted[mid + 1..], depth + 1, max_depth);
            let color = if depth == max_depth && max_depth > 1 {
                NodeColor::Red
            } else {
                NodeColor::Black
            };
            if let Some(links) = dir.links_mut(sid) {
                *links = TreeLinks { left, right, color };
            }
            sid
        }

        let root = build(self, sorted, 1, height(sorted.len()));
        self.set_child(storage, root);
    }

    /// Children of a storage sorted by name
    fn sorted_children(&self, storage: u32) -> Vec<u32> {
        let mut kids = self.children(storage);
        kids.sort_by(|&a, &b| compare_names(self.name_of(a), self.name_of(b)));
        kids
    }

    /// Take an entry out of its parent's tree, leaving it live
    fn detach(&mut self, sid: u32) -> Result<u32> {
        let parent = self
            .parent_of(sid)
            .ok_or_else(|| OleError::InvalidPath(format!("entry {} has no parent", sid)))?;
        let remaining: Vec<u32> = self
            .sorted_children(parent)
            .into_iter()
            .filter(|&child| child != sid)
            .collect();
        self.rebuild_tree(parent, &remaining);
        Ok(parent)
    }

    /// Logically delete an entry and, for storages, everything below it
    ///
    /// Returns the removed entries so the caller can release their data.
    pub fn remove(&mut self, sid: u32) -> Result<Vec<DirectoryEntry>> {
        if sid == 0 {
            return Err(OleError::InvalidPath(
                "the root storage cannot be removed".to_string(),
            ));
        }
        if self.get(sid).is_none_or(DirectoryEntry::is_unused) {
            return Err(OleError::EntryNotFound(format!("entry {}", sid)));
        }

        self.detach(sid)?;

        let mut removed = Vec::new();
        let mut stack = vec![sid];
        while let Some(current) = stack.pop() {
            if self.get(current).is_some_and(DirectoryEntry::is_storage) {
                stack.extend(self.children(current));
            }
            removed.push(std::mem::replace(
                &mut self.entries[current as usize],
                DirectoryEntry::Unused,
            ));
        }
        Ok(removed)
    }

    /// Rename an entry in place
    pub fn rename(&mut self, sid: u32, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let parent = self
            .parent_of(sid)
            .ok_or_else(|| OleError::InvalidPath("the root storage cannot be renamed".to_string()))?;
        if self
            .find_child(parent, new_name)
            .is_some_and(|existing| existing != sid)
        {
            return Err(OleError::EntryExists(new_name.to_string()));
        }
        if let Some(entry) = self.get_mut(sid) {
            entry.set_name(new_name.to_string());
        }
        let sorted = self.sorted_children(parent);
        self.rebuild_tree(parent, &sorted);
        Ok(())
    }

    /// Move an entry under another storage
    ///
    /// Moving an entry into the storage that already holds it does nothing.
    pub fn move_to(&mut self, sid: u32, new_parent: u32) -> Result<()> {
        if !self.get(new_parent).is_some_and(DirectoryEntry::is_storage) {
            return Err(OleError::NotAStorage(format!("entry {}", new_parent)));
        }
        if self.parent_of(sid) == Some(new_parent) {
            return Ok(());
        }
        let parents = self.parent_map();
        let mut current = new_parent;
        while current != NOSTREAM {
            if current == sid {
                return Err(OleError::InvalidPath(
                    "cannot move a storage below itself".to_string(),
                ));
            }
            current = parents[current as usize];
        }
        if self.find_child(new_parent, self.name_of(sid)).is_some() {
            return Err(OleError::EntryExists(self.name_of(sid).to_string()));
        }

        self.detach(sid)?;
        self.attach(new_parent, sid);
        Ok(())
    }

    /// Renumber live entries in hierarchy order and drop unused slots
    ///
    /// Every sibling tree is rebuilt balanced. Returns the old-to-new index
    /// map (NOSTREAM for dropped slots).
    pub fn compact(&mut self) -> Vec<u32> {
        let mut order = vec![0u32];
        let mut groups: Vec<(u32, Vec<u32>)> = Vec::new();
        let mut next = 0;
        while next < order.len() {
            let sid = order[next];
            next += 1;
            if self.entries[sid as usize].is_storage() {
                let kids = self.sorted_children(sid);
                order.extend(&kids);
                groups.push((sid, kids));
            }
        }

        let mut remap = vec![NOSTREAM; self.entries.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old as usize] = new as u32;
        }

        let mut old_entries = std::mem::take(&mut self.entries);
        self.entries = order
            .iter()
            .map(|&old| std::mem::replace(&mut old_entries[old as usize], DirectoryEntry::Unused))
            .collect();
        if let Some(links) = self.links_mut(0) {
            *links = TreeLinks::default();
        }

        for (storage, kids) in groups {
            let kids: Vec<u32> = kids.iter().map(|&k| remap[k as usize]).collect();
            self.rebuild_tree(remap[storage as usize], &kids);
        }
        remap
    }

    /// Summary of one entry
    pub(crate) fn info(&self, sid: u32, path: String, cutoff: u32) -> Option<EntryInfo> {
        let entry = self.get(sid)?;
        let kind = match entry {
            DirectoryEntry::Unused => return None,
            DirectoryEntry::Root(_) => EntryKind::Root,
            DirectoryEntry::Storage(_) => EntryKind::Storage,
            DirectoryEntry::Stream(_) => EntryKind::Stream,
        };
        Some(EntryInfo {
            sid,
            name: entry.name().to_string(),
            path,
            kind,
            size: entry.size(),
            location: entry.as_stream().map(|stream| stream.location(cutoff)),
            clsid: entry.clsid(),
            created: entry.created(),
            modified: entry.modified(),
        })
    }

    /// Encode the directory, padded with unused records to whole sectors
    pub fn serialize(&self, sector_size: SectorSize) -> Vec<u8> {
        let per_sector = sector_size.dir_entries_per_sector();
        let records = self.entries.len().div_ceil(per_sector).max(1) * per_sector;
        let mut data = Vec::with_capacity(records * DIRENTRY_SIZE);
        for entry in &self.entries {
            data.extend_from_slice(entry.to_raw(sector_size).as_bytes());
        }
        let unused = DirectoryEntry::Unused.to_raw(sector_size);
        for _ in self.entries.len()..records {
            data.extend_from_slice(unused.as_bytes());
        }
        data
    }

    /// Number of sectors the serialized directory occupies
    pub fn sector_count(&self, sector_size: SectorSize) -> usize {
        self.entries
            .len()
            .div_ceil(sector_size.dir_entries_per_sector())
            .max(1)
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stream(name: &str) -> DirectoryEntry {
        DirectoryEntry::Stream(StreamEntry::new(name, ENDOFCHAIN, 0))
    }

    fn storage(name: &str) -> DirectoryEntry {
        DirectoryEntry::Storage(StorageEntry::new(name))
    }

    /// Check ordering, red-red and black height of a storage's tree
    fn check_red_black(dir: &Directory, storage: u32) {
        fn walk(dir: &Directory, sid: u32) -> usize {
            if sid == NOSTREAM {
                return 1;
            }
            let links = dir.links_of(sid);
            if links.color == NodeColor::Red {
                assert_eq!(dir.color_of(links.left), NodeColor::Black);
                assert_eq!(dir.color_of(links.right), NodeColor::Black);
            }
            let left = walk(dir, links.left);
            let right = walk(dir, links.right);
            assert_eq!(left, right, "black height differs below {}", sid);
            left + usize::from(links.color == NodeColor::Black)
        }

        let root = dir.child_of(storage);
        assert_eq!(dir.color_of(root), NodeColor::Black);
        walk(dir, root);

        let names: Vec<&str> = dir
            .children(storage)
            .into_iter()
            .map(|sid| dir.name_of(sid))
            .collect();
        for pair in names.windows(2) {
            assert_eq!(compare_names(pair[0], pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn test_name_ordering() {
        assert_eq!(compare_names("Data", "1Table"), Ordering::Less);
        assert_eq!(compare_names("1Table", "WordDocument"), Ordering::Less);
        assert_eq!(compare_names("ABC", "xyz"), Ordering::Less);
        assert_eq!(compare_names("abc", "ABC"), Ordering::Equal);
        assert_eq!(compare_names("B", "a"), Ordering::Greater);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("WordDocument").is_ok());
        assert!(validate_name("\u{5}SummaryInformation").is_ok());
        assert!(matches!(validate_name(""), Err(OleError::InvalidName(_))));
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(&"x".repeat(31)).is_ok());
        assert!(validate_name(&"x".repeat(32)).is_err());
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("Data/Stream1").as_slice(), &["Data", "Stream1"]);
        assert_eq!(split_path("/Data//Stream1/").as_slice(), &["Data", "Stream1"]);
        assert_eq!(
            split_path("Root Entry/Data/Stream1").as_slice(),
            &["Data", "Stream1"]
        );
        assert!(split_path("/").is_empty());
    }

    #[test]
    fn test_filetime_conversion() {
        assert_eq!(filetime_to_datetime(0), None);
        let epoch = filetime_to_datetime(WINDOWS_EPOCH_OFFSET as u64).unwrap();
        assert_eq!(epoch.timestamp(), 0);

        let time = DateTime::from_timestamp(1_600_000_000, 123_456_700).unwrap();
        assert_eq!(
            filetime_to_datetime(datetime_to_filetime(time)),
            Some(time)
        );
    }

    #[test]
    fn test_insert_and_find() {
        let mut dir = Directory::new();
        let data = dir.insert(0, storage("Data")).unwrap();
        let s1 = dir.insert(data, stream("Stream1")).unwrap();
        dir.insert(0, stream("WordDocument")).unwrap();

        assert_eq!(dir.find_child(0, "data"), Some(data));
        assert_eq!(dir.resolve("Data/Stream1").unwrap(), s1);
        assert_eq!(dir.resolve("/Root Entry/Data/Stream1").unwrap(), s1);
        assert_eq!(dir.resolve("").unwrap(), 0);
        assert!(matches!(
            dir.resolve("Data/Missing"),
            Err(OleError::EntryNotFound(_))
        ));
        assert!(matches!(
            dir.resolve("WordDocument/x"),
            Err(OleError::NotAStorage(_))
        ));
        assert_eq!(dir.path_of(s1).as_deref(), Some("Data/Stream1"));
        assert_eq!(dir.parent_of(s1), Some(data));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut dir = Directory::new();
        dir.insert(0, stream("Book")).unwrap();
        assert!(matches!(
            dir.insert(0, stream("BOOK")),
            Err(OleError::EntryExists(_))
        ));
        assert!(matches!(
            dir.insert(1, stream("x")),
            Err(OleError::NotAStorage(_))
        ));
    }

    #[test]
    fn test_red_black_after_sequential_inserts() {
        let mut dir = Directory::new();
        for i in 0..100 {
            dir.insert(0, stream(&format!("S{:03}", i))).unwrap();
        }
        check_red_black(&dir, 0);
        assert_eq!(dir.children(0).len(), 100);
    }

    #[test]
    fn test_remove_keeps_slots_and_search() {
        let mut dir = Directory::new();
        let names = ["Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta"];
        let sids: Vec<u32> = names
            .iter()
            .map(|name| dir.insert(0, stream(name)).unwrap())
            .collect();

        let removed = dir.remove(sids[2]).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(dir.get(sids[2]).unwrap().is_unused());
        assert_eq!(dir.len(), 8);
        check_red_black(&dir, 0);

        // The freed slot is reused for the next entry
        let theta = dir.insert(0, stream("Theta")).unwrap();
        assert_eq!(theta, sids[2]);
        check_red_black(&dir, 0);

        for (name, &sid) in names.iter().zip(&sids) {
            if *name == "Gamma" {
                assert_eq!(dir.find_child(0, name), None);
            } else {
                assert_eq!(dir.find_child(0, name), Some(sid));
            }
        }
        assert_eq!(dir.find_child(0, "Theta"), Some(theta));
    }

    #[test]
    fn test_remove_storage_recursively() {
        let mut dir = Directory::new();
        let a = dir.insert(0, storage("A")).unwrap();
        let b = dir.insert(a, storage("B")).unwrap();
        dir.insert(b, stream("s1")).unwrap();
        dir.insert(a, stream("s2")).unwrap();
        dir.insert(0, stream("keep")).unwrap();

        let removed = dir.remove(a).unwrap();
        assert_eq!(removed.len(), 4);
        assert_eq!(dir.live_count(), 2);
        assert_eq!(dir.children(0).len(), 1);
        assert!(matches!(dir.remove(0), Err(OleError::InvalidPath(_))));
        assert!(matches!(dir.remove(a), Err(OleError::EntryNotFound(_))));
    }

    #[test]
    fn test_rename_and_move() {
        let mut dir = Directory::new();
        let a = dir.insert(0, storage("A")).unwrap();
        let s = dir.insert(0, stream("Stream")).unwrap();
        dir.insert(0, stream("Other")).unwrap();

        dir.rename(s, "Renamed").unwrap();
        assert_eq!(dir.find_child(0, "Renamed"), Some(s));
        assert_eq!(dir.find_child(0, "Stream"), None);
        assert!(matches!(
            dir.rename(s, "Other"),
            Err(OleError::EntryExists(_))
        ));

        dir.move_to(s, a).unwrap();
        assert_eq!(dir.path_of(s).as_deref(), Some("A/Renamed"));
        // Already there
        dir.move_to(s, a).unwrap();
        assert_eq!(dir.path_of(s).as_deref(), Some("A/Renamed"));
        assert_eq!(dir.children(a), vec![s]);
        assert_eq!(dir.find_child(0, "Renamed"), None);
        check_red_black(&dir, 0);
        assert!(matches!(dir.move_to(a, a), Err(OleError::InvalidPath(_))));
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let mut dir = Directory::new();
        let data = dir.insert(0, storage("Data")).unwrap();
        dir.insert(data, DirectoryEntry::Stream(StreamEntry::new("Stream1", 3, 10000)))
            .unwrap();
        dir.set_mini_stream(7, 128);

        let bytes = dir.serialize(SectorSize::Small);
        assert_eq!(bytes.len(), 512);
        let parsed = Directory::parse(&bytes, SectorSize::Small).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(&parsed.entries()[..3], &dir.entries()[..3]);
        assert!(parsed.entries()[3].is_unused());
        assert_eq!(parsed.mini_stream(), (7, 128));
    }

    #[test]
    fn test_small_sector_size_ignores_high_bits() {
        let mut dir = Directory::new();
        dir.insert(0, DirectoryEntry::Stream(StreamEntry::new("s", 0, 5000)))
            .unwrap();
        let mut bytes = dir.serialize(SectorSize::Small);
        // Set the high 32 bits of the stream size
        bytes[128 + 124..128 + 128].copy_from_slice(&1u32.to_le_bytes());
        let parsed = Directory::parse(&bytes, SectorSize::Small).unwrap();
        assert_eq!(parsed.get(1).unwrap().size(), 5000);
    }

    fn raw_dir(entries: &[DirectoryEntry]) -> Vec<u8> {
        let dir = Directory {
            entries: entries.to_vec(),
        };
        dir.serialize(SectorSize::Small)
    }

    #[test]
    fn test_parse_rejects_out_of_range_link() {
        let mut root = RootEntry::new();
        root.storage.child = 40;
        let bytes = raw_dir(&[DirectoryEntry::Root(root)]);
        let err = Directory::parse(&bytes, SectorSize::Small).unwrap_err();
        assert!(matches!(
            err,
            OleError::DirectoryIndexOutOfRange { sid: 40, limit: 4 }
        ));
        assert!(err.is_directory_integrity());
    }

    #[test]
    fn test_parse_rejects_sibling_cycle() {
        let mut root = RootEntry::new();
        root.storage.child = 1;
        let mut a = StreamEntry::new("a", ENDOFCHAIN, 0);
        a.links.right = 2;
        let mut b = StreamEntry::new("b", ENDOFCHAIN, 0);
        b.links.left = 1;
        let bytes = raw_dir(&[
            DirectoryEntry::Root(root),
            DirectoryEntry::Stream(a),
            DirectoryEntry::Stream(b),
        ]);
        assert!(matches!(
            Directory::parse(&bytes, SectorSize::Small),
            Err(OleError::DirectoryCycle { sid: 1 })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_root() {
        let bytes = raw_dir(&[storage("NotRoot")]);
        assert!(matches!(
            Directory::parse(&bytes, SectorSize::Small),
            Err(OleError::InvalidRoot(_))
        ));

        let bytes = raw_dir(&[
            DirectoryEntry::Root(RootEntry::new()),
            DirectoryEntry::Root(RootEntry::new()),
        ]);
        assert!(matches!(
            Directory::parse(&bytes, SectorSize::Small),
            Err(OleError::InvalidRoot(_))
        ));
        assert!(matches!(
            Directory::parse(&[], SectorSize::Small),
            Err(OleError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_parse_rejects_link_to_unused() {
        let mut root = RootEntry::new();
        root.storage.child = 2;
        let bytes = raw_dir(&[DirectoryEntry::Root(root), stream("x")]);
        assert!(matches!(
            Directory::parse(&bytes, SectorSize::Small),
            Err(OleError::CorruptDirectory(_))
        ));
    }

    #[test]
    fn test_parse_drops_unreachable_entries() {
        let bytes = raw_dir(&[DirectoryEntry::Root(RootEntry::new()), stream("orphan")]);
        let parsed = Directory::parse(&bytes, SectorSize::Small).unwrap();
        assert!(parsed.get(1).unwrap().is_unused());
    }

    #[test]
    fn test_find_child_in_unsorted_tree() {
        // "Zed" at the root with "Abc" as its right child breaks the ordering
        let mut root = RootEntry::new();
        root.storage.child = 1;
        let mut zed = StreamEntry::new("Zed", ENDOFCHAIN, 0);
        zed.links.right = 2;
        let bytes = raw_dir(&[
            DirectoryEntry::Root(root),
            DirectoryEntry::Stream(zed),
            stream("Abc"),
        ]);
        let dir = Directory::parse(&bytes, SectorSize::Small).unwrap();
        assert_eq!(dir.find_child(0, "Abc"), Some(2));
    }

    #[test]
    fn test_compact() {
        let mut dir = Directory::new();
        let a = dir.insert(0, stream("a")).unwrap();
        let b = dir.insert(0, storage("b")).unwrap();
        dir.insert(b, stream("c")).unwrap();
        dir.remove(a).unwrap();
        assert_eq!(dir.len(), 4);

        let remap = dir.compact();
        assert_eq!(dir.len(), 3);
        assert_eq!(remap[a as usize], NOSTREAM);
        assert_eq!(dir.resolve("b/c").unwrap(), 2);
        check_red_black(&dir, 0);
    }

    proptest! {
        #[test]
        fn prop_red_black_after_random_inserts(
            names in proptest::collection::hash_set("[a-zA-Z0-9]{1,12}", 1..60),
            removals in proptest::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let mut dir = Directory::new();
            let mut seen: Vec<String> = Vec::new();
            for name in &names {
                // Case-insensitive duplicates are rejected
                if seen.iter().any(|s| compare_names(s, name) == Ordering::Equal) {
                    prop_assert!(dir.insert(0, stream(name)).is_err());
                    continue;
                }
                dir.insert(0, stream(name)).unwrap();
                seen.push(name.clone());
            }
            check_red_black(&dir, 0);

            for index in removals {
                if seen.is_empty() {
                    break;
                }
                let name = seen.remove(index.index(seen.len()));
                let sid = dir.find_child(0, &name).unwrap();
                dir.remove(sid).unwrap();
                check_red_black(&dir, 0);
            }
            for name in &seen {
                prop_assert!(dir.find_child(0, name).is_some());
            }
        }
    }
}
