//! Integration tests for the OLE writer
//!
//! These tests verify that written files can be read back by the reader,
//! and that files read back can be edited and written again.

use std::collections::BTreeMap;
use std::io::Cursor;

use proptest::prelude::*;

use super::super::consts::*;
use super::super::directory::StreamLocation;
use super::super::error::{OleError, TableKind};
use super::super::file::OleFileSystem;
use super::super::header::SectorSize;
use super::super::options::OleOptions;

fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)?.try_into().ok().map(u16::from_le_bytes)
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)?.try_into().ok().map(u32::from_le_bytes)
}

fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)?.try_into().ok().map(u64::from_le_bytes)
}

fn write_u32_le(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn reopen(fs: &OleFileSystem) -> OleFileSystem {
    let bytes = fs.to_bytes().unwrap();
    OleFileSystem::from_bytes(bytes).unwrap()
}

/// File offset of FAT entry `sector` in a file with a single FAT sector
fn fat_entry_offset(data: &[u8], sector: usize) -> usize {
    let fat_sector = read_u32_le(data, 0x4C).unwrap() as usize;
    (fat_sector + 1) * 512 + sector * 4
}

#[test]
fn test_write_simple_ole_file() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("TestStream", b"Hello, World!").unwrap();

    let data = fs.to_bytes().unwrap();
    assert!(data.len() >= MINIMAL_OLEFILE_SIZE);
    assert_eq!(data.len() % 512, 0);
    assert_eq!(&data[0..8], MAGIC);

    let ole = OleFileSystem::open(Cursor::new(data)).unwrap();
    assert_eq!(ole.open_stream("TestStream").unwrap(), b"Hello, World!");
}

#[test]
fn test_write_mixed_sizes() {
    let mut fs = OleFileSystem::new();

    // Small streams (< 4096 bytes) go to the mini stream
    fs.create_stream("Tiny", b"tiny").unwrap();
    fs.create_stream("Small", &vec![0x11u8; 1000]).unwrap();
    fs.create_stream("Medium", &vec![0x22u8; 3000]).unwrap();

    // Large streams (>= 4096 bytes) use the FAT
    fs.create_stream("Large", &vec![0x33u8; 5000]).unwrap();
    fs.create_stream("Huge", &vec![0x44u8; 20000]).unwrap();

    let ole = reopen(&fs);
    assert_eq!(ole.open_stream("Tiny").unwrap(), b"tiny");
    assert_eq!(ole.open_stream("Small").unwrap(), vec![0x11u8; 1000]);
    assert_eq!(ole.open_stream("Medium").unwrap(), vec![0x22u8; 3000]);
    assert_eq!(ole.open_stream("Large").unwrap(), vec![0x33u8; 5000]);
    assert_eq!(ole.open_stream("Huge").unwrap(), vec![0x44u8; 20000]);
    ole.verify().unwrap();
}

#[test]
fn test_write_empty_stream() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("Empty", b"").unwrap();

    let ole = reopen(&fs);
    let entry = ole.entry("Empty").unwrap();
    assert_eq!(entry.size(), 0);
    assert_eq!(entry.as_stream().unwrap().start, ENDOFCHAIN);
    assert!(ole.open_stream("Empty").unwrap().is_empty());
}

#[test]
fn test_boundary_conditions() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("JustUnder", &vec![0xAAu8; 4095]).unwrap();
    fs.create_stream("Exactly", &vec![0xBBu8; 4096]).unwrap();
    fs.create_stream("JustOver", &vec![0xCCu8; 4097]).unwrap();

    let ole = reopen(&fs);
    assert_eq!(ole.open_stream("JustUnder").unwrap(), vec![0xAAu8; 4095]);
    assert_eq!(ole.open_stream("Exactly").unwrap(), vec![0xBBu8; 4096]);
    assert_eq!(ole.open_stream("JustOver").unwrap(), vec![0xCCu8; 4097]);

    assert_eq!(
        ole.stream_sectors("JustUnder").unwrap().0,
        StreamLocation::Mini
    );
    assert_eq!(
        ole.stream_sectors("Exactly").unwrap().0,
        StreamLocation::Main
    );
    assert_eq!(
        ole.stream_sectors("JustOver").unwrap().0,
        StreamLocation::Main
    );
}

#[test]
fn test_storage_with_large_zero_stream() {
    let mut fs = OleFileSystem::new();
    fs.create_storage("Root Entry/Data").unwrap();
    fs.create_stream("Root Entry/Data/Stream1", &[0u8; 10000])
        .unwrap();

    let data = fs.to_bytes().unwrap();
    // Stream1 is directory entry 2; its size field sits at byte 120
    let dir_sector = read_u32_le(&data, 0x30).unwrap() as usize;
    let record = (dir_sector + 1) * 512 + 2 * DIRENTRY_SIZE;
    assert_eq!(read_u64_le(&data, record + 120).unwrap(), 10000);

    let ole = OleFileSystem::from_bytes(data).unwrap();
    assert!(ole.is_storage("Data"));
    let (location, chain) = ole.stream_sectors("Data/Stream1").unwrap();
    assert_eq!(location, StreamLocation::Main);
    assert_eq!(chain.len(), 20);
    assert_eq!(ole.open_stream("Data/Stream1").unwrap(), vec![0u8; 10000]);
}

#[test]
fn test_write_sector_size_4096() {
    let mut fs = OleFileSystem::with_sector_size(SectorSize::Large);
    fs.create_stream("Test", b"Hello, 4096!").unwrap();
    fs.create_stream("Big", &vec![0x5Au8; 10000]).unwrap();

    let data = fs.to_bytes().unwrap();
    assert_eq!(data.len() % 4096, 0);
    // Sector shift at 0x1E, major version at 0x1A
    assert_eq!(read_u16_le(&data, 0x1E).unwrap(), 12);
    assert_eq!(read_u16_le(&data, 0x1A).unwrap(), 4);
    // Header filler up to the first sector is zero
    assert!(data[HEADER_SIZE..4096].iter().all(|&b| b == 0));

    let ole = OleFileSystem::from_bytes(data).unwrap();
    assert_eq!(ole.sector_size(), SectorSize::Large);
    assert_eq!(ole.header().num_dir_sectors, 1);
    assert_eq!(ole.open_stream("Test").unwrap(), b"Hello, 4096!");
    assert_eq!(ole.open_stream("Big").unwrap(), vec![0x5Au8; 10000]);
    assert_eq!(ole.stream_sectors("Big").unwrap().1.len(), 3);
}

#[test]
fn test_difat_with_many_fat_sectors() {
    // 7.2 MB needs 14063 sectors, beyond the 109 FAT sectors the header holds
    let payload: Vec<u8> = (0..7_200_000u32).map(|i| (i % 251) as u8).collect();
    let mut fs = OleFileSystem::new();
    fs.create_stream("Huge", &payload).unwrap();
    fs.create_stream("Small", b"after the big one").unwrap();

    let data = fs.to_bytes().unwrap();
    let ole = OleFileSystem::from_bytes(data).unwrap();
    assert!(ole.header().num_fat_sectors > HEADER_DIFAT_SLOTS as u32);
    assert_eq!(ole.header().num_difat_sectors, 1);
    assert_ne!(ole.header().first_difat_sector, ENDOFCHAIN);
    assert_eq!(ole.open_stream("Huge").unwrap(), payload);
    assert_eq!(ole.open_stream("Small").unwrap(), b"after the big one");
}

#[test]
fn test_rewrite_is_idempotent() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("A/B/C", &vec![1u8; 300]).unwrap();
    fs.create_stream("A/Big", &vec![2u8; 8000]).unwrap();
    fs.set_clsid("A", [0xABu8; 16]).unwrap();

    let first = fs.to_bytes().unwrap();
    let mut reopened = OleFileSystem::from_bytes(first.clone()).unwrap();
    assert_eq!(reopened.to_bytes().unwrap(), first);

    // Writing identical contents changes nothing either
    reopened.write_stream("A/B/C", &vec![1u8; 300]).unwrap();
    reopened.write_stream("A/Big", &vec![2u8; 8000]).unwrap();
    assert_eq!(reopened.to_bytes().unwrap(), first);
}

#[test]
fn test_metadata_survives_round_trip() {
    let mut fs = OleFileSystem::with_options(OleOptions::new().with_root_clsid([3u8; 16]));
    fs.create_storage("Folder").unwrap();
    fs.set_clsid("Folder", [4u8; 16]).unwrap();
    let created = fs.entry("Folder").unwrap().created();

    let ole = reopen(&fs);
    assert_eq!(ole.entry("").unwrap().clsid(), [3u8; 16]);
    assert_eq!(ole.entry("Folder").unwrap().clsid(), [4u8; 16]);
    assert_eq!(ole.entry("Folder").unwrap().created(), created);
}

#[test]
fn test_in_place_rewrite_after_reopen() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("Big", &vec![1u8; 6000]).unwrap();
    fs.create_stream("Small", &vec![2u8; 200]).unwrap();

    let mut ole = reopen(&fs);
    let big_before = ole.stream_sectors("Big").unwrap();
    let small_before = ole.stream_sectors("Small").unwrap();

    ole.write_stream("Big", &vec![9u8; 6000]).unwrap();
    ole.write_stream("Small", &vec![8u8; 250]).unwrap();
    assert_eq!(ole.stream_sectors("Big").unwrap(), big_before);
    assert_eq!(ole.stream_sectors("Small").unwrap(), small_before);
    assert_eq!(ole.open_stream("Big").unwrap(), vec![9u8; 6000]);
    assert_eq!(ole.open_stream("Small").unwrap(), vec![8u8; 250]);

    let again = reopen(&ole);
    assert_eq!(again.open_stream("Big").unwrap(), vec![9u8; 6000]);
    assert_eq!(again.open_stream("Small").unwrap(), vec![8u8; 250]);
}

#[test]
fn test_edit_reopened_file() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("Keep", &vec![1u8; 5000]).unwrap();
    fs.create_stream("Grow", b"short").unwrap();
    fs.create_stream("Drop/Inner", &vec![3u8; 7000]).unwrap();

    let mut ole = reopen(&fs);
    ole.write_stream("Grow", &vec![4u8; 12000]).unwrap();
    ole.remove("Drop").unwrap();
    ole.create_stream("New/Fresh", &vec![5u8; 100]).unwrap();
    ole.write_stream("Keep", &vec![6u8; 5100]).unwrap();

    let again = reopen(&ole);
    assert_eq!(again.list_streams(), vec!["New/Fresh", "Grow", "Keep"]);
    assert_eq!(again.open_stream("Grow").unwrap(), vec![4u8; 12000]);
    assert_eq!(again.open_stream("Keep").unwrap(), vec![6u8; 5100]);
    assert_eq!(again.open_stream("New/Fresh").unwrap(), vec![5u8; 100]);
    again.verify().unwrap();
}

#[test]
fn test_migration_across_cutoff_round_trip() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("Up", &vec![1u8; 1000]).unwrap();
    fs.create_stream("Down", &vec![2u8; 9000]).unwrap();

    let mut ole = reopen(&fs);
    ole.write_stream("Up", &vec![3u8; 9000]).unwrap();
    ole.write_stream("Down", &vec![4u8; 1000]).unwrap();

    let again = reopen(&ole);
    assert_eq!(again.stream_sectors("Up").unwrap().0, StreamLocation::Main);
    assert_eq!(
        again.stream_sectors("Down").unwrap().0,
        StreamLocation::Mini
    );
    assert_eq!(again.open_stream("Up").unwrap(), vec![3u8; 9000]);
    assert_eq!(again.open_stream("Down").unwrap(), vec![4u8; 1000]);
}

#[test]
fn test_delete_and_insert_keep_search_working() {
    let mut fs = OleFileSystem::new();
    for i in 0..30 {
        fs.create_stream(&format!("S{}", i), &[i as u8; 10]).unwrap();
    }
    for i in (0..30).step_by(3) {
        fs.remove(&format!("S{}", i)).unwrap();
    }
    let slots = fs.directory().len();
    for i in 0..10 {
        fs.create_stream(&format!("New{}", i), &[0xEE; 20]).unwrap();
    }
    // Freed slots are reused
    assert_eq!(fs.directory().len(), slots);

    for ole in [&fs, &reopen(&fs)] {
        for i in 0..30 {
            let path = format!("S{}", i);
            if i % 3 == 0 {
                assert!(!ole.exists(&path));
            } else {
                assert_eq!(ole.open_stream(&path).unwrap(), vec![i as u8; 10]);
            }
        }
        for i in 0..10 {
            assert!(ole.is_stream(&format!("new{}", i)));
        }
    }
}

#[test]
fn test_compact_directory_round_trip() {
    let mut fs = OleFileSystem::new();
    for i in 0..8 {
        fs.create_stream(&format!("Item{}", i), &[i as u8; 3]).unwrap();
    }
    fs.remove("Item2").unwrap();
    fs.remove("Item5").unwrap();
    fs.compact_directory();
    assert_eq!(fs.directory().len(), 7);

    let ole = reopen(&fs);
    assert_eq!(ole.list_streams().len(), 6);
    assert_eq!(ole.open_stream("Item7").unwrap(), vec![7u8; 3]);
}

#[test]
fn test_write_to_file() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("TestFile", b"File content").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("litchi_test_ole_file.ole");
    fs.save(&path).unwrap();

    let file = std::fs::File::open(&path).unwrap();
    let ole = OleFileSystem::open(file).unwrap();
    assert_eq!(ole.open_stream("TestFile").unwrap(), b"File content");
}

#[test]
fn test_rejects_zip_container() {
    let mut data = b"PK\x03\x04".to_vec();
    data.resize(2048, 0);
    let err = OleFileSystem::from_bytes(data).unwrap_err();
    assert!(matches!(err, OleError::OfficeXmlFile));
    assert!(err.is_wrong_container_family());
}

#[test]
fn test_rejects_truncated_files() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("Big", &vec![1u8; 20000]).unwrap();
    let data = fs.to_bytes().unwrap();

    let err = OleFileSystem::from_bytes(data[..100].to_vec()).unwrap_err();
    assert!(err.is_truncation());

    // Header intact, FAT sector cut off
    let err = OleFileSystem::from_bytes(data[..2048].to_vec()).unwrap_err();
    assert!(err.is_truncation());
}

/// A file whose large stream "Big" has a self-looping chain at sector 5
fn file_with_looping_stream() -> Vec<u8> {
    let mut fs = OleFileSystem::new();
    fs.create_stream("Big", &vec![1u8; 5000]).unwrap();
    fs.create_stream("Other", b"still readable").unwrap();
    let mut data = fs.to_bytes().unwrap();

    // Big is the only large stream, so it starts at sector 0
    let entry = fat_entry_offset(&data, 5);
    write_u32_le(&mut data, entry, 5);
    data
}

#[test]
fn test_looping_chain_fails_on_read() {
    let ole = OleFileSystem::from_bytes(file_with_looping_stream()).unwrap();
    let err = ole.open_stream("Big").unwrap_err();
    assert!(matches!(
        err,
        OleError::ChainCycle {
            table: TableKind::Fat,
            ..
        }
    ));
    assert_eq!(ole.open_stream("Other").unwrap(), b"still readable");
    assert!(ole.verify().unwrap_err().is_chain_integrity());
}

#[test]
fn test_remove_stream_with_looping_chain() {
    let mut ole = OleFileSystem::from_bytes(file_with_looping_stream()).unwrap();
    let err = ole.remove("Big").unwrap_err();
    assert!(err.is_chain_integrity());

    // The entry is gone regardless and the rest of the file still works
    assert!(!ole.exists("Big"));
    let ole = reopen(&ole);
    assert_eq!(ole.list_streams(), vec!["Other".to_string()]);
    assert_eq!(ole.open_stream("Other").unwrap(), b"still readable");
}

#[test]
fn test_verify_streams_on_open() {
    let options = OleOptions::new().with_verify_streams_on_open(true);
    let err = OleFileSystem::from_bytes_with_options(file_with_looping_stream(), options)
        .unwrap_err();
    assert!(err.is_chain_integrity());
}

#[test]
fn test_short_chain_is_length_mismatch() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("Big", &vec![1u8; 5000]).unwrap();
    let mut data = fs.to_bytes().unwrap();

    // End Big's chain after its third sector
    let entry = fat_entry_offset(&data, 2);
    write_u32_le(&mut data, entry, ENDOFCHAIN);

    let ole = OleFileSystem::from_bytes(data).unwrap();
    assert!(matches!(
        ole.open_stream("Big"),
        Err(OleError::ChainLengthMismatch {
            table: TableKind::Fat,
            declared: 5000,
            available: 1536,
        })
    ));
}

#[test]
fn test_mini_stream_shorter_than_minifat_chain() {
    let mut fs = OleFileSystem::new();
    fs.create_stream("a", &[0xAA; 64]).unwrap();
    fs.create_stream("b", &[0xBB; 320]).unwrap();
    let mut data = fs.to_bytes().unwrap();

    // Shrink the root entry's mini stream size to cover only "a"
    let dir_sector = read_u32_le(&data, 0x30).unwrap() as usize;
    let root_size = (dir_sector + 1) * 512 + 120;
    assert_eq!(read_u64_le(&data, root_size).unwrap(), 384);
    data[root_size..root_size + 8].copy_from_slice(&64u64.to_le_bytes());

    let ole = OleFileSystem::from_bytes(data).unwrap();
    assert_eq!(ole.open_stream("a").unwrap(), vec![0xAA; 64]);
    assert!(ole.open_stream("b").unwrap_err().is_truncation());
    assert!(ole.verify().is_err());
}

#[derive(Debug, Clone)]
enum Op {
    Storage { parent: usize },
    Stream { parent: usize, size: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let size = prop_oneof![
        Just(0usize),
        Just(4095usize),
        Just(4096usize),
        Just(4097usize),
        1usize..10_000,
    ];
    prop_oneof![
        (0usize..8).prop_map(|parent| Op::Storage { parent }),
        (0usize..8, size).prop_map(|(parent, size)| Op::Stream { parent, size }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_random_hierarchy_round_trip(
        ops in prop::collection::vec(op_strategy(), 1..24),
        large in any::<bool>(),
    ) {
        let sector_size = if large { SectorSize::Large } else { SectorSize::Small };
        let mut fs = OleFileSystem::with_sector_size(sector_size);
        let mut storages = vec![String::new()];
        let mut streams: BTreeMap<String, Vec<u8>> = BTreeMap::new();

        for (i, op) in ops.iter().enumerate() {
            let (parent, name) = match op {
                Op::Storage { parent } | Op::Stream { parent, .. } => {
                    (storages[parent % storages.len()].clone(), format!("Entry{}", i))
                },
            };
            let path = if parent.is_empty() { name } else { format!("{}/{}", parent, name) };
            match op {
                Op::Storage { .. } => {
                    fs.create_storage(&path).unwrap();
                    storages.push(path);
                },
                Op::Stream { size, .. } => {
                    let data: Vec<u8> = (0..*size).map(|j| (i * 31 + j) as u8).collect();
                    fs.create_stream(&path, &data).unwrap();
                    streams.insert(path, data);
                },
            }
        }

        let bytes = fs.to_bytes().unwrap();
        prop_assert_eq!(bytes.len() % sector_size.bytes(), 0);
        let ole = OleFileSystem::from_bytes(bytes).unwrap();
        ole.verify().unwrap();

        let mut listed = ole.list_streams();
        listed.sort();
        let expected: Vec<String> = streams.keys().cloned().collect();
        prop_assert_eq!(listed, expected);
        for (path, data) in &streams {
            prop_assert_eq!(&ole.open_stream(path).unwrap(), data);
        }
        for storage in storages.iter().skip(1) {
            prop_assert!(ole.is_storage(storage));
        }
    }
}
