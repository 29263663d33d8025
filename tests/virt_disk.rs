#![allow(unused)]

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::container_path;
use fatbox::*;

const CAPACITY: u64 = 2 * 1024 * 1024;

/// Removes the container file when the test ends, even on failure.
struct Container(PathBuf);

impl Container {
    fn new(name: &str) -> Self {
        let path = container_path(name);
        let _ = fs::remove_file(&path);
        Container(path)
    }

    fn path(&self) -> &Path {
        &self.0
    }

    fn size(&self) -> u64 {
        fs::metadata(&self.0).unwrap().len()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn sample(i: usize) -> Vec<u8> {
    let len = 300 + i * 517;
    format!("sample {i} ").bytes().cycle().take(len).collect()
}

#[test]
fn disk_index_txt() {
    let container = Container::new("index");

    let mut fs = FileSystem::create(container.path(), CAPACITY).unwrap();
    fs.create_file("index.txt").unwrap();
    fs.append_to_file("index.txt", b"asdf").unwrap();
    assert_eq!(fs.read_file("index.txt").unwrap(), Some(b"asdf".to_vec()));
    fs.close().unwrap();

    let mut fs = FileSystem::open(container.path()).unwrap();
    log!("File System mounted: {}", fs.dump());
    assert_eq!(fs.superblock().capacity, CAPACITY);
    assert_eq!(fs.read_file("index.txt").unwrap(), Some(b"asdf".to_vec()));
    fs.close().unwrap();
}

#[test]
fn disk_compact_and_reopen() {
    let container = Container::new("compact");
    let names: Vec<String> = (0..24).map(|i| format!("/src/file_{i:02}.rs")).collect();

    let mut fs = FileSystem::create(container.path(), CAPACITY).unwrap();
    for (i, name) in names.iter().enumerate() {
        fs.create_file(name).unwrap();
        fs.append_to_file(name, &sample(i)).unwrap();
    }

    // Drop the first two thirds, leaving the survivors at the far end.
    let stored = fs.list_files().unwrap();
    let doomed = &stored[..stored.len() - stored.len() / 3];
    for name in doomed {
        fs.delete_file(name).unwrap();
    }

    let size_before = container.size();
    fs.compact().unwrap();
    let size_after = container.size();
    log!("compacted container: {} -> {} bytes", size_before, size_after);
    assert!(size_after < size_before);

    for (i, name) in names.iter().enumerate() {
        fs.create_file(&format!("subfolder{name}")).unwrap();
        fs.append_to_file(&format!("subfolder{name}"), &sample(i)).unwrap();
    }
    fs.close().unwrap();

    let mut fs = FileSystem::open(container.path()).unwrap();
    let survivors: Vec<String> = fs
        .list_files()
        .unwrap()
        .into_iter()
        .filter(|name| !name.starts_with("subfolder"))
        .collect();
    assert_eq!(survivors.len(), names.len() / 3);
    for name in &survivors {
        let i = names.iter().position(|n| n == name).unwrap();
        assert_eq!(fs.read_file(name).unwrap(), Some(sample(i)));
    }

    let copies = fs.list_files_under_prefix("subfolder/").unwrap();
    assert_eq!(copies.len(), names.len());
    for name in &copies {
        let original = name.strip_prefix("subfolder").unwrap();
        let i = names.iter().position(|n| n == original).unwrap();
        assert_eq!(fs.read_file(name).unwrap(), Some(sample(i)));
    }
    fs.close().unwrap();
}

#[test]
fn disk_overwrite_persists() {
    let container = Container::new("overwrite");

    let mut fs = FileSystem::create(container.path(), CAPACITY).unwrap();
    fs.create_file("data.bin").unwrap();
    fs.append_to_file("data.bin", &[0u8; 4096]).unwrap();
    fs.write_to_file_from_offset("data.bin", b"HEADER", 0).unwrap();
    fs.write_to_file_from_offset("data.bin", b"MIDDLE", 2046).unwrap();
    fs.close().unwrap();

    let mut fs = FileSystem::open(container.path()).unwrap();
    let data = fs.read_file("data.bin").unwrap().unwrap();
    assert_eq!(data.len(), 4096);
    assert_eq!(&data[..6], b"HEADER");
    assert_eq!(&data[2046..2052], b"MIDDLE");
    assert!(data[6..2046].iter().all(|&b| b == 0));
}

#[test]
fn disk_two_handles_take_turns() {
    let container = Container::new("handles");
    FileSystem::create(container.path(), CAPACITY).unwrap().close().unwrap();

    let device = FileDevice::open(container.path()).unwrap();
    let other = FileDevice::open(container.path()).unwrap();
    let order = device
        .execute_under_lock(|| {
            device.write_at(0, &SuperBlock::new(CAPACITY)?.to_bytes())?;
            Ok(1)
        })
        .unwrap();
    // The first lock was released, so a second handle can take it.
    let next = other.execute_under_lock(|| Ok(order + 1)).unwrap();
    assert_eq!(next, 2);
}

#[test]
fn disk_open_missing_container() {
    let container = Container::new("missing");
    assert!(matches!(FileSystem::open(container.path()), Err(Error::Io(_))));
}
