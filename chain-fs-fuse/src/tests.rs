use std::sync::{Arc, Mutex, MutexGuard};

use block_dev::BlockDevice;
use chain_fs::{
    Error, FileHeader, FileSystem, FreeMap, OpenFile, CHAIN_SLOTS, DIR_ENTRY_COUNT,
    FREE_MAP_SECTOR, NUM_SECTORS, SECTOR_SIZE,
};

use crate::{BlockFile, MemDisk};

/// Sectors a freshly formatted disk has in use: the two well-known
/// header sectors, the free-map file (1 data + 1 chain node) and the
/// root directory file (4 data + 1 chain node).
const FORMAT_USED: usize = 2 + 2 + 5;

/// The sector cache is a process-wide singleton keyed by sector id, so
/// tests take turns and each starts from a flushed cache.
fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    let guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    chain_fs::flush();
    guard
}

fn mem_disk() -> Arc<dyn BlockDevice> {
    Arc::new(MemDisk::new())
}

fn free_count(device: &Arc<dyn BlockDevice>) -> usize {
    let file = OpenFile::open(FREE_MAP_SECTOR, device.clone()).unwrap();
    FreeMap::fetch_from(&file).unwrap().num_clear()
}

/// Total sectors a file of `bytes` costs: header, data, chain nodes.
fn file_cost(bytes: usize) -> usize {
    let data = bytes.div_ceil(SECTOR_SIZE);
    1 + data + data.div_ceil(CHAIN_SLOTS)
}

#[test]
fn header_round_trip() {
    let _serial = serial();
    let device = mem_disk();

    let mut free_map = FreeMap::new(NUM_SECTORS);
    let header = FileHeader::allocate(&mut free_map, 3000).unwrap();
    header.write_back(42, &device);

    let fetched = FileHeader::fetch_from(42, &device).unwrap();
    assert_eq!(fetched.len(), header.len());
    assert_eq!(fetched.sectors(), header.sectors());
    for index in 0..header.sectors() as usize {
        let offset = index * SECTOR_SIZE;
        assert_eq!(
            fetched.sector_of(offset).unwrap(),
            header.sector_of(offset).unwrap()
        );
    }
}

#[test]
fn bitmap_conservation() {
    let _serial = serial();

    let mut free_map = FreeMap::new(NUM_SECTORS);
    let before = free_map.num_clear();

    // 5000 bytes: 10 data sectors plus 1 chain node
    let mut header = FileHeader::allocate(&mut free_map, 5000).unwrap();
    assert_eq!(free_map.num_clear(), before - 11);

    header.deallocate(&mut free_map).unwrap();
    assert_eq!(free_map.num_clear(), before);
}

#[test]
fn offset_mapping() {
    let _serial = serial();

    let mut free_map = FreeMap::new(NUM_SECTORS);
    let header = FileHeader::allocate(&mut free_map, 2049).unwrap();
    assert_eq!(header.sectors(), 5);

    for offset in [0, 1, 511, 512, 1024, 2048] {
        let expected = header.chain().sector_at(offset / SECTOR_SIZE).unwrap();
        assert_eq!(header.sector_of(offset).unwrap(), expected);
    }

    // past the end is an error, never a stale sector
    assert_eq!(header.sector_of(2049), Err(Error::Corrupted));
    assert_eq!(header.sector_of(5 * SECTOR_SIZE), Err(Error::Corrupted));
    assert_eq!(header.chain().sector_at(5), Err(Error::Corrupted));
}

#[test]
fn chain_spills_into_second_node() {
    let _serial = serial();
    let device = mem_disk();

    let mut free_map = FreeMap::new(NUM_SECTORS);
    let before = free_map.num_clear();

    let sectors = CHAIN_SLOTS + 3;
    let header = FileHeader::allocate(&mut free_map, (sectors * SECTOR_SIZE) as u32).unwrap();
    assert_eq!(header.chain().node_count(), 2);
    assert_eq!(header.chain().len(), sectors);
    assert_eq!(free_map.num_clear(), before - sectors - 2);

    header.write_back(7, &device);
    let fetched = FileHeader::fetch_from(7, &device).unwrap();
    assert_eq!(fetched.chain().node_count(), 2);
    for index in 0..sectors {
        assert_eq!(
            fetched.chain().sector_at(index).unwrap(),
            header.chain().sector_at(index).unwrap()
        );
    }
}

#[test]
fn format_accounting() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device.clone()).unwrap();
    let fs = fs.lock();

    assert!(fs.list().unwrap().is_empty());
    assert_eq!(free_count(&device), NUM_SECTORS - FORMAT_USED);
}

#[test]
fn create_write_read() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device).unwrap();
    let mut fs = fs.lock();

    let payload = b"hello, sector";
    fs.create("/greeting", payload.len() as u32).unwrap();

    let mut file = fs.open("/greeting").unwrap();
    assert_eq!(file.len() as usize, payload.len());
    assert_eq!(file.write_at(0, payload).unwrap(), payload.len());

    let mut read_back = vec![0u8; payload.len()];
    assert_eq!(file.read_at(0, &mut read_back).unwrap(), payload.len());
    assert_eq!(&read_back, payload);

    // no growth: writes and reads clamp at the allocated length
    assert_eq!(file.write_at(8, &[0xaa; 10]).unwrap(), 5);
    assert_eq!(file.read_at(payload.len(), &mut read_back).unwrap(), 0);

    // the cursor-style interface covers the same bytes
    let mut cursor_buf = [0u8; 5];
    file.seek(7);
    assert_eq!(file.read(&mut cursor_buf).unwrap(), 5);
    assert_eq!(&cursor_buf, b"s\xaa\xaa\xaa\xaa");
}

#[test]
fn create_builds_missing_directories() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device.clone()).unwrap();
    let mut fs = fs.lock();

    fs.create("/a/b/c.txt", 1000).unwrap();
    assert!(fs.open("/a/b/c.txt").is_ok());
    assert_eq!(fs.list().unwrap(), ["a"]);

    let rows = fs.list_recursively().unwrap();
    let summary: Vec<_> = rows
        .iter()
        .map(|row| (row.name.as_str(), row.depth, row.is_dir))
        .collect();
    assert_eq!(
        summary,
        [("a", 0, true), ("b", 1, true), ("c.txt", 2, false)]
    );
    assert!(rows.iter().all(|row| row.allocated));

    // a second create under the same directories must not rebuild them
    let before = free_count(&device);
    fs.create("/a/b/d.txt", 100).unwrap();
    assert_eq!(free_count(&device), before - file_cost(100));
}

#[test]
fn conflict_and_absence() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device).unwrap();
    let mut fs = fs.lock();

    fs.create("/dup", 10).unwrap();
    assert_eq!(fs.create("/dup", 10), Err(Error::AlreadyExists));
    assert_eq!(fs.create("/x/y/dup", 10).and(fs.create("/x/y/dup", 10)), Err(Error::AlreadyExists));

    assert!(matches!(fs.open("/missing"), Err(Error::NotFound)));
    assert_eq!(fs.remove("/missing"), Err(Error::NotFound));
    // missing intermediate directories are not created outside `create`
    assert!(matches!(fs.open("/nodir/x"), Err(Error::NotFound)));
}

#[test]
fn exhaustion_leaves_no_trace() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device.clone()).unwrap();
    let mut fs = fs.lock();

    let before = free_count(&device);
    let too_big = (NUM_SECTORS * SECTOR_SIZE) as u32;
    assert_eq!(fs.create("/huge", too_big), Err(Error::NoSpace));

    assert_eq!(free_count(&device), before);
    assert!(fs.list().unwrap().is_empty());

    // the disk is still healthy for reasonable requests
    fs.create("/small", 100).unwrap();
}

#[test]
fn remove_releases_sectors() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device.clone()).unwrap();
    let mut fs = fs.lock();

    let baseline = free_count(&device);
    fs.create("/a/b/f.bin", 4096).unwrap();

    let after_create = free_count(&device);
    fs.remove("/a/b/f.bin").unwrap();
    assert_eq!(free_count(&device), after_create + file_cost(4096));
    assert!(matches!(fs.open("/a/b/f.bin"), Err(Error::NotFound)));

    // non-empty directories refuse removal
    assert_eq!(fs.remove("/a"), Err(Error::DirectoryNotEmpty));
    fs.remove("/a/b").unwrap();
    fs.remove("/a").unwrap();
    assert_eq!(free_count(&device), baseline);
}

#[test]
fn malformed_paths() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device).unwrap();
    let mut fs = fs.lock();

    assert_eq!(fs.create("relative", 1), Err(Error::InvalidPath));
    assert_eq!(fs.create("/", 1), Err(Error::InvalidPath));
    assert_eq!(fs.create("/dir/", 1), Err(Error::InvalidPath));

    let long_name = format!("/{}", "n".repeat(26));
    assert_eq!(fs.create(&long_name, 1), Err(Error::InvalidPath));

    // a plain file cannot serve as a path component
    fs.create("/f", 10).unwrap();
    assert!(matches!(fs.open("/f/x"), Err(Error::InvalidPath)));
}

#[test]
fn directory_capacity_is_fixed() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device.clone()).unwrap();
    let mut fs = fs.lock();

    for index in 0..DIR_ENTRY_COUNT {
        fs.create(&format!("/f{index}"), 1).unwrap();
    }

    let before = free_count(&device);
    assert_eq!(fs.create("/one-too-many", 1), Err(Error::DirectoryFull));
    assert_eq!(free_count(&device), before);
    assert_eq!(fs.list().unwrap().len(), DIR_ENTRY_COUNT);
}

#[test]
fn zero_length_file() {
    let _serial = serial();
    let device = mem_disk();

    let fs = FileSystem::format(device.clone()).unwrap();
    let mut fs = fs.lock();

    let before = free_count(&device);
    fs.create("/empty", 0).unwrap();
    // only the header sector; an empty chain owns nothing
    assert_eq!(free_count(&device), before - 1);

    let file = fs.open("/empty").unwrap();
    assert!(file.is_empty());
    let mut buf = [0u8; 8];
    assert_eq!(file.read_at(0, &mut buf).unwrap(), 0);

    fs.remove("/empty").unwrap();
    assert_eq!(free_count(&device), before);
}

#[test]
fn image_survives_remount() {
    let _serial = serial();

    let image = std::env::temp_dir().join(format!("chain-fs-remount-{}.img", std::process::id()));
    let payload: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();

    {
        let fd = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&image)
            .unwrap();
        fd.set_len((NUM_SECTORS * SECTOR_SIZE) as u64).unwrap();
        let device: Arc<dyn BlockDevice> = Arc::new(BlockFile(Mutex::new(fd)));

        let fs = FileSystem::format(device).unwrap();
        let mut fs = fs.lock();
        fs.create("/persist/data.bin", payload.len() as u32).unwrap();
        let mut file = fs.open("/persist/data.bin").unwrap();
        assert_eq!(file.write_at(0, &payload).unwrap(), payload.len());
    }
    // push every dirty sector out before the handles go away
    chain_fs::flush();

    {
        let fd = std::fs::File::options().read(true).write(true).open(&image).unwrap();
        let device: Arc<dyn BlockDevice> = Arc::new(BlockFile(Mutex::new(fd)));

        let fs = FileSystem::mount(device).unwrap();
        let mut fs = fs.lock();
        let file = fs.open("/persist/data.bin").unwrap();

        let mut read_back = vec![0u8; payload.len()];
        assert_eq!(file.read_at(0, &mut read_back).unwrap(), payload.len());
        assert_eq!(read_back, payload);
    }
    chain_fs::flush();

    std::fs::remove_file(&image).unwrap();
}

#[test]
fn mount_rejects_blank_image() {
    let _serial = serial();
    let device = mem_disk();

    assert!(FileSystem::mount(device).is_err());
}
