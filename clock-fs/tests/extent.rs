mod common;

use std::sync::Arc;

use clock_fs::{ClockFileSystem, Error, InodeKind, MAX_LENGTH, SECTOR_SIZE, SectorAllocator};
use common::{BitmapAllocator, MemDisk};

const S: usize = SECTOR_SIZE;
/// 直接槽数
const D: usize = 98;
/// 一个指针扇区可容纳的扇区ID数
const P: usize = S / 4;

fn setup(sectors: usize) -> (Arc<MemDisk>, Arc<BitmapAllocator>, ClockFileSystem) {
    let disk = Arc::new(MemDisk::new(sectors));
    let alloc = Arc::new(BitmapAllocator::new(1, sectors - 1));
    let fs = ClockFileSystem::new(disk.clone(), alloc.clone());
    (disk, alloc, fs)
}

fn bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// 数据扇区与各级指针扇区的总数
fn total_sectors(len: usize) -> usize {
    let data = len.div_ceil(S);
    let mut total = data;
    if data > D {
        total += 1;
    }
    if data > D + P {
        total += 1 + (data - D - P).div_ceil(P);
    }
    total
}

#[test]
fn mapping_across_index_levels() {
    const CASES: &[usize] = &[
        1,
        S,
        D * S,
        D * S + 1,
        (D + P) * S,
        (D + P) * S + 1,
        (D + P + 1) * S,
    ];

    for &len in CASES {
        let (_, alloc, fs) = setup(512);
        let sector = alloc.allocate(1).unwrap();
        let free_before = alloc.free_count();

        fs.create(sector, len, InodeKind::File).unwrap();
        assert_eq!(total_sectors(len), free_before - alloc.free_count());

        let inode = fs.open(sector).unwrap();
        assert_eq!(len, inode.length());

        let data = bytes(len);
        assert_eq!(len, inode.write_at(0, &data).unwrap());

        let mut back = vec![0xff; len];
        assert_eq!(len, inode.read_at(0, &mut back).unwrap());
        assert_eq!(data, back);

        // 文件尾之后无扇区可言
        assert_eq!(0, inode.read_at(len, &mut [0; 16]).unwrap());
        assert_eq!(1, inode.read_at(len - 1, &mut [0; 16]).unwrap());

        fs.close(&inode).unwrap();
    }
}

#[test]
fn extension_is_idempotent_on_the_allocated_prefix() {
    let (_, alloc, fs) = setup(256);
    let sector = alloc.allocate(1).unwrap();

    fs.create(sector, 2 * S, InodeKind::File).unwrap();
    let inode = fs.open(sector).unwrap();
    let free_before = alloc.free_count();

    // 不越长度的写不触碰分配器
    assert_eq!(2 * S, inode.write_at(0, &bytes(2 * S)).unwrap());
    assert_eq!(free_before, alloc.free_count());
    assert_eq!(S, inode.write_at(0, &bytes(S)).unwrap());
    assert_eq!(free_before, alloc.free_count());

    // 扩到5个扇区只该新增3个
    assert_eq!(5 * S, inode.write_at(0, &bytes(5 * S)).unwrap());
    assert_eq!(free_before - 3, alloc.free_count());

    fs.close(&inode).unwrap();
}

#[test]
fn growth_preserves_existing_content() {
    let (_, alloc, fs) = setup(512);
    let sector = alloc.allocate(1).unwrap();

    fs.create(sector, 0, InodeKind::File).unwrap();
    let inode = fs.open(sector).unwrap();

    // 三段式增长，先后跨过直接槽与一级索引的边界
    let data = bytes((D + P + 2) * S);
    let cuts = [0, 10 * S, (D + 1) * S, data.len()];
    for window in cuts.windows(2) {
        let (from, to) = (window[0], window[1]);
        assert_eq!(to - from, inode.write_at(from, &data[from..to]).unwrap());
    }
    assert_eq!(data.len(), inode.length());

    let mut back = vec![0; data.len()];
    assert_eq!(data.len(), inode.read_at(0, &mut back).unwrap());
    assert_eq!(data, back);

    fs.close(&inode).unwrap();
}

#[test]
fn never_written_regions_read_back_as_zero() {
    let (_, alloc, fs) = setup(256);
    let sector = alloc.allocate(1).unwrap();

    fs.create(sector, 3 * S + 5, InodeKind::File).unwrap();
    let inode = fs.open(sector).unwrap();

    assert_eq!(3, inode.write_at(2 * S, b"xyz").unwrap());

    let mut back = vec![0xff; 3 * S + 5];
    assert_eq!(back.len(), inode.read_at(0, &mut back).unwrap());

    let mut expected = vec![0; 3 * S + 5];
    expected[2 * S..2 * S + 3].copy_from_slice(b"xyz");
    assert_eq!(expected, back);

    fs.close(&inode).unwrap();
}

#[test]
fn exhausted_creation_releases_everything_it_took() {
    let (disk, alloc, fs) = setup(64);
    let sector = alloc.allocate(1).unwrap();
    let free_before = alloc.free_count();

    assert_eq!(
        Err(Error::AllocationExhausted),
        fs.create(sector, 63 * S, InodeKind::File)
    );
    // 一个扇区都不许漏掉，头部也不许留下
    assert_eq!(free_before, alloc.free_count());
    assert_eq!([0; S], disk.raw(sector));

    // 分配器完好如初，小文件照建不误
    fs.create(sector, 10 * S, InodeKind::File).unwrap();
    assert_eq!(free_before - 10, alloc.free_count());
}

#[test]
fn exhausted_growth_leaves_the_inode_untouched() {
    let (_, alloc, fs) = setup(64);
    let sector = alloc.allocate(1).unwrap();

    fs.create(sector, S, InodeKind::File).unwrap();
    let inode = fs.open(sector).unwrap();
    assert_eq!(S, inode.write_at(0, &bytes(S)).unwrap());
    let free_before = alloc.free_count();

    assert_eq!(
        Err(Error::AllocationExhausted),
        inode.write_at(0, &vec![7; 63 * S])
    );
    assert_eq!(S, inode.length());
    assert_eq!(free_before, alloc.free_count());

    // 原有内容毫发无损，后续的写也不受牵连
    let mut back = vec![0; S];
    assert_eq!(S, inode.read_at(0, &mut back).unwrap());
    assert_eq!(bytes(S), back);
    assert_eq!(2 * S, inode.write_at(0, &bytes(2 * S)).unwrap());

    fs.close(&inode).unwrap();
}

#[test]
fn growth_beyond_the_format_limit_is_refused() {
    let (_, alloc, fs) = setup(64);
    let sector = alloc.allocate(1).unwrap();

    fs.create(sector, 0, InodeKind::File).unwrap();
    let inode = fs.open(sector).unwrap();

    assert_eq!(
        Err(Error::AllocationExhausted),
        inode.write_at(MAX_LENGTH, b"x")
    );
    assert_eq!(0, inode.length());

    fs.close(&inode).unwrap();
}
