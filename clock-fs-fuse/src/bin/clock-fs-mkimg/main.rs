mod cli;

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use clap::Parser;
use clock_fs::{ClockFileSystem, InodeKind, SECTOR_SIZE, SectorAllocator};
use clock_fs_fuse::{BlockFile, RangeAllocator};

use cli::Cli;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let sectors = (cli.size.0 as usize).div_ceil(SECTOR_SIZE);
    println!("image={:?} sectors={sectors}", cli.image);

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&cli.image)?;
    fd.set_len((sectors * SECTOR_SIZE) as u64)?;

    let alloc = Arc::new(RangeAllocator::new(1, sectors - 1));
    let fs = ClockFileSystem::new(Arc::new(BlockFile(Mutex::new(fd))), alloc.clone());

    for path in &cli.files {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        let sector = alloc.allocate(1).expect("image is full");
        fs.create(sector, 0, InodeKind::File).expect("creating inode");
        let inode = fs.open(sector).expect("opening fresh inode");
        assert_eq!(data.len(), inode.write_at(0, &data).expect("storing file"));

        // Read back through the cache to double-check the extents
        let mut back = vec![0; data.len()];
        assert_eq!(data.len(), inode.read_at(0, &mut back).expect("reading back"));
        assert_eq!(data, back, "image round-trip mismatch");

        fs.close(&inode).expect("closing inode");
        log::info!("stored {path:?}");
        println!("{} sector={sector} length={}", path.display(), data.len());
    }

    fs.sync_all().expect("flushing the cache");
    println!("free sectors: {}", alloc.free_sectors());

    Ok(())
}
