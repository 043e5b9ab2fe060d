
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use clock_fs::{SECTOR_SIZE, SectorAllocator};
use sector_dev::{DeviceError, SectorDevice};

/// A disk image file exposed as a sector device.
pub struct BlockFile(pub Mutex<File>);

impl SectorDevice for BlockFile {
    fn read_sector(&self, sector: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(sector as u64 * SECTOR_SIZE as u64))
            .map_err(|_| DeviceError { sector })?;
        file.read_exact(buf).map_err(|_| DeviceError { sector })
    }

    fn write_sector(&self, sector: u32, buf: &[u8]) -> Result<(), DeviceError> {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(sector as u64 * SECTOR_SIZE as u64))
            .map_err(|_| DeviceError { sector })?;
        file.write_all(buf).map_err(|_| DeviceError { sector })
    }
}

/// First-fit bitmap allocator over the image's sector range.
/// Sector 0 stays out of reach so it can keep meaning "unallocated".
pub struct RangeAllocator {
    free: Mutex<Vec<bool>>,
    first: u32,
}

impl RangeAllocator {
    pub fn new(first: u32, count: usize) -> Self {
        assert!(first > 0);
        Self {
            free: Mutex::new(vec![true; count]),
            first,
        }
    }

    pub fn free_sectors(&self) -> usize {
        self.free.lock().unwrap().iter().filter(|&&free| free).count()
    }
}

impl SectorAllocator for RangeAllocator {
    fn allocate(&self, count: u32) -> Option<u32> {
        let count = count as usize;
        let mut free = self.free.lock().unwrap();

        let mut run = 0;
        for i in 0..free.len() {
            run = if free[i] { run + 1 } else { 0 };
            if run == count {
                let start = i + 1 - count;
                free[start..=i].fill(false);
                return Some(self.first + start as u32);
            }
        }
        None
    }

    fn release(&self, sector: u32, count: u32) {
        let mut free = self.free.lock().unwrap();
        let start = (sector - self.first) as usize;
        for flag in &mut free[start..start + count as usize] {
            assert!(!*flag, "sector released twice");
            *flag = true;
        }
    }
}
