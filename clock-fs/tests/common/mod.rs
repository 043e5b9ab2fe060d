#![allow(dead_code)]

use std::sync::Mutex;

use clock_fs::{DeviceError, SECTOR_SIZE, SectorAllocator, SectorDevice};

/// RAM-backed sector device.
pub struct MemDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
}

impl MemDisk {
    pub fn new(count: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0; SECTOR_SIZE]; count]),
        }
    }

    /// Device-side bytes, bypassing any cache above.
    pub fn raw(&self, sector: u32) -> [u8; SECTOR_SIZE] {
        self.sectors.lock().unwrap()[sector as usize]
    }
}

impl SectorDevice for MemDisk {
    fn read_sector(&self, sector: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        let sectors = self.sectors.lock().unwrap();
        let data = sectors.get(sector as usize).ok_or(DeviceError { sector })?;
        buf.copy_from_slice(data);
        Ok(())
    }

    fn write_sector(&self, sector: u32, buf: &[u8]) -> Result<(), DeviceError> {
        let mut sectors = self.sectors.lock().unwrap();
        let data = sectors
            .get_mut(sector as usize)
            .ok_or(DeviceError { sector })?;
        data.copy_from_slice(buf);
        Ok(())
    }
}

/// Fails every transfer touching one chosen sector.
pub struct FaultyDisk {
    inner: MemDisk,
    bad: u32,
}

impl FaultyDisk {
    pub fn new(count: usize, bad: u32) -> Self {
        Self {
            inner: MemDisk::new(count),
            bad,
        }
    }
}

impl SectorDevice for FaultyDisk {
    fn read_sector(&self, sector: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        if sector == self.bad {
            return Err(DeviceError { sector });
        }
        self.inner.read_sector(sector, buf)
    }

    fn write_sector(&self, sector: u32, buf: &[u8]) -> Result<(), DeviceError> {
        if sector == self.bad {
            return Err(DeviceError { sector });
        }
        self.inner.write_sector(sector, buf)
    }
}

/// First-fit bitmap allocator over sectors `[first, first + count)`;
/// sector 0 must stay outside the range so it can mean "unallocated".
pub struct BitmapAllocator {
    free: Mutex<Vec<bool>>,
    first: u32,
}

impl BitmapAllocator {
    pub fn new(first: u32, count: usize) -> Self {
        assert!(first > 0);
        Self {
            free: Mutex::new(vec![true; count]),
            first,
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap().iter().filter(|&&free| free).count()
    }
}

impl SectorAllocator for BitmapAllocator {
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

/// One recognizable sector's worth of bytes.
pub fn pattern(seed: u32) -> [u8; SECTOR_SIZE] {
    std::array::from_fn(|i| (seed as usize + i) as u8)
}
