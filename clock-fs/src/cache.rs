//! # 扇区缓存层
//!
//! 在内存中维护一组定容的扇区缓冲槽，对设备的读写都经过这里。
//! 槽位用尽时按**时钟(二次机会)算法**挑选牺牲者：
//! 指针扫到最近用过的槽位时先摘掉标记、饶它一圈，
//! 扫到的第一个没有标记的槽位被回收，脏数据先写回设备。
//! 每扫过一个槽位都会摘掉它的标记，至多两整圈必有斩获。
//!
//! 时钟指针是缓存实例自己的字段，多个实例互不干扰。
//! 整个缓存由一把锁串行化，查找、换出与数据搬运一体完成，
//! 单个扇区至多占据一个有效槽位。

use alloc::boxed::Box;
use alloc::sync::Arc;

use sector_dev::{DeviceError, SectorDevice};
use spin::Mutex;

use crate::{DataSector, SECTOR_SIZE};

/// 定容扇区缓存
pub struct SectorCache {
    dev: Arc<dyn SectorDevice>,
    state: Mutex<CacheState>,
}

struct CacheState {
    slots: Box<[Slot]>,
    /// 时钟指针，跨调用持续推进
    cursor: usize,
}

/// 缓存槽
struct Slot {
    data: DataSector,
    /// 槽内数据对应的扇区，仅当 `valid` 时有意义
    sector: u32,
    valid: bool,
    /// 槽内数据与设备上的内容不一致
    dirty: bool,
    /// 二次机会标记
    recently_used: bool,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            data: [0; SECTOR_SIZE],
            sector: 0,
            valid: false,
            dirty: false,
            recently_used: false,
        }
    }
}

impl SectorCache {
    pub fn new(dev: Arc<dyn SectorDevice>, capacity: usize) -> Self {
        assert!(capacity > 0);
        let slots = (0..capacity).map(|_| Slot::empty()).collect();

        Self {
            dev,
            state: Mutex::new(CacheState { slots, cursor: 0 }),
        }
    }

    /// 读出整个扇区到 `buf`，未命中时从设备补上
    pub fn read(&self, sector: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        assert_eq!(buf.len(), SECTOR_SIZE);
        let mut state = self.state.lock();

        let index = match state.lookup(sector) {
            Some(index) => index,
            None => {
                let index = state.evict(&*self.dev)?;
                let slot = &mut state.slots[index];
                // 读成功之前槽位保持无效
                self.dev.read_sector(sector, &mut slot.data)?;
                slot.sector = sector;
                slot.valid = true;
                slot.dirty = false;
                index
            }
        };

        let slot = &mut state.slots[index];
        slot.recently_used = true;
        buf.copy_from_slice(&slot.data);
        Ok(())
    }

    /// 把整个扇区写入缓存。
    /// 未命中时直接占槽，不读设备上的旧内容，
    /// 调用者必须给出完整的扇区数据。
    pub fn write(&self, sector: u32, buf: &[u8]) -> Result<(), DeviceError> {
        assert_eq!(buf.len(), SECTOR_SIZE);
        let mut state = self.state.lock();

        let index = match state.lookup(sector) {
            Some(index) => index,
            None => {
                let index = state.evict(&*self.dev)?;
                let slot = &mut state.slots[index];
                slot.sector = sector;
                slot.valid = true;
                index
            }
        };

        let slot = &mut state.slots[index];
        slot.dirty = true;
        slot.recently_used = true;
        slot.data.copy_from_slice(buf);
        Ok(())
    }

    /// 把所有脏槽写回设备；槽位保持有效(进程收尾用)
    pub fn sync_all(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();

        for slot in state.slots.iter_mut() {
            if slot.valid && slot.dirty {
                self.dev.write_sector(slot.sector, &slot.data)?;
                slot.dirty = false;
            }
        }
        Ok(())
    }
}

impl Drop for SectorCache {
    fn drop(&mut self) {
        let _ = self.sync_all();
    }
}

impl CacheState {
    fn lookup(&self, sector: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.valid && slot.sector == sector)
    }

    /// 时钟算法：腾出一个无效槽位并返回其下标，脏牺牲者先写回
    fn evict(&mut self, dev: &dyn SectorDevice) -> Result<usize, DeviceError> {
        loop {
            let index = self.cursor;
            let slot = &mut self.slots[index];

            if !slot.valid {
                return Ok(index);
            }

            if slot.recently_used {
                slot.recently_used = false;
            } else {
                if slot.dirty {
                    log::trace!("evicting dirty sector {}", slot.sector);
                    dev.write_sector(slot.sector, &slot.data)?;
                    slot.dirty = false;
                }
                slot.valid = false;
                return Ok(index);
            }

            self.cursor = (self.cursor + 1) % self.slots.len();
        }
    }
}
