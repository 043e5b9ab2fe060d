//! # 索引节点层
//!
//! 磁盘inode在内存中的形态：同一扇区的所有打开者共享一个
//! [`Inode`]，以打开计数维系生死，删除被推迟到最后一次关闭。
//!
//! inode锁在每个操作的最外层取得一次，内部直接传递独占引用，
//! 不存在同线程重入；解析单个扇区期间之外不占着锁做搬运。

use alloc::sync::Arc;

use spin::Mutex;

use crate::allocator::SectorAllocator;
use crate::cache::SectorCache;
use crate::error::Error;
use crate::layout::DiskInode;
use crate::{DataSector, SECTOR_SIZE};

/// 内存中的inode，全体打开者共享
pub struct Inode {
    /// 头部所在的扇区，也是inode的身份
    sector: u32,
    cache: Arc<SectorCache>,
    alloc: Arc<dyn SectorAllocator>,
    pub(crate) state: Mutex<InodeState>,
}

pub(crate) struct InodeState {
    /// 头部的内存副本，与磁盘保持一致
    pub(crate) disk: DiskInode,
    /// 打开计数，归零时对象被注销
    pub(crate) open_count: usize,
    /// 已被标记删除，最后一次关闭时落实
    pub(crate) removed: bool,
    /// 禁写计数，大于零时写入一律不生效
    pub(crate) deny_write_count: usize,
}

impl Inode {
    pub(crate) fn new(
        sector: u32,
        disk: DiskInode,
        cache: Arc<SectorCache>,
        alloc: Arc<dyn SectorAllocator>,
    ) -> Self {
        Self {
            sector,
            cache,
            alloc,
            state: Mutex::new(InodeState {
                disk,
                open_count: 1,
                removed: false,
                deny_write_count: 0,
            }),
        }
    }

    /// inode的编号，即其头部所在扇区
    #[inline]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// 文件长度(字节)
    #[inline]
    pub fn length(&self) -> usize {
        self.state.lock().disk.length as usize
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.state.lock().disk.is_directory()
    }

    /// 所属目录inode的扇区，根返回0
    #[inline]
    pub fn parent(&self) -> u32 {
        self.state.lock().disk.parent()
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// 当前的打开者数目
    #[inline]
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// 标记删除；实际的回收推迟到最后一次关闭
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    /// 禁止写入，可叠加；每次禁写都须有对应的解禁
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        debug_assert!(state.deny_write_count <= state.open_count);
    }

    /// 解除一次禁写
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.deny_write_count > 0);
        debug_assert!(state.deny_write_count <= state.open_count);
        state.deny_write_count -= 1;
    }

    /// 从 `offset` 起读出至多 `buf.len()` 字节，返回实际读出的字节数。
    /// 文件尾造成的短读是常态，设备故障才以错误上报。
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let mut bounce: DataSector = [0; SECTOR_SIZE];
        let mut read_size = 0;
        let mut pos = offset;

        while read_size < buf.len() {
            // 只在解析当前扇区期间持有inode锁
            let (sector, length) = {
                let state = self.state.lock();
                match state.disk.sector_at(&self.cache, pos)? {
                    Some(sector) => (sector, state.disk.length as usize),
                    None => break,
                }
            };

            let sector_offset = pos % SECTOR_SIZE;
            let chunk = (buf.len() - read_size)
                .min(length - pos)
                .min(SECTOR_SIZE - sector_offset);

            if sector_offset == 0 && chunk == SECTOR_SIZE {
                // 整扇区直接落到调用者的缓冲区
                self.cache
                    .read(sector, &mut buf[read_size..read_size + SECTOR_SIZE])?;
            } else {
                // 非对齐或残段，经由中转扇区
                self.cache.read(sector, &mut bounce)?;
                buf[read_size..read_size + chunk]
                    .copy_from_slice(&bounce[sector_offset..sector_offset + chunk]);
            }

            read_size += chunk;
            pos += chunk;
        }

        Ok(read_size)
    }

    /// 自 `offset` 写入 `buf`，返回实际写入的字节数；
    /// 处于禁写状态时一个字节也不写。
    /// 写越当前长度时先扩充索引树、落盘新头部，然后才搬运数据。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let end = offset + buf.len();
        {
            let mut state = self.state.lock();
            if state.deny_write_count > 0 {
                return Ok(0);
            }

            if end > state.disk.length as usize {
                if let Err(err) = state.disk.extend(&self.cache, &*self.alloc, end) {
                    // 扩充半途而废也把已占的槽位落盘，那些扇区仍有迹可循
                    let _ = self.cache.write(self.sector, state.disk.as_bytes());
                    return Err(err);
                }
                state.disk.length = end as u32;
                self.cache.write(self.sector, state.disk.as_bytes())?;
            }
        }

        let mut bounce: DataSector = [0; SECTOR_SIZE];
        let mut written_size = 0;
        let mut pos = offset;

        while written_size < buf.len() {
            let (sector, length) = {
                let state = self.state.lock();
                match state.disk.sector_at(&self.cache, pos)? {
                    Some(sector) => (sector, state.disk.length as usize),
                    None => break,
                }
            };

            let sector_offset = pos % SECTOR_SIZE;
            let chunk = (buf.len() - written_size)
                .min(length - pos)
                .min(SECTOR_SIZE - sector_offset);

            if sector_offset == 0 && chunk == SECTOR_SIZE {
                self.cache
                    .write(sector, &buf[written_size..written_size + SECTOR_SIZE])?;
            } else {
                // 残段写：先读回旧扇区再覆盖；
                // 新扩出的扇区已被清零，不碰的字节读回来就是0
                self.cache.read(sector, &mut bounce)?;
                bounce[sector_offset..sector_offset + chunk]
                    .copy_from_slice(&buf[written_size..written_size + chunk]);
                self.cache.write(sector, &bounce)?;
            }

            written_size += chunk;
            pos += chunk;
        }

        Ok(written_size)
    }
}
