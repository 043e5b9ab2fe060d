//! # 文件系统门面
//!
//! 把扇区缓存、空闲扇区分配器与打开inode表拢进一个实例，
//! 负责inode的创建、打开、关闭与全量落盘。

use alloc::sync::Arc;
use alloc::vec::Vec;

use sector_dev::SectorDevice;
use spin::Mutex;

use crate::allocator::SectorAllocator;
use crate::cache::SectorCache;
use crate::error::Error;
use crate::layout::{DiskInode, InodeKind};
use crate::vfs::Inode;
use crate::{CACHE_SLOTS, DataSector, SECTOR_SIZE};

/// 根目录inode双亲的哨兵值
const ROOT_PARENT: u32 = 0;

pub struct ClockFileSystem {
    cache: Arc<SectorCache>,
    alloc: Arc<dyn SectorAllocator>,
    /// 打开inode表：同一扇区只存一份共享对象。
    /// 表有自己的锁，与任何单个inode的锁无关。
    inodes: Mutex<Vec<Arc<Inode>>>,
}

impl ClockFileSystem {
    /// 在设备与分配器之上挂载一个文件系统实例
    pub fn new(dev: Arc<dyn SectorDevice>, alloc: Arc<dyn SectorAllocator>) -> Self {
        Self {
            cache: Arc::new(SectorCache::new(dev, CACHE_SLOTS)),
            alloc,
            inodes: Mutex::new(Vec::new()),
        }
    }

    /// 在 `sector` 处创建一个长为 `length` 字节的inode，
    /// 创建与扩充走同一套分配算法。
    /// 失败时该扇区上不会留下头部；扇区本身始终归调用者与分配器。
    pub fn create(&self, sector: u32, length: usize, kind: InodeKind) -> Result<(), Error> {
        let mut disk = DiskInode::new(kind, ROOT_PARENT);

        let written = disk.extend(&self.cache, &*self.alloc, length).and_then(|_| {
            disk.length = length as u32;
            self.cache.write(sector, disk.as_bytes()).map_err(Error::from)
        });
        if let Err(err) = written {
            // 头部不会落盘，半成品索引树就地拆还，不能沦为孤儿
            let _ = disk.release_all(&self.cache, &*self.alloc);
            return Err(err);
        }
        Ok(())
    }

    /// 打开 `sector` 处的inode；重复打开返回同一个共享对象
    pub fn open(&self, sector: u32) -> Result<Arc<Inode>, Error> {
        let mut inodes = self.inodes.lock();

        if let Some(inode) = inodes.iter().find(|inode| inode.sector() == sector) {
            inode.state.lock().open_count += 1;
            return Ok(Arc::clone(inode));
        }

        let mut buf: DataSector = [0; SECTOR_SIZE];
        self.cache.read(sector, &mut buf)?;
        let disk = DiskInode::from_bytes(&buf);
        if !disk.is_valid() {
            log::error!("sector {sector} doesn't hold an inode");
            return Err(Error::InvalidHeader);
        }

        let inode = Arc::new(Inode::new(
            sector,
            disk,
            Arc::clone(&self.cache),
            Arc::clone(&self.alloc),
        ));
        inodes.push(Arc::clone(&inode));
        Ok(inode)
    }

    /// 送走一个打开者；计数归零时注销对象，
    /// 若曾被标记删除，则归还其全部数据扇区与头部扇区
    pub fn close(&self, inode: &Arc<Inode>) -> Result<(), Error> {
        let mut inodes = self.inodes.lock();
        let mut state = inode.state.lock();

        debug_assert!(state.open_count > 0);
        state.open_count -= 1;
        if state.open_count > 0 {
            return Ok(());
        }

        inodes.retain(|other| other.sector() != inode.sector());

        if state.removed {
            state.disk.release_all(&self.cache, &*self.alloc)?;
            self.alloc.release(inode.sector(), 1);
        }
        Ok(())
    }

    /// 把缓存里所有的脏扇区写回设备
    pub fn sync_all(&self) -> Result<(), Error> {
        self.cache.sync_all().map_err(Error::from)
    }
}
