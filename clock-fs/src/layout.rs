//! # 磁盘数据结构层
//!
//! 磁盘inode在一个扇区内的精确布局，以及它所指向的索引树：
//! - 直接槽：前98个槽位，每个直指一个**数据扇区**
//! - 一级索引槽：指向一个装满扇区ID的**指针扇区**
//! - 二级索引槽：指向的指针扇区里，每个ID又指向一个一级指针扇区
//!
//! 树的伸缩总是自左向右：直接槽先满，再动一级，最后二级。
//! 任何层级上，值为0的槽位都表示**未分配**。

use alloc::vec::Vec;
use core::mem;

use crate::allocator::SectorAllocator;
use crate::cache::SectorCache;
use crate::error::Error;
use crate::{DataSector, SECTOR_SIZE};

/// 一个指针扇区可容纳的扇区ID数
const POINTERS_PER_SECTOR: usize = SECTOR_SIZE / 4;
/// 指针扇区
type IndirectSector = [u32; POINTERS_PER_SECTOR];

/// inode头部的槽位总数
const SLOT_COUNT: usize = 100;
/// 直接槽数量
const DIRECT_SLOTS: usize = 98;
/// 一级索引槽的下标
const INDIRECT_SLOT: usize = DIRECT_SLOTS;
/// 二级索引槽的下标
const DOUBLY_SLOT: usize = DIRECT_SLOTS + 1;

/// 用上一级索引时的编号容量(数据扇区数)
const INDIRECT_CAP: usize = DIRECT_SLOTS + POINTERS_PER_SECTOR;
/// 用上二级索引时的编号容量
const DOUBLY_CAP: usize = INDIRECT_CAP + POINTERS_PER_SECTOR * POINTERS_PER_SECTOR;

/// 识别inode扇区的魔数
const INODE_MAGIC: u32 = 0x494e4f44;

/// 单个inode可表示的最大文件长度(字节)
pub const MAX_LENGTH: usize = DOUBLY_CAP * SECTOR_SIZE;

const ZEROS: DataSector = [0; SECTOR_SIZE];

/// 磁盘inode，必须恰好占满一个扇区。
///
/// 布局为既有磁盘镜像所约定，字段顺序与偏移不可更动；
/// 新增字段必须等量蚕食尾部的保留区。
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DiskInode {
    /// 98个直接槽 + 一级索引槽 + 二级索引槽
    blocks: [u32; SLOT_COUNT],
    /// 所属目录inode的扇区，根的双亲记为0
    parent: u32,
    kind: u8,
    _pad: [u8; 3],
    /// 文件长度(字节)
    pub(crate) length: u32,
    /// 魔数，校验此扇区确实存放inode
    magic: u32,
    /// 保留区，凑足一个扇区
    _reserved: [u32; 24],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InodeKind {
    File = 0,
    Directory = 1,
}

impl DiskInode {
    pub(crate) fn new(kind: InodeKind, parent: u32) -> Self {
        Self {
            blocks: [0; SLOT_COUNT],
            parent,
            kind: kind as u8,
            _pad: [0; 3],
            length: 0,
            magic: INODE_MAGIC,
            _reserved: [0; 24],
        }
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    #[inline]
    pub(crate) fn is_directory(&self) -> bool {
        self.kind == InodeKind::Directory as u8
    }

    #[inline]
    pub(crate) fn parent(&self) -> u32 {
        self.parent
    }

    /// 以扇区字节序列的形式呈现头部
    pub(crate) fn as_bytes(&self) -> &DataSector {
        unsafe { &*(self as *const Self).cast::<DataSector>() }
    }

    /// 从扇区字节序列中复原头部；合法性由调用者查验魔数
    pub(crate) fn from_bytes(buf: &DataSector) -> Self {
        unsafe { mem::transmute_copy::<DataSector, Self>(buf) }
    }

    /// 容纳 `length` 字节需要多少个数据扇区
    #[inline]
    pub(crate) fn count_data_sectors(length: usize) -> usize {
        length.div_ceil(SECTOR_SIZE)
    }

    /// 容纳 `length` 字节总共需要的扇区数，数据扇区与各级指针扇区都算上
    pub(crate) fn count_total_sectors(length: usize) -> usize {
        let data = Self::count_data_sectors(length);
        let mut total = data;

        // 超出直接槽，动用一级指针扇区
        if data > DIRECT_SLOTS {
            total += 1;
        }

        // 超出一级索引，动用二级指针扇区及其下属的一级指针扇区
        if data > INDIRECT_CAP {
            total += 1 + (data - INDIRECT_CAP).div_ceil(POINTERS_PER_SECTOR);
        }

        total
    }

    /// 返回 `offset` 字节落在哪个扇区；偏移不小于文件长度时为未分配
    pub(crate) fn sector_at(
        &self,
        cache: &SectorCache,
        offset: usize,
    ) -> Result<Option<u32>, Error> {
        if offset >= self.length as usize {
            return Ok(None);
        }
        self.locate(cache, offset / SECTOR_SIZE).map(Some)
    }

    /// 逻辑扇区索引 -> 扇区ID
    fn locate(&self, cache: &SectorCache, index: usize) -> Result<u32, Error> {
        if index < DIRECT_SLOTS {
            return Ok(self.blocks[index]);
        }

        // 剔去直接索引的部分
        let index = index - DIRECT_SLOTS;
        if index < POINTERS_PER_SECTOR {
            let ptrs = read_pointer_sector(cache, self.blocks[INDIRECT_SLOT])?;
            return Ok(ptrs[index]);
        }

        // 剔去一级索引的部分；商定位一级指针扇区，余数定位数据扇区
        let index = index - POINTERS_PER_SECTOR;
        let outer = read_pointer_sector(cache, self.blocks[DOUBLY_SLOT])?;
        let inner = read_pointer_sector(cache, outer[index / POINTERS_PER_SECTOR])?;
        Ok(inner[index % POINTERS_PER_SECTOR])
    }

    /// 扩充索引树，确保 `[0, new_length)` 的每个逻辑扇区都有已清零的实体。
    ///
    /// 对已分配前缀幂等：槽位非0即视作既有实体，原样保留。
    /// 全部缺口先一次性向分配器批下，空间不足时整体失败、
    /// 已批扇区如数退还，索引树不留任何痕迹。
    /// 设备半途出错时，已交付的扇区全部留在槽位上，
    /// 幂等重试会接着用它们，删除时也凭槽位回收；未用的立即退还。
    /// 不更新 `length`，由调用者在成功后提交。
    pub(crate) fn extend(
        &mut self,
        cache: &SectorCache,
        alloc: &dyn SectorAllocator,
        new_length: usize,
    ) -> Result<(), Error> {
        if new_length > MAX_LENGTH {
            return Err(Error::AllocationExhausted);
        }

        let existing = Self::count_data_sectors(self.length as usize);
        let target = Self::count_data_sectors(new_length);
        if target <= existing {
            return Ok(());
        }

        let need = Self::count_total_sectors(new_length)
            - Self::count_total_sectors(self.length as usize);
        let mut supply = SectorSupply::reserve(alloc, need)?;

        let result = self.fill(cache, &mut supply, existing, target);
        supply.release_rest(alloc);
        result
    }

    /// 把索引树从 `existing` 个数据扇区补足到 `target` 个
    fn fill(
        &mut self,
        cache: &SectorCache,
        supply: &mut SectorSupply,
        existing: usize,
        target: usize,
    ) -> Result<(), Error> {
        // 直接槽
        for index in existing.min(DIRECT_SLOTS)..target.min(DIRECT_SLOTS) {
            if self.blocks[index] == 0 {
                self.blocks[index] = supply.take(cache)?;
            }
        }
        if target <= DIRECT_SLOTS {
            return Ok(());
        }

        // 一级索引
        Self::fill_subtree(
            cache,
            supply,
            &mut self.blocks[INDIRECT_SLOT],
            existing.saturating_sub(DIRECT_SLOTS).min(POINTERS_PER_SECTOR),
            (target - DIRECT_SLOTS).min(POINTERS_PER_SECTOR),
            1,
        )?;
        if target <= INDIRECT_CAP {
            return Ok(());
        }

        // 二级索引
        Self::fill_subtree(
            cache,
            supply,
            &mut self.blocks[DOUBLY_SLOT],
            existing.saturating_sub(INDIRECT_CAP),
            target - INDIRECT_CAP,
            2,
        )
    }

    /// 把一棵以 `slot` 为根、深度为 `depth` 的索引子树从
    /// `existing` 个数据扇区补足到 `target` 个。
    /// 三个层级共用同一套递归，`depth == 0` 即数据扇区本身。
    fn fill_subtree(
        cache: &SectorCache,
        supply: &mut SectorSupply,
        slot: &mut u32,
        existing: usize,
        target: usize,
        depth: u32,
    ) -> Result<(), Error> {
        if existing >= target {
            return Ok(());
        }

        if *slot == 0 {
            *slot = supply.take(cache)?;
        }
        if depth == 0 {
            return Ok(());
        }

        // 每个下级槽位的编号容量
        let per_child = POINTERS_PER_SECTOR.pow(depth - 1);
        let mut ptrs = read_pointer_sector(cache, *slot)?;

        let mut filled = Ok(());
        for child in existing / per_child..target.div_ceil(per_child) {
            let base = child * per_child;
            filled = Self::fill_subtree(
                cache,
                supply,
                &mut ptrs[child],
                existing.saturating_sub(base).min(per_child),
                (target - base).min(per_child),
                depth - 1,
            );
            if filled.is_err() {
                break;
            }
        }

        // 半途出错也要把已挂上的孩子落回缓存，这些扇区凭槽位才找得回来
        write_pointer_sector(cache, *slot, &ptrs).and(filled)
    }

    /// 归还头部可达的所有扇区(数据与各级指针)，槽位清零、长度归零
    pub(crate) fn release_all(
        &mut self,
        cache: &SectorCache,
        alloc: &dyn SectorAllocator,
    ) -> Result<(), Error> {
        for index in 0..DIRECT_SLOTS {
            Self::release_subtree(cache, alloc, self.blocks[index], 0)?;
        }
        Self::release_subtree(cache, alloc, self.blocks[INDIRECT_SLOT], 1)?;
        Self::release_subtree(cache, alloc, self.blocks[DOUBLY_SLOT], 2)?;

        self.blocks = [0; SLOT_COUNT];
        self.length = 0;
        Ok(())
    }

    /// 自底向上归还一棵索引子树，0槽位直接跳过
    fn release_subtree(
        cache: &SectorCache,
        alloc: &dyn SectorAllocator,
        sector: u32,
        depth: u32,
    ) -> Result<(), Error> {
        if sector == 0 {
            return Ok(());
        }

        if depth > 0 {
            let ptrs = read_pointer_sector(cache, sector)?;
            for &child in ptrs.iter().filter(|&&child| child != 0) {
                Self::release_subtree(cache, alloc, child, depth - 1)?;
            }
        }

        alloc.release(sector, 1);
        Ok(())
    }
}

/// 一次扩充预先批下的扇区池
struct SectorSupply {
    fresh: Vec<u32>,
    next: usize,
}

impl SectorSupply {
    /// 向分配器逐个批下 `need` 个扇区；不足时如数退还
    fn reserve(alloc: &dyn SectorAllocator, need: usize) -> Result<Self, Error> {
        let mut fresh = Vec::with_capacity(need);

        for _ in 0..need {
            match alloc.allocate(1) {
                Some(sector) => fresh.push(sector),
                None => {
                    log::debug!("free space exhausted, returning {} sectors", fresh.len());
                    for &sector in &fresh {
                        alloc.release(sector, 1);
                    }
                    return Err(Error::AllocationExhausted);
                }
            }
        }

        Ok(Self { fresh, next: 0 })
    }

    /// 取出一个全新扇区，清零之后才算交付
    fn take(&mut self, cache: &SectorCache) -> Result<u32, Error> {
        let sector = *self.fresh.get(self.next).ok_or(Error::AllocationExhausted)?;
        cache.write(sector, &ZEROS)?;
        self.next += 1;
        Ok(sector)
    }

    /// 退还尚未交付的扇区
    fn release_rest(&self, alloc: &dyn SectorAllocator) {
        for &sector in &self.fresh[self.next..] {
            alloc.release(sector, 1);
        }
    }
}

/// 读入一个指针扇区
fn read_pointer_sector(cache: &SectorCache, sector: u32) -> Result<IndirectSector, Error> {
    let mut buf: DataSector = [0; SECTOR_SIZE];
    cache.read(sector, &mut buf)?;
    Ok(unsafe { mem::transmute::<DataSector, IndirectSector>(buf) })
}

/// 写回一个指针扇区
fn write_pointer_sector(
    cache: &SectorCache,
    sector: u32,
    ptrs: &IndirectSector,
) -> Result<(), Error> {
    let buf = unsafe { &*(ptrs as *const IndirectSector).cast::<DataSector>() };
    cache.write(sector, buf)?;
    Ok(())
}
