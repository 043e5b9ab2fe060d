//! # clock-fs
//!
//! 教学操作系统文件系统的存储引擎：
//! 时钟算法调度的扇区缓存，加上以直接/一级/二级索引
//! 寻址数据扇区的inode层。
//! 目录结构、路径解析等都属于更上层，不在本crate之内。

#![no_std]

extern crate alloc;

/* clock-fs 的整体架构，自上而下 */

// 文件系统门面：统筹缓存、分配器与打开inode表
mod cfs;

// 索引节点层：打开的文件在内存中的形态与生命周期
mod vfs;

// 磁盘数据结构层：inode 的磁盘布局与索引树的伸缩
mod layout;

// 扇区缓存层：时钟算法调度的定容扇区缓冲区
mod cache;

// 空闲扇区分配器接口
mod allocator;

mod error;

pub use sector_dev::{DeviceError, SectorDevice};

pub use self::{
    allocator::SectorAllocator,
    cache::SectorCache,
    cfs::ClockFileSystem,
    error::Error,
    layout::{DiskInode, InodeKind, MAX_LENGTH},
    vfs::Inode,
};

pub const SECTOR_SIZE: usize = 512;
/// 挂载文件系统时配备的缓存槽数
pub const CACHE_SLOTS: usize = 64;

pub type DataSector = [u8; SECTOR_SIZE];
