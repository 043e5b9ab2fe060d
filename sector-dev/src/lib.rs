//! # 扇区设备接口层
//!
//! 扇区设备以固定大小的**扇区**为单位存储数据，例如磁盘、SD卡、
//! 宿主机上的镜像文件等；[`SectorDevice`] 就是对读写扇区设备的抽象，
//! 实现了此特质的类型称为**扇区设备驱动**。
//!
//! 设备故障通过 [`DeviceError`] 上报，本层不做任何重试。

#![no_std]

/// 扇区设备驱动特质
pub trait SectorDevice: Send + Sync {
    /// 把编号为 `sector` 的扇区读入 `buf`
    fn read_sector(&self, sector: u32, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// 把 `buf` 写到编号为 `sector` 的扇区
    fn write_sector(&self, sector: u32, buf: &[u8]) -> Result<(), DeviceError>;
}

/// 设备读写故障，记下出事的扇区
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    pub sector: u32,
}
