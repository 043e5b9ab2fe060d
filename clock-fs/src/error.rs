use sector_dev::DeviceError;

/// 核心层的硬故障。
/// 文件尾造成的短读短写不在此列，那些通过返回的字节数表达。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 设备读写失败，原样上报
    Device(DeviceError),
    /// 空闲扇区耗尽
    AllocationExhausted,
    /// 魔数校验失败，该扇区并不存放inode
    InvalidHeader,
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        Self::Device(err)
    }
}
