/// 空闲扇区分配器特质
///
/// 空闲位图由文件系统之外的组件维护，本层只申请与归还。
/// 扇区0被各级索引当作**未分配**的哨兵，分配器不得把它交出来。
pub trait SectorAllocator: Send + Sync {
    /// 申请连续 `count` 个扇区，返回第一个的编号；空间耗尽时返回空
    fn allocate(&self, count: u32) -> Option<u32>;

    /// 归还自 `sector` 起的连续 `count` 个扇区
    fn release(&self, sector: u32, count: u32);
}
