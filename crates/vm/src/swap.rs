//! 交换设备抽象

/// 交换槽位编号，一个槽位正好容纳一页
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(pub usize);

/// 交换设备
///
/// 槽位的分配与释放由实现者加锁保护。
/// `read`/`write` 的缓冲区长度恰为一页。
pub trait SwapDevice: Send + Sync {
    /// 分配一个空闲槽位，设备已满时返回 None
    fn alloc_slot(&self) -> Option<SwapSlot>;

    /// 将一页写入槽位
    fn write(&self, slot: SwapSlot, page: &[u8]) -> Result<(), isize>;

    /// 从槽位读出一页
    fn read(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), isize>;

    /// 释放槽位
    fn free(&self, slot: SwapSlot);
}
