//! 硬件页表抽象
//!
//! 虚拟内存子系统只需要安装/清除用户页映射并读写 dirty 位，
//! 多级页表的遍历由架构实现负责。

use crate::address::{AlignOps, Paddr, UsizeConvert, Vaddr, Vpn};
use bitflags::bitflags;

bitflags! {
    /// 页表项标志（与架构无关）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        /// 有效位
        const VALID = 1 << 0;
        /// 可写
        const WRITABLE = 1 << 1;
        /// 用户态可访问
        const USER = 1 << 2;
        /// 已访问
        const ACCESSED = 1 << 3;
        /// 已写（脏）
        const DIRTY = 1 << 4;
    }
}

impl PteFlags {
    /// 用户页映射的标志
    pub fn user_page(writable: bool) -> Self {
        let mut flags = PteFlags::VALID | PteFlags::USER;
        if writable {
            flags |= PteFlags::WRITABLE;
        }
        flags
    }
}

/// 一个地址空间的硬件页表
///
/// 由架构代码实现。实现者在硬件写入页面时设置 DIRTY。
pub trait PageTable: Sized + Send + 'static {
    /// 创建一个只包含内核映射的新页表
    fn new() -> Self;

    /// 根页表的物理地址，用于切换地址空间
    fn root(&self) -> Paddr;

    /// 安装 `vpn -> paddr` 映射，覆盖已有映射，新映射的 DIRTY 位清零
    fn install(&mut self, vpn: Vpn, paddr: Paddr, flags: PteFlags);

    /// 清除映射（不存在时忽略）
    fn unmap(&mut self, vpn: Vpn);

    /// 查询映射
    fn query(&self, vpn: Vpn) -> Option<(Paddr, PteFlags)>;

    /// 设置或清除 DIRTY 位（不存在映射时忽略）
    fn set_dirty(&mut self, vpn: Vpn, dirty: bool);

    /// DIRTY 位是否置位
    fn is_dirty(&self, vpn: Vpn) -> bool {
        self.query(vpn)
            .is_some_and(|(_, flags)| flags.contains(PteFlags::DIRTY))
    }

    /// 虚拟地址翻译为物理地址
    fn translate(&self, vaddr: Vaddr) -> Option<Paddr> {
        self.query(Vpn::from_addr_floor(vaddr))
            .map(|(paddr, _)| Paddr::from_usize(paddr.as_usize() + vaddr.page_offset()))
    }
}
