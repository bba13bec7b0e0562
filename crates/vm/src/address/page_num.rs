//! 虚拟页号

use super::{AlignOps, UsizeConvert, Vaddr, page_size};
use core::fmt;

/// 虚拟页号
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vpn(usize);

impl UsizeConvert for Vpn {
    #[inline]
    fn from_usize(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    fn as_usize(self) -> usize {
        self.0
    }
}

impl Vpn {
    /// 包含该地址的页（向下取整）
    pub fn from_addr_floor(addr: Vaddr) -> Self {
        Self(addr.align_down_to_page().as_usize() / page_size())
    }

    /// 页的起始地址
    pub fn start_addr(self) -> Vaddr {
        Vaddr::from_usize(self.0 * page_size())
    }

    /// 向后偏移 `pages` 页
    pub fn offset(self, pages: usize) -> Self {
        Self(self.0 + pages)
    }
}

impl fmt::Debug for Vpn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vpn({:#x})", self.0)
    }
}

/// 连续虚拟页号范围 `[start, end)`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VpnRange {
    start: Vpn,
    end: Vpn,
}

impl VpnRange {
    /// 从起始页号和页数构造
    pub fn new(start: Vpn, pages: usize) -> Self {
        Self {
            start,
            end: start.offset(pages),
        }
    }

    /// 起始页号
    pub fn start(&self) -> Vpn {
        self.start
    }

    /// 结束页号（不包含）
    pub fn end(&self) -> Vpn {
        self.end
    }

    /// 页数
    pub fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 页号是否在范围内
    pub fn contains(&self, vpn: Vpn) -> bool {
        self.start <= vpn && vpn < self.end
    }
}

impl IntoIterator for VpnRange {
    type Item = Vpn;
    type IntoIter = core::iter::Map<core::ops::Range<usize>, fn(usize) -> Vpn>;

    fn into_iter(self) -> Self::IntoIter {
        (self.start.0..self.end.0).map(Vpn as fn(usize) -> Vpn)
    }
}
