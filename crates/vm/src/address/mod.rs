//! 地址抽象模块
//!
//! 定义虚拟地址 [`Vaddr`]、物理地址 [`Paddr`] 与虚拟页号 [`Vpn`]。
//! 三者都是对 `usize` 的透明包装，防止不同地址空间的数值被混用。

mod page_num;

pub use page_num::{Vpn, VpnRange};

use core::fmt;

/// 获取页大小
#[inline]
fn page_size() -> usize {
    crate::vm_config().page_size()
}

/// 与 `usize` 互相转换
pub trait UsizeConvert: Copy {
    /// 从 `usize` 构造
    fn from_usize(value: usize) -> Self;

    /// 转换为 `usize`
    fn as_usize(self) -> usize;
}

/// 页对齐相关操作
pub trait AlignOps: UsizeConvert {
    /// 页内偏移
    fn page_offset(self) -> usize {
        self.as_usize() & (page_size() - 1)
    }

    /// 是否页对齐
    fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// 向下对齐到页边界
    fn align_down_to_page(self) -> Self {
        Self::from_usize(self.as_usize() & !(page_size() - 1))
    }
}

macro_rules! impl_address {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl UsizeConvert for $name {
            #[inline]
            fn from_usize(value: usize) -> Self {
                Self(value)
            }

            #[inline]
            fn as_usize(self) -> usize {
                self.0
            }
        }

        impl AlignOps for $name {}

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }
    };
}

impl_address!(Vaddr, "虚拟地址");
impl_address!(Paddr, "物理地址");

impl Vaddr {
    /// 是否为空指针
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// 是否位于用户地址空间
    pub fn is_user(self) -> bool {
        self.0 < crate::vm_config().user_space_end()
    }

    /// 加上字节偏移，溢出时返回 None
    pub fn checked_add(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}
