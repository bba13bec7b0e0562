//! 补充页表（Supplemental Page Table）
//!
//! 以虚拟页号为键保存每个用户页的 [`Page`]。硬件页表只记录驻留的映射，
//! 补充页表记录所有已登记的页，包括未物化和已换出的页。
//!
//! 移除、复制和销毁需要访问帧表和交换设备，由 [`MemorySpace`] 完成。
//!
//! [`MemorySpace`]: crate::MemorySpace

use crate::address::{Vaddr, Vpn};
use crate::error::{VmError, VmResult};
use crate::page::Page;
use alloc::vec::Vec;
use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

/// 补充页表
#[derive(Debug, Default)]
pub struct SupplementalPageTable {
    pages: HashMap<Vpn, Page>,
}

impl SupplementalPageTable {
    /// 创建空表
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    /// 查找包含该地址的页（地址向下取整到页边界）
    pub fn find(&self, addr: Vaddr) -> Option<&Page> {
        self.pages.get(&Vpn::from_addr_floor(addr))
    }

    /// 按页号查找
    pub fn get(&self, vpn: Vpn) -> Option<&Page> {
        self.pages.get(&vpn)
    }

    pub(crate) fn get_mut(&mut self, vpn: Vpn) -> Option<&mut Page> {
        self.pages.get_mut(&vpn)
    }

    /// 页号是否已登记
    pub fn contains(&self, vpn: Vpn) -> bool {
        self.pages.contains_key(&vpn)
    }

    /// 登记一个页；该页号已存在时返回 [`VmError::AlreadyMapped`]，原有页保持不变
    pub fn insert(&mut self, page: Page) -> VmResult<()> {
        match self.pages.entry(page.vpn()) {
            Entry::Occupied(_) => Err(VmError::AlreadyMapped),
            Entry::Vacant(slot) => {
                slot.insert(page);
                Ok(())
            }
        }
    }

    /// 取出一个页的元数据，不做任何清理
    pub(crate) fn take(&mut self, vpn: Vpn) -> Option<Page> {
        self.pages.remove(&vpn)
    }

    /// 所有已登记的页号，按地址升序
    pub fn vpns(&self) -> Vec<Vpn> {
        let mut vpns: Vec<Vpn> = self.pages.keys().copied().collect();
        vpns.sort_unstable();
        vpns
    }

    /// 遍历所有页（无序）
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    /// 已登记的页数
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
