//! 内存管理相关的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait
//! （例如 `VmConfig` / `ArchVmOps` / `PhysPool` / `PageTable`）。
//!
//! 直接映射采用"恒等映射"（vaddr == paddr）：
//! [`MockFramePool`] 交出的物理地址就是宿主机堆上真实可读写的地址。

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 测试使用的页大小
pub const MOCK_PAGE_SIZE: usize = 4096;

/// Mock 的直接映射（恒等映射）
pub struct MockDirectMap;

impl MockDirectMap {
    pub const fn new() -> Self {
        Self
    }

    /// 将物理地址转换为虚拟地址（恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }
}

impl Default for MockDirectMap {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_DIRECT_MAP: MockDirectMap = MockDirectMap::new();

/// Mock 的虚拟内存配置
pub struct MockVmConfig;

impl MockVmConfig {
    pub const fn new() -> Self {
        Self
    }

    pub fn page_size(&self) -> usize {
        MOCK_PAGE_SIZE
    }

    /// 用户栈顶（栈基址）
    pub fn user_stack_top(&self) -> usize {
        0x4748_0000
    }

    /// 用户地址空间结束处（第一个内核地址）
    pub fn user_space_end(&self) -> usize {
        0x8000_0000_0000
    }
}

impl Default for MockVmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_VM_CONFIG: MockVmConfig = MockVmConfig::new();

/// Mock 的物理页池
///
/// 在宿主机堆上分配一块按页对齐的内存作为"物理内存"。
pub struct MockFramePool {
    base: usize,
    pages: usize,
    free: Mutex<VecDeque<usize>>,
}

impl MockFramePool {
    /// 创建一个包含 `pages` 个物理页的池
    pub fn new(pages: usize) -> Self {
        assert!(pages > 0, "MockFramePool needs at least one page");
        let layout = Self::layout(pages);
        // SAFETY: layout 大小非零
        let base = unsafe { alloc_zeroed(layout) } as usize;
        assert!(base != 0, "MockFramePool: host allocation failed");
        let free = (0..pages).map(|i| base + i * MOCK_PAGE_SIZE).collect();
        Self {
            base,
            pages,
            free: Mutex::new(free),
        }
    }

    fn layout(pages: usize) -> Layout {
        Layout::from_size_align(pages * MOCK_PAGE_SIZE, MOCK_PAGE_SIZE)
            .expect("MockFramePool: bad layout")
    }

    /// 取出一个清零的物理页，池空时返回 None
    pub fn acquire_zeroed(&self) -> Option<usize> {
        let paddr = self.free.lock().unwrap().pop_front()?;
        // SAFETY: paddr 位于本池拥有的内存中
        unsafe { core::ptr::write_bytes(paddr as *mut u8, 0, MOCK_PAGE_SIZE) };
        Some(paddr)
    }

    /// 归还一个物理页
    pub fn release(&self, paddr: usize) {
        assert!(self.contains(paddr), "MockFramePool: foreign page {paddr:#x}");
        let mut free = self.free.lock().unwrap();
        assert!(!free.contains(&paddr), "MockFramePool: double free {paddr:#x}");
        free.push_back(paddr);
    }

    /// 物理地址是否属于本池
    pub fn contains(&self, paddr: usize) -> bool {
        paddr >= self.base
            && paddr < self.base + self.pages * MOCK_PAGE_SIZE
            && (paddr - self.base) % MOCK_PAGE_SIZE == 0
    }

    /// 池中空闲页数
    pub fn available(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    /// 池的总页数
    pub fn capacity(&self) -> usize {
        self.pages
    }
}

impl Drop for MockFramePool {
    fn drop(&mut self) {
        // SAFETY: base 由 new 中相同的 layout 分配
        unsafe { dealloc(self.base as *mut u8, Self::layout(self.pages)) };
    }
}

/// Mock 页表项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPte {
    pub paddr: usize,
    pub writable: bool,
    pub dirty: bool,
}

static NEXT_ROOT: AtomicUsize = AtomicUsize::new(0x1000);

/// Mock 的硬件页表
///
/// 以虚拟页号为键记录映射，模拟 dirty 位。
pub struct MockPageTable {
    root: usize,
    entries: BTreeMap<usize, MockPte>,
}

impl MockPageTable {
    pub fn new() -> Self {
        Self {
            root: NEXT_ROOT.fetch_add(MOCK_PAGE_SIZE, Ordering::Relaxed),
            entries: BTreeMap::new(),
        }
    }

    /// 伪造的根页表地址，每个页表唯一
    pub fn root(&self) -> usize {
        self.root
    }

    /// 安装映射，覆盖已有表项
    pub fn map(&mut self, vpn: usize, paddr: usize, writable: bool) {
        self.entries.insert(
            vpn,
            MockPte {
                paddr,
                writable,
                dirty: false,
            },
        );
    }

    /// 清除映射
    pub fn unmap(&mut self, vpn: usize) -> Option<MockPte> {
        self.entries.remove(&vpn)
    }

    /// 查询表项
    pub fn entry(&self, vpn: usize) -> Option<MockPte> {
        self.entries.get(&vpn).copied()
    }

    /// 设置 dirty 位（表项不存在时忽略）
    pub fn set_dirty(&mut self, vpn: usize, dirty: bool) {
        if let Some(pte) = self.entries.get_mut(&vpn) {
            pte.dirty = dirty;
        }
    }

    /// 有效表项数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MockPageTable {
    fn default() -> Self {
        Self::new()
    }
}
