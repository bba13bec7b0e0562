//! 虚拟内存子系统测试
//!
//! 测试基础设施：为 test-support 中的 Mock 实现本 crate 的 trait，
//! 并提供共享的初始化与构造函数。

use crate::address::{Paddr, UsizeConvert, Vaddr, Vpn};
use crate::file::{MmFile, MmInode};
use crate::frame_allocator::{FrameAllocator, PhysPool};
use crate::memory_space::{FaultCause, FaultTask, MemorySpace, PageFault};
use crate::page_table::{PageTable, PteFlags};
use crate::swap::{SwapDevice, SwapSlot};
use crate::{ArchVmOps, VmConfig};
use alloc::vec;
use alloc::vec::Vec;
use std::sync::{Arc, Once};
use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::fs::{MockFile, MockInode};
use test_support::mock::mm::{
    MOCK_DIRECT_MAP, MOCK_PAGE_SIZE, MOCK_VM_CONFIG, MockDirectMap, MockFramePool, MockPageTable,
    MockVmConfig,
};
use test_support::mock::swap::MockSwap;
use test_support::mock::task::MockTask;

mod fault;
mod uaccess;

pub(crate) const PAGE: usize = MOCK_PAGE_SIZE;

// ===== trait 实现 =====

/// sync crate 的中断控制，委托给 MOCK_ARCH_OPS
struct TestInterrupts;

impl sync::ArchOps for TestInterrupts {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
    }

    fn interrupts_enabled(&self, flags: usize) -> bool {
        MOCK_ARCH_OPS.interrupts_enabled(flags)
    }
}

static TEST_INTERRUPTS: TestInterrupts = TestInterrupts;

impl VmConfig for MockVmConfig {
    fn page_size(&self) -> usize {
        MockVmConfig::page_size(self)
    }

    fn user_stack_top(&self) -> usize {
        MockVmConfig::user_stack_top(self)
    }

    fn user_space_end(&self) -> usize {
        MockVmConfig::user_space_end(self)
    }
}

impl ArchVmOps for MockDirectMap {
    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        MockDirectMap::paddr_to_vaddr(self, paddr)
    }
}

impl PhysPool for MockFramePool {
    fn acquire_zeroed(&self) -> Option<Paddr> {
        MockFramePool::acquire_zeroed(self).map(Paddr::from_usize)
    }

    fn release(&self, paddr: Paddr) {
        MockFramePool::release(self, paddr.as_usize())
    }
}

impl SwapDevice for MockSwap {
    fn alloc_slot(&self) -> Option<SwapSlot> {
        MockSwap::alloc_slot(self).map(SwapSlot)
    }

    fn write(&self, slot: SwapSlot, page: &[u8]) -> Result<(), isize> {
        MockSwap::write(self, slot.0, page)
    }

    fn read(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), isize> {
        MockSwap::read(self, slot.0, page)
    }

    fn free(&self, slot: SwapSlot) {
        MockSwap::free(self, slot.0)
    }
}

impl PageTable for MockPageTable {
    fn new() -> Self {
        MockPageTable::new()
    }

    fn root(&self) -> Paddr {
        Paddr::from_usize(MockPageTable::root(self))
    }

    fn install(&mut self, vpn: Vpn, paddr: Paddr, flags: PteFlags) {
        self.map(
            vpn.as_usize(),
            paddr.as_usize(),
            flags.contains(PteFlags::WRITABLE),
        );
    }

    fn unmap(&mut self, vpn: Vpn) {
        MockPageTable::unmap(self, vpn.as_usize());
    }

    fn query(&self, vpn: Vpn) -> Option<(Paddr, PteFlags)> {
        self.entry(vpn.as_usize()).map(|pte| {
            let mut flags = PteFlags::user_page(pte.writable);
            if pte.dirty {
                flags |= PteFlags::DIRTY;
            }
            (Paddr::from_usize(pte.paddr), flags)
        })
    }

    fn set_dirty(&mut self, vpn: Vpn, dirty: bool) {
        MockPageTable::set_dirty(self, vpn.as_usize(), dirty)
    }
}

impl MmInode for MockInode {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        MockInode::read_at(self, offset, buf)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        MockInode::write_at(self, offset, buf)
    }

    fn size(&self) -> usize {
        MockInode::size(self)
    }
}

impl MmFile for MockFile {
    fn inode(&self) -> Result<Arc<dyn MmInode>, isize> {
        Ok(MockFile::inode(self) as Arc<dyn MmInode>)
    }

    fn reopen(&self) -> Result<Arc<dyn MmFile>, isize> {
        MockFile::reopen(self).map(|file| file as Arc<dyn MmFile>)
    }
}

impl FaultTask for MockTask {
    fn exit(&self, status: i32) {
        MockTask::exit(self, status)
    }
}

// ===== 测试基础设施 =====

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| unsafe {
        sync::register_arch_ops(&TEST_INTERRUPTS);
        crate::register_config(&MOCK_VM_CONFIG);
        crate::register_arch_ops(&MOCK_DIRECT_MAP);
    });
}

pub(crate) type TestSpace = MemorySpace<MockPageTable>;

/// 一套独立的帧子系统
pub(crate) struct Harness {
    pub pool: Arc<MockFramePool>,
    pub swap: Arc<MockSwap>,
    pub frames: Arc<FrameAllocator<MockPageTable>>,
}

impl Harness {
    /// `frames` 个物理页，`slots` 个交换槽位
    pub fn new(frames: usize, slots: usize) -> Self {
        init();
        let pool = Arc::new(MockFramePool::new(frames));
        let swap = Arc::new(MockSwap::new(slots));
        let frames = FrameAllocator::new(pool.clone(), swap.clone());
        Self {
            pool,
            swap,
            frames,
        }
    }

    pub fn space(&self) -> TestSpace {
        MemorySpace::new(&self.frames)
    }
}

/// 普通数据区中第 `n` 页的地址
pub(crate) fn data_page(n: usize) -> Vaddr {
    Vaddr::from_usize(0x1000_0000 + n * PAGE)
}

/// 用户栈顶
pub(crate) fn stack_top() -> usize {
    MOCK_VM_CONFIG.user_stack_top()
}

/// 用户态缺页，栈指针位于栈顶附近
pub(crate) fn user_fault(addr: Vaddr, write: bool) -> PageFault {
    let mut cause = FaultCause::USER | FaultCause::NOT_PRESENT;
    if write {
        cause |= FaultCause::WRITE;
    }
    PageFault {
        addr,
        cause,
        sp: Vaddr::from_usize(stack_top() - 0x100),
    }
}

/// 读出一页中的 `len` 字节
pub(crate) fn read_user(space: &TestSpace, addr: Vaddr, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    space.copy_from_user(addr, &mut buf).unwrap();
    buf
}

/// 用 `byte` 填满一页
pub(crate) fn fill_page(space: &TestSpace, addr: Vaddr, byte: u8) {
    space.copy_to_user(addr, &[byte; PAGE]).unwrap();
}
