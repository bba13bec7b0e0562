//! 虚拟内存子系统
//!
//! 为用户进程提供按需分页（demand paging）：
//! - 补充页表（SPT）：记录每个用户虚拟页的元数据与当前状态
//! - 帧表：记录驻留帧及其所有者，物理页耗尽时按 FIFO 选择牺牲帧
//! - 缺页处理：懒加载、换入、栈增长
//! - 匿名页与 swap 设备的换入换出
//! - 文件映射（mmap/munmap）及脏页回写
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与内核其余部分解耦：
//! - [`VmConfig`]: 页大小与用户地址空间布局
//! - [`ArchVmOps`]: 物理地址到直接映射区的转换
//! - [`PageTable`]: 硬件页表
//! - [`PhysPool`] / [`SwapDevice`]: 物理页池与交换设备
//! - [`MmFile`] / [`MmInode`]: 文件系统
//!
//! 使用前必须调用 [`register_arch_ops`] 和 [`register_config`] 注册实现，
//! 并为 `sync` crate 注册中断控制实现。
//!
//! # 锁顺序
//!
//! 先取帧子系统锁，再取地址空间锁。
//! 只有在持有帧子系统锁时才允许同时持有两个地址空间的锁。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod anon;
mod arch_ops;
mod config;
mod error;
mod file;
mod page;
mod spt;
mod swap;

pub mod address;
pub mod frame_allocator;
pub mod memory_space;
pub mod page_table;

#[cfg(test)]
mod tests;

pub use anon::AnonPage;
pub use arch_ops::{ArchVmOps, arch_ops, register_arch_ops};
pub use config::{STACK_GROWTH_CEILING, VmConfig, WORD_SIZE, register_config, vm_config};
pub use error::{VmError, VmResult};
pub use file::{FilePage, MmFile, MmInode};
pub use page::{Initializer, Page, PageKind, PageTarget, PageType, UninitPage, VmType};
pub use spt::SupplementalPageTable;
pub use swap::{SwapDevice, SwapSlot};

// Re-export 常用类型
pub use address::{AlignOps, Paddr, UsizeConvert, Vaddr, Vpn, VpnRange};
pub use frame_allocator::{FrameAllocator, FrameOwner, FrameStats, PhysPool, SpaceId};
pub use memory_space::{
    FAULT_EXIT_STATUS, FaultCause, FaultTask, MemorySpace, MmapRegion, PageFault, handle_user_fault,
};
pub use page_table::{PageTable, PteFlags};
