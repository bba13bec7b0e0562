//! 同步原语
//!
//! 为虚拟内存子系统提供关中断自旋锁：
//! - 帧子系统临界区（帧表、物理页池、swap 槽分配）
//! - 每个地址空间的独占访问
//!
//! 锁基于 [`lock_api`] 构建，[`SpinLock`] 即 `lock_api::Mutex<RawSpinLock, T>`。
//!
//! # 架构依赖
//!
//! 中断控制通过 [`ArchOps`] trait 抽象。
//! 使用前必须调用 [`register_arch_ops`] 注册实现。

#![no_std]

mod raw_spin_lock;
mod spin_lock;

pub use raw_spin_lock::RawSpinLock;
pub use spin_lock::{SpinLock, SpinLockGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由内核实现并注册，提供本地中断的开关。
pub trait ArchOps: Send + Sync {
    /// 读取并禁用中断，返回之前的状态
    ///
    /// # Safety
    /// 调用者必须确保在适当的上下文中调用
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 判断 flags 中中断是否处于启用状态
    fn interrupts_enabled(&self, flags: usize) -> bool;
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在任何锁被使用之前调用；重复注册时后一次覆盖前一次，
/// 调用者需保证两次注册的实现语义一致。
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的架构操作实现
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`]，则 panic
#[inline]
pub(crate) fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: ArchOps not registered, call register_arch_ops first");
    }
    // SAFETY: data 和 vtable 来自 register_arch_ops 中拆分的有效 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}
