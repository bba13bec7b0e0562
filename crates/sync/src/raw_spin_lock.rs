//! 关中断自旋锁的原始实现
//!
//! 获取锁前禁用本地中断，释放锁后恢复进入时的中断状态。
//! 进入时的中断状态保存在锁内部，只有持锁者会读写它。

use crate::arch_ops;
use core::{
    hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// 原始自旋锁，实现 [`lock_api::RawMutex`]。
///
/// 不可重入。嵌套持有多把锁时必须按获取的逆序释放，
/// 否则中断状态会被提前恢复。
#[derive(Debug)]
pub struct RawSpinLock {
    locked: AtomicBool,
    /// 获取锁之前的中断状态
    saved_flags: AtomicUsize,
}

impl RawSpinLock {
    /// 创建一个未上锁的 RawSpinLock。
    pub const fn new() -> Self {
        RawSpinLock {
            locked: AtomicBool::new(false),
            saved_flags: AtomicUsize::new(0),
        }
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: locked 标志通过 Acquire/Release 的 CAS 保证同一时刻只有一个持有者
unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    // 守卫携带了本 CPU 的中断状态，不能跨 CPU 释放
    type GuardMarker = lock_api::GuardNoSend;

    fn lock(&self) {
        // SAFETY: 对应的恢复在 unlock 中完成
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        self.saved_flags.store(flags, Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        // SAFETY: 失败路径立即恢复，成功路径在 unlock 中恢复
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.saved_flags.store(flags, Ordering::Relaxed);
            true
        } else {
            unsafe { arch_ops().restore_interrupts(flags) };
            false
        }
    }

    unsafe fn unlock(&self) {
        let flags = self.saved_flags.load(Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        // SAFETY: flags 由 lock/try_lock 中的 read_and_disable_interrupts 得到
        unsafe { arch_ops().restore_interrupts(flags) };
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
