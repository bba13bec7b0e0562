//! 架构相关操作的 Mock 实现

use std::cell::Cell;

std::thread_local! {
    // 每个测试线程模拟一个独立的 CPU
    static INTERRUPTS_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Mock 架构操作（中断控制）
pub struct MockArchOps;

impl MockArchOps {
    pub const fn new() -> Self {
        Self
    }

    /// 读取并禁用当前线程的"中断"，返回之前的状态
    ///
    /// # Safety
    /// 仅用于测试环境。
    pub unsafe fn read_and_disable_interrupts(&self) -> usize {
        INTERRUPTS_ENABLED.with(|f| f.replace(false)) as usize
    }

    /// 恢复中断状态
    ///
    /// # Safety
    /// 仅用于测试环境。
    pub unsafe fn restore_interrupts(&self, flags: usize) {
        INTERRUPTS_ENABLED.with(|f| f.set(flags != 0));
    }

    /// flags 中中断是否启用
    pub fn interrupts_enabled(&self, flags: usize) -> bool {
        flags != 0
    }

    /// 当前线程的中断是否启用
    pub fn interrupts_on(&self) -> bool {
        INTERRUPTS_ENABLED.with(|f| f.get())
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
