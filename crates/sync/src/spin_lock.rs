//! 自旋锁封装
//!
//! 提供对数据的互斥访问的自旋锁类型。

use crate::raw_spin_lock::RawSpinLock;

/// 提供对数据的互斥访问的自旋锁。
///
/// # 示例
/// ```ignore
/// let lock = SpinLock::new(0);
/// {
///     let mut guard = lock.lock(); // 获取锁，禁用中断
///     *guard += 1;
/// } // 离开作用域，释放锁并恢复中断状态
/// ```
///
/// # 注意
/// SpinLock 不可重入。持锁期间应避免长时间运行的操作。
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// SpinLock 的 RAII 保护器。
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArchOps;
    use test_support::mock::arch::{MOCK_ARCH_OPS, MockArchOps};

    impl ArchOps for MockArchOps {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            unsafe { MockArchOps::read_and_disable_interrupts(self) }
        }

        unsafe fn restore_interrupts(&self, flags: usize) {
            unsafe { MockArchOps::restore_interrupts(self, flags) }
        }

        fn interrupts_enabled(&self, flags: usize) -> bool {
            MockArchOps::interrupts_enabled(self, flags)
        }
    }

    fn setup() {
        unsafe { crate::register_arch_ops(&MOCK_ARCH_OPS) };
    }

    #[test]
    fn test_lock_disables_and_restores_interrupts() {
        setup();
        let lock = SpinLock::new(0usize);
        assert!(MOCK_ARCH_OPS.interrupts_on());
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(!MOCK_ARCH_OPS.interrupts_on());
        }
        assert!(MOCK_ARCH_OPS.interrupts_on());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_nested_locks_restore_in_reverse_order() {
        setup();
        let outer = SpinLock::new(());
        let inner = SpinLock::new(());
        let g1 = outer.lock();
        let g2 = inner.lock();
        drop(g2);
        // 外层锁仍被持有，中断必须保持关闭
        assert!(!MOCK_ARCH_OPS.interrupts_on());
        drop(g1);
        assert!(MOCK_ARCH_OPS.interrupts_on());
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        setup();
        let lock = SpinLock::new(5);
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        assert!(lock.is_locked());
        drop(guard);
        assert!(!lock.is_locked());
        assert_eq!(lock.try_lock().map(|g| *g), Some(5));
        assert!(MOCK_ARCH_OPS.interrupts_on());
    }
}
