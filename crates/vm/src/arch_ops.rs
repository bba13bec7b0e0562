//! 架构相关虚拟内存操作 trait 定义和注册

use crate::address::{Paddr, UsizeConvert};
use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关虚拟内存操作
///
/// 内核通过直接映射区访问物理帧的内容。
pub trait ArchVmOps: Send + Sync {
    /// 将物理地址转换为虚拟地址（直接映射区域）
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在任何地址空间创建之前调用。重复注册时后一次覆盖前一次。
pub unsafe fn register_arch_ops(ops: &'static dyn ArchVmOps) {
    let ptr = ops as *const dyn ArchVmOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ArchVmOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的架构操作实现
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`] 注册实现，则 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchVmOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vm: ArchVmOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchVmOps>((data, vtable)) }
}

/// 通过直接映射区访问整个物理帧
///
/// # Safety
/// `paddr` 必须是帧子系统交出的、页对齐的物理帧。
/// 调用者需保证返回的切片存活期间没有其他对同一帧的可变引用。
pub(crate) unsafe fn frame_bytes<'a>(paddr: Paddr) -> &'a mut [u8] {
    let va = arch_ops().paddr_to_vaddr(paddr.as_usize());
    let len = crate::vm_config().page_size();
    unsafe { core::slice::from_raw_parts_mut(va as *mut u8, len) }
}
