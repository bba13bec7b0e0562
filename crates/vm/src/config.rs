//! 虚拟内存配置 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 栈增长的上限：栈从栈顶向下最多增长 1 MiB
pub const STACK_GROWTH_CEILING: usize = 1 << 20;

/// 机器字长。压栈指令在移动栈指针之前访问 `sp - WORD_SIZE`
pub const WORD_SIZE: usize = core::mem::size_of::<usize>();

/// 虚拟内存配置常量
///
/// 此 trait 提供虚拟内存子系统所需的布局常量。
/// 内核需要实现此 trait 并注册。
pub trait VmConfig: Send + Sync {
    /// 页大小（通常为 4096），必须是 2 的幂
    fn page_size(&self) -> usize;

    /// 用户栈顶地址（栈基址，栈向低地址增长）
    fn user_stack_top(&self) -> usize;

    /// 用户地址空间的结束地址，不小于它的地址都属于内核
    fn user_space_end(&self) -> usize;

    /// 栈最多能增长到的大小
    fn stack_growth_ceiling(&self) -> usize {
        STACK_GROWTH_CEILING
    }
}

static CONFIG_DATA: AtomicUsize = AtomicUsize::new(0);
static CONFIG_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册配置实现
///
/// # Safety
/// 必须在任何地址空间创建之前调用。重复注册时后一次覆盖前一次。
pub unsafe fn register_config(config: &'static dyn VmConfig) {
    let ptr = config as *const dyn VmConfig;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn VmConfig, (usize, usize)>(ptr) };
    CONFIG_VTABLE.store(vtable, Ordering::Release);
    CONFIG_DATA.store(data, Ordering::Release);
}

/// 获取已注册的配置实现
///
/// # Panics
/// 如果尚未调用 [`register_config`] 注册实现，则 panic
#[inline]
pub fn vm_config() -> &'static dyn VmConfig {
    let data = CONFIG_DATA.load(Ordering::Acquire);
    let vtable = CONFIG_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vm: VmConfig not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn VmConfig>((data, vtable)) }
}
