//! 缺页处理
//!
//! 缺页按以下顺序解决：
//! 1. 空地址或内核地址：拒绝
//! 2. 页面存在（保护错误）：拒绝
//! 3. 栈增长：地址没有登记的页，位于栈指针下方一个字以内，
//!    且在栈顶以下 [`VmConfig::stack_growth_ceiling`] 字节之内，
//!    则登记一个匿名页并立即装入
//! 4. 已登记的页：写只读页则拒绝，已驻留则直接返回，否则装入
//! 5. 其余情况：拒绝
//!
//! [`VmConfig::stack_growth_ceiling`]: crate::VmConfig::stack_growth_ceiling

use super::space::{MemorySpace, claim};
use crate::address::{UsizeConvert, Vaddr, Vpn};
use crate::config::{WORD_SIZE, vm_config};
use crate::error::{VmError, VmResult};
use crate::page::{Page, PageTarget};
use crate::page_table::PageTable;
use bitflags::bitflags;

bitflags! {
    /// 缺页原因
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultCause: u8 {
        /// 用户态访问
        const USER = 1 << 0;
        /// 写访问
        const WRITE = 1 << 1;
        /// 页不存在（否则为保护错误）
        const NOT_PRESENT = 1 << 2;
    }
}

/// 一次缺页
#[derive(Debug, Clone, Copy)]
pub struct PageFault {
    /// 触发缺页的地址
    pub addr: Vaddr,
    /// 缺页原因
    pub cause: FaultCause,
    /// 陷入时的栈指针，内核态缺页时为内核地址
    pub sp: Vaddr,
}

impl PageFault {
    /// 内核代表用户访问用户内存时产生的缺页
    ///
    /// 栈指针取内核地址，栈增长判断改用陷入时记录的用户栈指针。
    pub(crate) fn kernel(addr: Vaddr, write: bool) -> Self {
        let mut cause = FaultCause::NOT_PRESENT;
        if write {
            cause |= FaultCause::WRITE;
        }
        Self {
            addr,
            cause,
            sp: Vaddr::from_usize(usize::MAX),
        }
    }
}

/// 缺页无法解决时进程的退出码
pub const FAULT_EXIT_STATUS: i32 = -1;

/// 缺页所在的任务
pub trait FaultTask {
    /// 以 `status` 终止任务
    fn exit(&self, status: i32);
}

/// 地址是否属于合法的栈增长
fn is_stack_growth(addr: Vaddr, sp: Option<Vaddr>) -> bool {
    let Some(sp) = sp else {
        return false;
    };
    let config = vm_config();
    let top = config.user_stack_top();
    let floor = top.saturating_sub(config.stack_growth_ceiling());
    let addr = addr.as_usize();
    addr >= sp.as_usize().saturating_sub(WORD_SIZE) && addr >= floor && addr < top
}

impl<PT: PageTable> MemorySpace<PT> {
    /// 解决一次缺页
    ///
    /// 成功时引发缺页的访问可以重新执行。
    pub fn handle_fault(&self, fault: &PageFault) -> VmResult<()> {
        let addr = fault.addr;
        if addr.is_null() || !addr.is_user() {
            return Err(VmError::InvalidAddress);
        }
        if !fault.cause.contains(FaultCause::NOT_PRESENT) {
            return Err(VmError::AccessViolation);
        }

        let mut state = self.frames.lock();
        let mut inner = self.inner.lock();
        let vpn = Vpn::from_addr_floor(addr);
        let id = self.id();

        if !inner.spt.contains(vpn) {
            let sp = if fault.sp.is_user() {
                Some(fault.sp)
            } else {
                inner.user_sp
            };
            if !is_stack_growth(addr, sp) {
                log::debug!("vm: unmapped access at {:?} (sp {:?})", addr, sp);
                return Err(VmError::AccessViolation);
            }
            log::trace!("vm: growing stack to {:?}", vpn);
            inner
                .spt
                .insert(Page::new_uninit(vpn, true, PageTarget::Anon, None))?;
            let result = claim(&self.frames, &mut state, id, &mut inner, vpn);
            if result.is_err() {
                inner.spt.take(vpn);
            }
            return result;
        }

        let Some(page) = inner.spt.get(vpn) else {
            return Err(VmError::AccessViolation);
        };
        if fault.cause.contains(FaultCause::WRITE) && !page.writable() {
            return Err(VmError::AccessViolation);
        }
        if page.is_resident() {
            return Ok(());
        }
        claim(&self.frames, &mut state, id, &mut inner, vpn)
    }
}

/// 处理用户态缺页，无法解决时以 [`FAULT_EXIT_STATUS`] 终止任务
///
/// 返回缺页是否已解决。
pub fn handle_user_fault<PT: PageTable>(
    space: &MemorySpace<PT>,
    fault: &PageFault,
    task: &dyn FaultTask,
) -> bool {
    match space.handle_fault(fault) {
        Ok(()) => true,
        Err(err) => {
            log::warn!(
                "vm: unresolved fault at {:?} ({:?}): {}",
                fault.addr,
                fault.cause,
                err
            );
            task.exit(FAULT_EXIT_STATUS);
            false
        }
    }
}
