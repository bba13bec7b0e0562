//! 内核访问用户内存
//!
//! 系统调用在访问用户缓冲区前校验地址，复制时按需装入页面。

use super::fault::PageFault;
use super::space::MemorySpace;
use crate::address::{AlignOps, Vaddr, Vpn};
use crate::arch_ops::frame_bytes;
use crate::config::vm_config;
use crate::error::{VmError, VmResult};
use crate::page_table::{PageTable, PteFlags};

impl<PT: PageTable> MemorySpace<PT> {
    /// 校验用户指针：非空、位于用户空间、且已登记或已映射
    pub fn check_user_addr(&self, addr: Vaddr) -> VmResult<()> {
        if addr.is_null() || !addr.is_user() {
            return Err(VmError::InvalidAddress);
        }
        let vpn = Vpn::from_addr_floor(addr);
        let inner = self.inner.lock();
        if inner.spt.contains(vpn) || inner.page_table.query(vpn).is_some() {
            Ok(())
        } else {
            Err(VmError::InvalidAddress)
        }
    }

    /// 从用户内存复制到 `buf`，按需装入页面
    pub fn copy_from_user(&self, addr: Vaddr, buf: &mut [u8]) -> VmResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let va = addr.checked_add(done).ok_or(VmError::InvalidAddress)?;
            let offset = va.page_offset();
            let len = (vm_config().page_size() - offset).min(buf.len() - done);
            let dst = &mut buf[done..done + len];
            self.access_page(va, false, |frame| {
                dst.copy_from_slice(&frame[offset..offset + len])
            })?;
            done += len;
        }
        Ok(())
    }

    /// 将 `bytes` 复制到用户内存，按需装入页面并置 DIRTY 位
    pub fn copy_to_user(&self, addr: Vaddr, bytes: &[u8]) -> VmResult<()> {
        let mut done = 0;
        while done < bytes.len() {
            let va = addr.checked_add(done).ok_or(VmError::InvalidAddress)?;
            let offset = va.page_offset();
            let len = (vm_config().page_size() - offset).min(bytes.len() - done);
            let src = &bytes[done..done + len];
            self.access_page(va, true, |frame| {
                frame[offset..offset + len].copy_from_slice(src)
            })?;
            done += len;
        }
        Ok(())
    }

    /// 在帧驻留期间对包含 `va` 的页执行 `f`，不驻留时先解决缺页
    fn access_page(&self, va: Vaddr, write: bool, f: impl FnOnce(&mut [u8])) -> VmResult<()> {
        if va.is_null() || !va.is_user() {
            return Err(VmError::InvalidAddress);
        }
        let vpn = Vpn::from_addr_floor(va);
        loop {
            {
                let _state = self.frames.lock();
                let mut inner = self.inner.lock();
                if let Some((paddr, flags)) = inner.page_table.query(vpn) {
                    if write && !flags.contains(PteFlags::WRITABLE) {
                        return Err(VmError::AccessViolation);
                    }
                    // SAFETY: 持有帧子系统锁，帧不会被淘汰
                    f(unsafe { frame_bytes(paddr) });
                    if write {
                        inner.page_table.set_dirty(vpn, true);
                    }
                    return Ok(());
                }
            }
            self.handle_fault(&PageFault::kernel(va, write))?;
        }
    }
}
