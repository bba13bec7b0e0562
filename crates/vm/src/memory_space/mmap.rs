//! 文件映射
//!
//! `mmap` 只登记未物化的文件页，内容在首次访问时读入。
//! 映射持有重新打开的独立文件句柄；同一映射的所有页共享该句柄，
//! 句柄的引用计数就是使用者计数，最后一个使用者释放时文件被关闭。

use super::space::{MemorySpace, destroy_page};
use crate::address::{AlignOps, UsizeConvert, Vaddr, Vpn, VpnRange};
use crate::config::vm_config;
use crate::error::{VmError, VmResult};
use crate::file::{FilePage, MmFile};
use crate::page::{Page, PageTarget};
use crate::page_table::PageTable;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

/// 一次 mmap 建立的映射区域
#[derive(Clone)]
pub struct MmapRegion {
    range: VpnRange,
    file: Arc<dyn MmFile>,
    offset: usize,
}

impl MmapRegion {
    /// 起始地址
    pub fn start(&self) -> Vaddr {
        self.range.start().start_addr()
    }

    /// 覆盖的页
    pub fn range(&self) -> VpnRange {
        self.range
    }

    /// 映射的文件起始偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 该页是否由本区域建立且仍映射着本区域的文件句柄
    fn owns(&self, page: &Page) -> bool {
        self.range.contains(page.vpn())
            && page
                .file_backing()
                .is_some_and(|backing| backing.is_backed_by(&self.file))
    }
}

// 手动实现 Debug，因为 dyn MmFile 没有实现 Debug
impl fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmapRegion")
            .field("range", &self.range)
            .field("file", &"<dyn MmFile>")
            .field("offset", &self.offset)
            .finish()
    }
}

impl<PT: PageTable> MemorySpace<PT> {
    /// 将 `file` 从 `offset` 开始的 `length` 字节映射到 `addr`
    ///
    /// 映射覆盖 `ceil(length / PAGE_SIZE)` 页。文件末尾之后的部分读作零，
    /// 也不会被回写。任一页与已登记的页冲突时整个映射失败，
    /// 已登记的页全部撤销。成功时返回 `addr`。
    pub fn mmap(
        &self,
        addr: Vaddr,
        length: usize,
        writable: bool,
        file: &dyn MmFile,
        offset: usize,
    ) -> VmResult<Vaddr> {
        let page_size = vm_config().page_size();
        if addr.is_null() || !addr.is_page_aligned() {
            return Err(VmError::InvalidAddress);
        }
        if length == 0 || offset % page_size != 0 {
            return Err(VmError::InvalidArgument);
        }
        let end = addr.checked_add(length).ok_or(VmError::InvalidAddress)?;
        if end.as_usize() > vm_config().user_space_end() {
            return Err(VmError::InvalidAddress);
        }
        let pages = length.div_ceil(page_size);
        // 最后一页的文件偏移不能溢出
        offset
            .checked_add((pages - 1) * page_size)
            .ok_or(VmError::InvalidArgument)?;

        let file = file.reopen().map_err(VmError::BadFile)?;
        let file_len = file.inode().map_err(VmError::BadFile)?.size();
        let range = VpnRange::new(Vpn::from_addr_floor(addr), pages);

        let mut inner = self.inner.lock();
        for (i, vpn) in range.into_iter().enumerate() {
            let page_offset = offset + i * page_size;
            let read_bytes = page_size.min(file_len.saturating_sub(page_offset));
            let inserted = FilePage::new(
                file.clone(),
                page_offset,
                read_bytes,
                page_size - read_bytes,
            )
            .and_then(|backing| {
                let page = Page::new_uninit(vpn, writable, PageTarget::File(backing), None);
                inner.spt.insert(page)
            });
            if let Err(err) = inserted {
                log::debug!("vm: mmap at {:?} failed at {:?}: {}", addr, vpn, err);
                for added in VpnRange::new(range.start(), i) {
                    inner.spt.take(added);
                }
                return Err(err);
            }
        }
        inner.mmaps.insert(
            range.start(),
            MmapRegion {
                range,
                file,
                offset,
            },
        );
        Ok(addr)
    }

    /// 解除从 `addr` 开始的映射
    ///
    /// `addr` 必须是某次 [`mmap`](Self::mmap) 返回的地址。
    /// 只销毁仍属于该映射的页，驻留且被写过的页回写到文件。
    /// 回写失败时帧仍被归还，返回最后一个错误。
    pub fn munmap(&self, addr: Vaddr) -> VmResult<()> {
        let mut state = self.frames.lock();
        let mut inner = self.inner.lock();
        let start = Vpn::from_addr_floor(addr);
        if !addr.is_page_aligned() {
            return Err(VmError::NotMapped);
        }
        let region = inner.mmaps.remove(&start).ok_or(VmError::NotMapped)?;

        let mut result = Ok(());
        for vpn in region.range {
            // 映射建立后被移除并重新登记的页不属于本区域
            if !inner.spt.get(vpn).is_some_and(|page| region.owns(page)) {
                continue;
            }
            let Some(page) = inner.spt.take(vpn) else {
                continue;
            };
            if let Err(err) = destroy_page(&self.frames, &mut state, &mut inner, page) {
                log::error!("vm: munmap write-back of {:?} failed: {}", vpn, err);
                result = Err(err);
            }
        }
        result
    }

    /// 当前的映射区域，按地址升序
    pub fn mmap_regions(&self) -> Vec<MmapRegion> {
        self.inner.lock().mmaps.values().cloned().collect()
    }
}
