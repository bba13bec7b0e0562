//! 用户地址空间

use super::mmap::MmapRegion;
use crate::address::{Paddr, Vaddr, Vpn};
use crate::arch_ops::frame_bytes;
use crate::error::{VmError, VmResult};
use crate::frame_allocator::{FrameAllocator, FrameOwner, FrameState, SpaceId};
use crate::page::{Initializer, Page, PageKind, PageTarget, PageType};
use crate::page_table::{PageTable, PteFlags};
use crate::spt::SupplementalPageTable;
use crate::swap::{SwapDevice, SwapSlot};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use sync::SpinLock;

/// 地址空间锁保护的状态
pub(crate) struct SpaceInner<PT: PageTable> {
    pub(crate) spt: SupplementalPageTable,
    pub(crate) page_table: PT,
    /// 最近一次从用户态陷入时的栈指针
    pub(crate) user_sp: Option<Vaddr>,
    /// 以起始页号为键的文件映射区域
    pub(crate) mmaps: BTreeMap<Vpn, MmapRegion>,
}

impl<PT: PageTable> SpaceInner<PT> {
    /// 换出 `vpn` 处驻留在 `paddr` 的页，清除其映射
    ///
    /// 调用者持有帧子系统锁，`paddr` 已从帧表中取出。
    pub(crate) fn evict_page(&mut self, vpn: Vpn, paddr: Paddr, swap: &dyn SwapDevice) {
        let dirty = self.page_table.is_dirty(vpn);
        self.page_table.unmap(vpn);
        let Some(page) = self.spt.get_mut(vpn) else {
            log::error!("vm: evicted frame {:?} has no page at {:?}", paddr, vpn);
            return;
        };
        debug_assert_eq!(page.frame(), Some(paddr));
        // SAFETY: 映射已清除，帧子系统锁保证没有其他访问者
        let frame = unsafe { frame_bytes(paddr) };
        page.evict(frame, dirty, swap);
        page.detach();
    }
}

/// 为 `vpn` 处的页获取帧、装入内容并安装映射
///
/// 失败时帧被归还，页保持原状态。
pub(super) fn claim<PT: PageTable>(
    frames: &FrameAllocator<PT>,
    state: &mut FrameState<PT>,
    id: SpaceId,
    inner: &mut SpaceInner<PT>,
    vpn: Vpn,
) -> VmResult<()> {
    let paddr = frames.acquire(state, &mut [(id, &mut *inner)]);
    let Some(page) = inner.spt.get_mut(vpn) else {
        frames.release(state, paddr);
        return Err(VmError::NotMapped);
    };

    // SAFETY: 帧刚被获取，尚未映射到任何地址空间
    let bytes = unsafe { frame_bytes(paddr) };
    if let Err(err) = page.populate(bytes, frames.swap()) {
        log::warn!("vm: failed to load {:?}: {}", vpn, err);
        frames.release(state, paddr);
        return Err(err);
    }
    page.attach(paddr);
    let flags = PteFlags::user_page(page.writable());
    inner.page_table.install(vpn, paddr, flags);
    state.table.attach(paddr, FrameOwner { space: id, vpn });
    Ok(())
}

/// 销毁一个已从补充页表中取出的页
///
/// 驻留的页先回写（脏的文件页），再清除映射并归还帧。
/// 回写失败时帧仍被归还，错误返回给调用者。
pub(super) fn destroy_page<PT: PageTable>(
    frames: &FrameAllocator<PT>,
    state: &mut FrameState<PT>,
    inner: &mut SpaceInner<PT>,
    mut page: Page,
) -> VmResult<()> {
    let vpn = page.vpn();
    match page.detach() {
        Some(paddr) => {
            let dirty = inner.page_table.is_dirty(vpn);
            inner.page_table.unmap(vpn);
            // SAFETY: 映射已清除，帧子系统锁保证没有其他访问者
            let bytes = unsafe { frame_bytes(paddr) };
            let result = page.destroy(Some((&*bytes, dirty)), frames.swap());
            frames.release(state, paddr);
            result
        }
        None => page.destroy(None, frames.swap()),
    }
}

/// fork 时子进程页内容的来源
enum CopySource {
    Frame(Paddr),
    Swap(SwapSlot),
}

/// 用户地址空间
///
/// 持有补充页表和硬件页表。`Drop` 时销毁所有页并注销。
pub struct MemorySpace<PT: PageTable> {
    id: SpaceId,
    pub(super) frames: Arc<FrameAllocator<PT>>,
    pub(super) inner: Arc<SpinLock<SpaceInner<PT>>>,
}

impl<PT: PageTable> MemorySpace<PT> {
    /// 创建空的地址空间并向帧子系统登记
    pub fn new(frames: &Arc<FrameAllocator<PT>>) -> Self {
        let inner = Arc::new(SpinLock::new(SpaceInner {
            spt: SupplementalPageTable::new(),
            page_table: PT::new(),
            user_sp: None,
            mmaps: BTreeMap::new(),
        }));
        let id = frames.register(&inner);
        Self {
            id,
            frames: frames.clone(),
            inner,
        }
    }

    /// 地址空间标识
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// 根页表的物理地址
    pub fn root(&self) -> Paddr {
        self.inner.lock().page_table.root()
    }

    /// 登记一个未物化的页，首次访问时按 `target` 装入内容并运行 `init`
    ///
    /// 地址向下取整到页边界。该页已登记时返回 [`VmError::AlreadyMapped`]。
    pub fn alloc_page_with_initializer(
        &self,
        target: PageTarget,
        addr: Vaddr,
        writable: bool,
        init: Option<Initializer>,
    ) -> VmResult<()> {
        if addr.is_null() || !addr.is_user() {
            return Err(VmError::InvalidAddress);
        }
        let vpn = Vpn::from_addr_floor(addr);
        let page = Page::new_uninit(vpn, writable, target, init);
        self.inner.lock().spt.insert(page)
    }

    /// 登记一个没有初始化函数的未物化页
    pub fn alloc_page(&self, target: PageTarget, addr: Vaddr, writable: bool) -> VmResult<()> {
        self.alloc_page_with_initializer(target, addr, writable, None)
    }

    /// 立即为已登记的页装入内容。已驻留时什么也不做
    pub fn claim_page(&self, addr: Vaddr) -> VmResult<()> {
        let mut state = self.frames.lock();
        let mut inner = self.inner.lock();
        let vpn = Vpn::from_addr_floor(addr);
        let resident = inner.spt.get(vpn).ok_or(VmError::NotMapped)?.is_resident();
        if resident {
            return Ok(());
        }
        claim(&self.frames, &mut state, self.id, &mut inner, vpn)
    }

    /// 移除一个页：回写脏的文件页，归还帧和交换槽位
    pub fn remove_page(&self, addr: Vaddr) -> VmResult<()> {
        let mut state = self.frames.lock();
        let mut inner = self.inner.lock();
        let vpn = Vpn::from_addr_floor(addr);
        let page = inner.spt.take(vpn).ok_or(VmError::NotMapped)?;
        destroy_page(&self.frames, &mut state, &mut inner, page)
    }

    /// 包含该地址的页的类型，未登记时返回 None
    pub fn page_type(&self, addr: Vaddr) -> Option<PageType> {
        self.inner.lock().spt.find(addr).map(Page::page_type)
    }

    /// 在锁内检查补充页表
    pub fn with_spt<R>(&self, f: impl FnOnce(&SupplementalPageTable) -> R) -> R {
        f(&self.inner.lock().spt)
    }

    /// 已登记的页数
    pub fn page_count(&self) -> usize {
        self.inner.lock().spt.len()
    }

    /// 通过硬件页表翻译地址，未驻留时返回 None
    pub fn translate(&self, addr: Vaddr) -> Option<Paddr> {
        self.inner.lock().page_table.translate(addr)
    }

    /// 包含该地址的页的页表项标志，未驻留时返回 None
    pub fn pte_flags(&self, addr: Vaddr) -> Option<PteFlags> {
        self.inner
            .lock()
            .page_table
            .query(Vpn::from_addr_floor(addr))
            .map(|(_, flags)| flags)
    }

    /// 包含该地址的页是否驻留且被写过
    pub fn is_dirty(&self, addr: Vaddr) -> bool {
        self.inner
            .lock()
            .page_table
            .is_dirty(Vpn::from_addr_floor(addr))
    }

    /// 记录从用户态陷入时的栈指针，供内核态缺页判断栈增长
    pub fn record_user_sp(&self, sp: Vaddr) {
        self.inner.lock().user_sp = Some(sp);
    }

    /// 最近记录的用户栈指针
    pub fn user_sp(&self) -> Option<Vaddr> {
        self.inner.lock().user_sp
    }

    /// 复制 `src` 的所有页到本地址空间（fork）
    ///
    /// - 未物化的页只复制元数据，子进程首次访问时独立物化
    /// - 驻留的页复制到新帧，并保留 DIRTY 位
    /// - 已换出的匿名页从交换槽位读入新帧，父进程的槽位保持不变
    /// - 未驻留的文件页只复制元数据
    ///
    /// 完成后两个地址空间互不影响。失败时本地址空间可能只复制了一部分，
    /// 由调用者销毁。
    pub fn copy_from(&self, src: &MemorySpace<PT>) -> VmResult<()> {
        if self.id == src.id || !Arc::ptr_eq(&self.frames, &src.frames) {
            return Err(VmError::InvalidArgument);
        }
        let mut state = self.frames.lock();
        let mut parent = src.inner.lock();
        let mut child = self.inner.lock();
        let swap = self.frames.swap();

        child.user_sp = parent.user_sp;
        for vpn in parent.spt.vpns() {
            let Some(page) = parent.spt.get(vpn) else {
                continue;
            };
            let writable = page.writable();
            let source = match (page.kind(), page.frame()) {
                (PageKind::Uninit(_), _) => None,
                (_, Some(paddr)) => Some(CopySource::Frame(paddr)),
                (PageKind::Anon(anon), None) => anon.swap_slot().map(CopySource::Swap),
                (PageKind::File(_), None) => None,
            };
            child.spt.insert(page.fork_metadata())?;
            let Some(source) = source else {
                continue;
            };

            let (paddr, dirty) = match source {
                CopySource::Frame(src_paddr) => {
                    state.table.set_pinned(src_paddr, true);
                    let paddr = self.frames.acquire(
                        &mut state,
                        &mut [(src.id, &mut *parent), (self.id, &mut *child)],
                    );
                    state.table.set_pinned(src_paddr, false);
                    // SAFETY: 两个帧互不相同，源帧固定期间不会被淘汰
                    unsafe { frame_bytes(paddr).copy_from_slice(frame_bytes(src_paddr)) };
                    (paddr, parent.page_table.is_dirty(vpn))
                }
                CopySource::Swap(slot) => {
                    let paddr = self.frames.acquire(
                        &mut state,
                        &mut [(src.id, &mut *parent), (self.id, &mut *child)],
                    );
                    // SAFETY: 帧刚被获取，尚未映射
                    if let Err(err) = swap.read(slot, unsafe { frame_bytes(paddr) }) {
                        self.frames.release(&mut state, paddr);
                        return Err(VmError::Io(err));
                    }
                    (paddr, false)
                }
            };

            if let Some(page) = child.spt.get_mut(vpn) {
                page.attach(paddr);
            }
            child
                .page_table
                .install(vpn, paddr, PteFlags::user_page(writable));
            if dirty {
                child.page_table.set_dirty(vpn, true);
            }
            state.table.attach(paddr, FrameOwner { space: self.id, vpn });
        }

        for (start, region) in parent.mmaps.iter() {
            child.mmaps.insert(*start, region.clone());
        }
        Ok(())
    }

    /// 创建一个内容相同的新地址空间
    pub fn fork(&self) -> VmResult<MemorySpace<PT>> {
        let child = MemorySpace::new(&self.frames);
        child.copy_from(self)?;
        Ok(child)
    }

    /// 销毁所有页：回写脏的文件页，归还所有帧和交换槽位，关闭映射的文件
    ///
    /// 之后补充页表为空，地址空间仍可继续使用。
    pub fn teardown(&self) {
        let mut state = self.frames.lock();
        let mut inner = self.inner.lock();
        for vpn in inner.spt.vpns() {
            let Some(page) = inner.spt.take(vpn) else {
                continue;
            };
            if let Err(err) = destroy_page(&self.frames, &mut state, &mut inner, page) {
                log::error!("vm: teardown of {:?} failed: {}", vpn, err);
            }
        }
        inner.mmaps.clear();
    }
}

impl<PT: PageTable> Drop for MemorySpace<PT> {
    fn drop(&mut self) {
        self.teardown();
        self.frames.unregister(self.id);
    }
}
