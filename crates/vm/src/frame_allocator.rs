//! 帧子系统
//!
//! 本模块管理用户页使用的物理帧，并在物理页耗尽时换出页面腾出帧。
//!
//! ## 帧表
//!
//! [`FrameTable`] 按获取顺序记录每个驻留帧及其所有者（地址空间 + 页号）：
//!
//! - 新获取的帧追加到队尾
//! - 牺牲帧从队首开始选择第一个未固定（pinned）的帧，即 FIFO
//! - 被复用的帧重新追加到队尾
//!
//! 所有者只是一个 `(SpaceId, Vpn)` 标识，不持有地址空间的引用，
//! 换出时通过地址空间登记表（弱引用）找到所有者。
//!
//! ## 锁
//!
//! 帧表、登记表和淘汰计数都位于同一把锁之后（帧子系统锁）。
//! 取得帧子系统锁之后才能获取地址空间锁；换出其他地址空间的页时
//! 会在持有帧子系统锁的情况下再获取该地址空间的锁。

use crate::address::Paddr;
use crate::address::Vpn;
use crate::arch_ops::frame_bytes;
use crate::memory_space::SpaceInner;
use crate::page_table::PageTable;
use crate::swap::SwapDevice;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::{SpinLock, SpinLockGuard};

/// 物理页池
///
/// 内核的物理页分配器，按页交出和回收物理帧。
pub trait PhysPool: Send + Sync {
    /// 取出一个清零的物理页，耗尽时返回 None
    fn acquire_zeroed(&self) -> Option<Paddr>;

    /// 归还一个物理页
    fn release(&self, paddr: Paddr);
}

/// 地址空间标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(usize);

/// 帧的所有者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    /// 所属地址空间
    pub space: SpaceId,
    /// 映射到的虚拟页
    pub vpn: Vpn,
}

/// 帧表项
#[derive(Debug)]
pub(crate) struct Frame {
    paddr: Paddr,
    /// 正在装入内容的帧还没有所有者，不参与淘汰
    owner: Option<FrameOwner>,
    pinned: bool,
}

/// 驻留帧的 FIFO 队列
#[derive(Debug, Default)]
pub(crate) struct FrameTable {
    frames: VecDeque<Frame>,
    evictions: usize,
}

impl FrameTable {
    fn position(&self, paddr: Paddr) -> Option<usize> {
        self.frames.iter().position(|frame| frame.paddr == paddr)
    }

    fn push(&mut self, paddr: Paddr) {
        debug_assert!(self.position(paddr).is_none());
        self.frames.push_back(Frame {
            paddr,
            owner: None,
            pinned: false,
        });
    }

    fn remove(&mut self, paddr: Paddr) -> Option<Frame> {
        let idx = self.position(paddr)?;
        self.frames.remove(idx)
    }

    /// 记录帧的所有者
    pub(crate) fn attach(&mut self, paddr: Paddr, owner: FrameOwner) {
        match self.position(paddr) {
            Some(idx) => self.frames[idx].owner = Some(owner),
            None => log::error!("vm: attach to untracked frame {:?}", paddr),
        }
    }

    /// 固定或解除固定，固定的帧不会被选为牺牲帧
    pub(crate) fn set_pinned(&mut self, paddr: Paddr, pinned: bool) {
        if let Some(idx) = self.position(paddr) {
            self.frames[idx].pinned = pinned;
        }
    }

    /// 从队首取出第一个有所有者且未固定的帧
    fn pick_victim(&mut self) -> Option<Frame> {
        let idx = self
            .frames
            .iter()
            .position(|frame| frame.owner.is_some() && !frame.pinned)?;
        self.frames.remove(idx)
    }

    fn len(&self) -> usize {
        self.frames.len()
    }
}

/// 帧子系统锁保护的状态
pub(crate) struct FrameState<PT: PageTable> {
    pub(crate) table: FrameTable,
    /// 地址空间登记表，用于找到牺牲帧的所有者
    spaces: BTreeMap<SpaceId, Weak<SpinLock<SpaceInner<PT>>>>,
}

/// 当前临界区已持有锁的地址空间，换出其中的页时不再重复加锁
pub(crate) type HeldSpace<'a, PT> = (SpaceId, &'a mut SpaceInner<PT>);

/// 帧子系统统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// 驻留帧数
    pub resident: usize,
    /// 累计淘汰次数
    pub evictions: usize,
}

/// 帧子系统
///
/// 内核启动时创建一个实例，所有地址空间共享。
pub struct FrameAllocator<PT: PageTable> {
    state: SpinLock<FrameState<PT>>,
    pool: Arc<dyn PhysPool>,
    swap: Arc<dyn SwapDevice>,
    next_space: AtomicUsize,
}

impl<PT: PageTable> FrameAllocator<PT> {
    /// 创建帧子系统
    pub fn new(pool: Arc<dyn PhysPool>, swap: Arc<dyn SwapDevice>) -> Arc<Self> {
        Arc::new(Self {
            state: SpinLock::new(FrameState {
                table: FrameTable::default(),
                spaces: BTreeMap::new(),
            }),
            pool,
            swap,
            next_space: AtomicUsize::new(1),
        })
    }

    pub(crate) fn lock(&self) -> SpinLockGuard<'_, FrameState<PT>> {
        self.state.lock()
    }

    pub(crate) fn swap(&self) -> &dyn SwapDevice {
        &*self.swap
    }

    /// 登记一个地址空间，返回它的标识
    pub(crate) fn register(&self, space: &Arc<SpinLock<SpaceInner<PT>>>) -> SpaceId {
        let id = SpaceId(self.next_space.fetch_add(1, Ordering::Relaxed));
        self.lock().spaces.insert(id, Arc::downgrade(space));
        id
    }

    /// 注销地址空间。调用者必须已释放它的所有帧
    pub(crate) fn unregister(&self, id: SpaceId) {
        self.lock().spaces.remove(&id);
    }

    /// 获取一个清零的帧，追加到帧表队尾，所有者为空
    ///
    /// 物理页池为空时按 FIFO 淘汰一个驻留帧。
    /// `held` 列出调用者已经锁住的地址空间。
    ///
    /// # Panics
    /// 没有可淘汰的帧，或换出时后备存储写入失败
    pub(crate) fn acquire(
        &self,
        state: &mut FrameState<PT>,
        held: &mut [HeldSpace<'_, PT>],
    ) -> Paddr {
        if let Some(paddr) = self.pool.acquire_zeroed() {
            state.table.push(paddr);
            return paddr;
        }

        let Some(victim) = state.table.pick_victim() else {
            panic!("vm: out of physical frames and no frame can be evicted");
        };
        self.evict(state, &victim, held);
        state.table.evictions += 1;

        // SAFETY: 牺牲帧已从所有者的页表中移除，没有其他引用
        unsafe { frame_bytes(victim.paddr) }.fill(0);
        state.table.push(victim.paddr);
        victim.paddr
    }

    fn evict(&self, state: &FrameState<PT>, victim: &Frame, held: &mut [HeldSpace<'_, PT>]) {
        let Some(owner) = victim.owner else {
            return;
        };
        log::debug!("vm: evicting {:?} of space {:?}", owner.vpn, owner.space);

        if let Some((_, inner)) = held.iter_mut().find(|(id, _)| *id == owner.space) {
            inner.evict_page(owner.vpn, victim.paddr, self.swap());
            return;
        }
        match state.spaces.get(&owner.space).and_then(Weak::upgrade) {
            Some(space) => space
                .lock()
                .evict_page(owner.vpn, victim.paddr, self.swap()),
            None => log::warn!(
                "vm: frame {:?} owned by vanished space {:?}",
                victim.paddr,
                owner.space
            ),
        }
    }

    /// 将帧从帧表移除并归还物理页池
    pub(crate) fn release(&self, state: &mut FrameState<PT>, paddr: Paddr) {
        if state.table.remove(paddr).is_none() {
            log::warn!("vm: releasing untracked frame {:?}", paddr);
        }
        self.pool.release(paddr);
    }

    /// 统计信息
    pub fn stats(&self) -> FrameStats {
        let state = self.lock();
        FrameStats {
            resident: state.table.len(),
            evictions: state.table.evictions,
        }
    }

    /// 关闭帧子系统，将剩余的帧全部归还物理页池
    ///
    /// 应在所有地址空间销毁后调用。
    pub fn shutdown(&self) {
        let mut state = self.lock();
        let alive = state
            .spaces
            .values()
            .filter(|space| space.strong_count() > 0)
            .count();
        if alive > 0 {
            log::warn!("vm: shutdown with {} live address spaces", alive);
        }
        while let Some(frame) = state.table.frames.pop_front() {
            self.pool.release(frame.paddr);
        }
        state.spaces.clear();
    }
}
