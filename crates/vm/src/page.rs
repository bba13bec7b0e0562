//! 用户虚拟页
//!
//! 每个页处于三种状态之一：
//! - [`PageKind::Uninit`]：尚未物化，记录目标类型和可选的初始化函数
//! - [`PageKind::Anon`]：匿名页，换出到交换设备
//! - [`PageKind::File`]：文件页，换出时回写脏数据
//!
//! 页与帧的关联只保存物理地址，帧的所有权由帧表记录。

use crate::address::{Paddr, Vaddr, Vpn};
use crate::anon::AnonPage;
use crate::error::VmResult;
use crate::file::FilePage;
use crate::swap::SwapDevice;
use alloc::sync::Arc;
use core::fmt;

/// 物化时在页内容装入之后运行的初始化函数
///
/// 参数为页号和页内容；返回错误表示物化失败。
pub type Initializer = Arc<dyn Fn(Vpn, &mut [u8]) -> VmResult<()> + Send + Sync>;

/// 物化后的页类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmType {
    /// 匿名页
    Anon,
    /// 文件页
    File,
}

/// 页的当前类型，未物化的页报告其目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// 尚未物化
    Uninit(VmType),
    /// 匿名页
    Anon,
    /// 文件页
    File,
}

/// 未物化页将要成为的页
#[derive(Clone, Debug)]
pub enum PageTarget {
    /// 物化为清零的匿名页
    Anon,
    /// 物化为文件页
    File(FilePage),
}

/// 未物化的页
#[derive(Clone)]
pub struct UninitPage {
    target: PageTarget,
    init: Option<Initializer>,
}

impl UninitPage {
    /// 目标类型
    pub fn target(&self) -> VmType {
        match self.target {
            PageTarget::Anon => VmType::Anon,
            PageTarget::File(_) => VmType::File,
        }
    }

    /// 装入内容并运行初始化函数，成功时返回物化后的页类型
    fn materialize(&self, vpn: Vpn, frame: &mut [u8]) -> VmResult<PageKind> {
        let kind = match &self.target {
            PageTarget::Anon => {
                frame.fill(0);
                PageKind::Anon(AnonPage::default())
            }
            PageTarget::File(file) => {
                file.populate(frame)?;
                PageKind::File(file.clone())
            }
        };
        if let Some(init) = &self.init {
            init(vpn, frame)?;
        }
        Ok(kind)
    }
}

impl fmt::Debug for UninitPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UninitPage")
            .field("target", &self.target)
            .field("init", &self.init.as_ref().map(|_| "<initializer>"))
            .finish()
    }
}

/// 页的类型相关数据
#[derive(Debug)]
pub enum PageKind {
    /// 尚未物化
    Uninit(UninitPage),
    /// 匿名页
    Anon(AnonPage),
    /// 文件页
    File(FilePage),
}

/// 一个用户虚拟页的元数据
#[derive(Debug)]
pub struct Page {
    vpn: Vpn,
    writable: bool,
    kind: PageKind,
    /// 驻留时所在的物理帧
    frame: Option<Paddr>,
}

impl Page {
    /// 创建未物化的页
    pub(crate) fn new_uninit(
        vpn: Vpn,
        writable: bool,
        target: PageTarget,
        init: Option<Initializer>,
    ) -> Self {
        Self {
            vpn,
            writable,
            kind: PageKind::Uninit(UninitPage { target, init }),
            frame: None,
        }
    }

    /// 页号
    pub fn vpn(&self) -> Vpn {
        self.vpn
    }

    /// 页的起始地址
    pub fn va(&self) -> Vaddr {
        self.vpn.start_addr()
    }

    /// 是否可写
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// 类型相关数据
    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    /// 当前类型
    pub fn page_type(&self) -> PageType {
        match &self.kind {
            PageKind::Uninit(uninit) => PageType::Uninit(uninit.target()),
            PageKind::Anon(_) => PageType::Anon,
            PageKind::File(_) => PageType::File,
        }
    }

    /// 文件页或将要成为文件页的未物化页的后备信息
    pub(crate) fn file_backing(&self) -> Option<&FilePage> {
        match &self.kind {
            PageKind::File(file) => Some(file),
            PageKind::Uninit(UninitPage {
                target: PageTarget::File(file),
                ..
            }) => Some(file),
            _ => None,
        }
    }

    /// 驻留时所在的物理帧
    pub fn frame(&self) -> Option<Paddr> {
        self.frame
    }

    /// 是否驻留
    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }

    pub(crate) fn attach(&mut self, paddr: Paddr) {
        debug_assert!(self.frame.is_none(), "page {:?} already resident", self.vpn);
        self.frame = Some(paddr);
    }

    pub(crate) fn detach(&mut self) -> Option<Paddr> {
        self.frame.take()
    }

    /// 将页内容装入帧
    ///
    /// 未物化的页在此物化；只有装入和初始化都成功后才改变类型，
    /// 失败时页保持未物化，可以再次尝试。
    pub(crate) fn populate(&mut self, frame: &mut [u8], swap: &dyn SwapDevice) -> VmResult<()> {
        let vpn = self.vpn;
        match &mut self.kind {
            PageKind::Anon(anon) => anon.populate(frame, swap),
            PageKind::File(file) => file.populate(frame),
            PageKind::Uninit(uninit) => {
                let kind = uninit.materialize(vpn, frame)?;
                self.kind = kind;
                Ok(())
            }
        }
    }

    /// 将驻留的内容写到后备存储，调用后帧可以被复用
    ///
    /// # Panics
    /// 后备存储写入失败时 panic
    pub(crate) fn evict(&mut self, frame: &[u8], dirty: bool, swap: &dyn SwapDevice) {
        match &mut self.kind {
            PageKind::Anon(anon) => anon.evict(frame, swap),
            PageKind::File(file) => {
                if !dirty {
                    return;
                }
                if let Err(err) = file.write_back(frame) {
                    panic!("vm: write-back of {:?} failed: {}", self.vpn, err);
                }
            }
            PageKind::Uninit(_) => panic!("vm: uninitialized page {:?} holds a frame", self.vpn),
        }
    }

    /// 销毁页：回写脏的文件页，释放交换槽位
    ///
    /// `resident` 为驻留时的帧内容和 DIRTY 位。帧本身由调用者释放。
    pub(crate) fn destroy(
        &mut self,
        resident: Option<(&[u8], bool)>,
        swap: &dyn SwapDevice,
    ) -> VmResult<()> {
        match &mut self.kind {
            PageKind::File(file) => match resident {
                Some((frame, true)) => file.write_back(frame),
                _ => Ok(()),
            },
            PageKind::Anon(anon) => {
                anon.destroy(swap);
                Ok(())
            }
            PageKind::Uninit(_) => Ok(()),
        }
    }

    /// 复制元数据给子进程的地址空间
    ///
    /// 匿名页的内容由调用者另行复制；未物化的页共享初始化函数。
    pub(crate) fn fork_metadata(&self) -> Self {
        let kind = match &self.kind {
            PageKind::Uninit(uninit) => PageKind::Uninit(uninit.clone()),
            PageKind::Anon(_) => PageKind::Anon(AnonPage::default()),
            PageKind::File(file) => PageKind::File(file.clone()),
        };
        Self {
            vpn: self.vpn,
            writable: self.writable,
            kind,
            frame: None,
        }
    }
}
