//! 内存空间模块
//!
//! 每个用户进程拥有一个 [`MemorySpace`]，包含补充页表、硬件页表、
//! 文件映射区域以及最近一次从用户态陷入时的栈指针。

mod fault;
mod mmap;
mod space;
mod uaccess;

pub use fault::{FAULT_EXIT_STATUS, FaultCause, FaultTask, PageFault, handle_user_fault};
pub use mmap::MmapRegion;
pub use space::MemorySpace;

pub(crate) use space::SpaceInner;
