//! Mock 实现模块
//!
//! 提供架构、物理内存、页表、文件、swap 设备和任务的 Mock 实现

pub mod arch;
pub mod fs;
pub mod mm;
pub mod swap;
pub mod task;
