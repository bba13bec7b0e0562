//! 文件映射接口与文件页
//!
//! 文件页在缺页时从文件读入，被换出或解除映射时
//! 只有 DIRTY 位置位才回写，且只回写 `read_bytes` 字节。

use crate::error::{EIO, VmError, VmResult};
use alloc::sync::Arc;
use core::fmt;

/// 可用于内存映射读写的 Inode 接口
pub trait MmInode: Send + Sync {
    /// 从指定偏移读取数据到缓冲区，返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 将缓冲区数据写入指定偏移，返回实际写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;

    /// 文件长度（字节）
    fn size(&self) -> usize;
}

/// 可映射到内存的文件接口
pub trait MmFile: Send + Sync {
    /// 获取底层 Inode 用于读写操作
    fn inode(&self) -> Result<Arc<dyn MmInode>, isize>;

    /// 打开一个指向同一文件的独立句柄
    ///
    /// 映射持有独立句柄，调用者关闭原句柄后映射依然有效。
    fn reopen(&self) -> Result<Arc<dyn MmFile>, isize>;
}

/// 文件页的后备信息
#[derive(Clone)]
pub struct FilePage {
    file: Arc<dyn MmFile>,
    offset: usize,
    read_bytes: usize,
    zero_bytes: usize,
}

impl FilePage {
    /// 创建文件页信息
    ///
    /// `read_bytes + zero_bytes` 不等于页大小时返回 [`VmError::InvalidArgument`]。
    pub fn new(
        file: Arc<dyn MmFile>,
        offset: usize,
        read_bytes: usize,
        zero_bytes: usize,
    ) -> VmResult<Self> {
        if read_bytes.checked_add(zero_bytes) != Some(crate::vm_config().page_size()) {
            return Err(VmError::InvalidArgument);
        }
        Ok(Self {
            file,
            offset,
            read_bytes,
            zero_bytes,
        })
    }

    /// 文件内偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 从文件读入的字节数
    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }

    /// 页尾补零的字节数
    pub fn zero_bytes(&self) -> usize {
        self.zero_bytes
    }

    /// 共享同一文件句柄的使用者数量
    pub fn users(&self) -> usize {
        Arc::strong_count(&self.file)
    }

    /// 是否映射自 `file` 这个句柄
    pub(crate) fn is_backed_by(&self, file: &Arc<dyn MmFile>) -> bool {
        Arc::ptr_eq(&self.file, file)
    }

    /// 将文件内容读入帧，余下部分清零
    pub(crate) fn populate(&self, frame: &mut [u8]) -> VmResult<()> {
        let (data, tail) = frame.split_at_mut(self.read_bytes);
        tail.fill(0);
        if data.is_empty() {
            return Ok(());
        }
        let inode = self.file.inode().map_err(VmError::BadFile)?;
        let read = inode.read_at(self.offset, data).map_err(VmError::Io)?;
        if read != self.read_bytes {
            log::warn!(
                "vm: short read at offset {}: expected {}, got {}",
                self.offset,
                self.read_bytes,
                read
            );
            return Err(VmError::Io(EIO));
        }
        Ok(())
    }

    /// 将帧的前 `read_bytes` 字节写回文件
    pub(crate) fn write_back(&self, frame: &[u8]) -> VmResult<()> {
        if self.read_bytes == 0 {
            return Ok(());
        }
        let inode = self.file.inode().map_err(VmError::BadFile)?;
        let written = inode
            .write_at(self.offset, &frame[..self.read_bytes])
            .map_err(VmError::Io)?;
        if written != self.read_bytes {
            log::error!(
                "vm: partial write at offset {}: expected {}, got {}",
                self.offset,
                self.read_bytes,
                written
            );
            return Err(VmError::Io(EIO));
        }
        Ok(())
    }
}

// 手动实现 Debug，因为 dyn MmFile 没有实现 Debug
impl fmt::Debug for FilePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePage")
            .field("file", &"<dyn MmFile>")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes)
            .finish()
    }
}
