//! 文件相关的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现 `MmFile` / `MmInode`。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock 的 Inode：内存中的文件内容
pub struct MockInode {
    data: Mutex<Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MockInode {
    fn new(data: &[u8]) -> Self {
        Self {
            data: Mutex::new(data.to_vec()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// 从 offset 读取，返回实际读取的字节数（到文件末尾为止）
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(-5);
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        let data = self.data.lock().unwrap();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    /// 写入到 offset，必要时扩展文件
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(-5);
        }
        let mut data = self.data.lock().unwrap();
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(buf.len())
    }

    /// 文件长度
    pub fn size(&self) -> usize {
        self.data.lock().unwrap().len()
    }
}

/// Mock 的打开文件句柄
///
/// 同一文件的所有句柄共享一个 [`MockInode`]。
pub struct MockFile {
    inode: Arc<MockInode>,
    open_handles: Arc<AtomicUsize>,
    reopens: Arc<AtomicUsize>,
    fail_reopen: AtomicBool,
}

impl MockFile {
    /// 以给定内容创建一个文件并打开
    pub fn new(data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            inode: Arc::new(MockInode::new(data)),
            open_handles: Arc::new(AtomicUsize::new(1)),
            reopens: Arc::new(AtomicUsize::new(0)),
            fail_reopen: AtomicBool::new(false),
        })
    }

    /// 重新打开：返回共享 inode 的独立句柄
    pub fn reopen(&self) -> Result<Arc<MockFile>, isize> {
        if self.fail_reopen.load(Ordering::Relaxed) {
            return Err(-9);
        }
        self.open_handles.fetch_add(1, Ordering::Relaxed);
        self.reopens.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(Self {
            inode: self.inode.clone(),
            open_handles: self.open_handles.clone(),
            reopens: self.reopens.clone(),
            fail_reopen: AtomicBool::new(false),
        }))
    }

    /// 底层 inode
    pub fn inode(&self) -> Arc<MockInode> {
        self.inode.clone()
    }

    /// 外部视角下的文件内容
    pub fn contents(&self) -> Vec<u8> {
        self.inode.data.lock().unwrap().clone()
    }

    /// 该文件当前仍打开的句柄数
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::Relaxed)
    }

    /// reopen 被调用的次数
    pub fn reopens(&self) -> usize {
        self.reopens.load(Ordering::Relaxed)
    }

    /// 读操作次数（不含注入失败的读）
    pub fn reads(&self) -> usize {
        self.inode.reads.load(Ordering::Relaxed)
    }

    /// 成功的写操作次数
    pub fn writes(&self) -> usize {
        self.inode.writes.load(Ordering::Relaxed)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inode.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inode.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_reopen(&self, fail: bool) {
        self.fail_reopen.store(fail, Ordering::Relaxed);
    }
}

impl Drop for MockFile {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::Relaxed);
    }
}
