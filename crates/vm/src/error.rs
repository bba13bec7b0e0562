//! 虚拟内存错误类型

use core::fmt;

/// I/O 错误码
pub(crate) const EIO: isize = -5;
const EBADF: isize = -9;
const EFAULT: isize = -14;
const EEXIST: isize = -17;
const EINVAL: isize = -22;

/// 虚拟内存操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 空地址、内核地址或超出用户地址空间
    InvalidAddress,
    /// 长度、偏移或对齐不合法
    InvalidArgument,
    /// 该虚拟页已有元数据
    AlreadyMapped,
    /// 没有对应的页或映射区域
    NotMapped,
    /// 访问被拒绝（写只读页、非栈增长的非法访问、present 缺页）
    AccessViolation,
    /// 后备存储读写失败，携带底层错误码
    Io(isize),
    /// 文件句柄无效或无法重新打开，携带底层错误码
    BadFile(isize),
}

impl VmError {
    /// 转换为系统调用返回的负错误码
    pub fn to_errno(&self) -> isize {
        match self {
            VmError::InvalidAddress | VmError::AccessViolation => EFAULT,
            VmError::InvalidArgument | VmError::NotMapped => EINVAL,
            VmError::AlreadyMapped => EEXIST,
            VmError::Io(code) if *code < 0 => *code,
            VmError::Io(_) => EIO,
            VmError::BadFile(_) => EBADF,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::InvalidAddress => write!(f, "invalid user address"),
            VmError::InvalidArgument => write!(f, "invalid argument"),
            VmError::AlreadyMapped => write!(f, "page already mapped"),
            VmError::NotMapped => write!(f, "page not mapped"),
            VmError::AccessViolation => write!(f, "access violation"),
            VmError::Io(code) => write!(f, "backing store I/O error ({code})"),
            VmError::BadFile(code) => write!(f, "bad file ({code})"),
        }
    }
}

/// 虚拟内存操作结果
pub type VmResult<T> = Result<T, VmError>;
