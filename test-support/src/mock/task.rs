//! 任务（进程）退出通道的 Mock 实现

use std::sync::Mutex;

/// 记录退出状态的 Mock 任务
pub struct MockTask {
    exit_status: Mutex<Option<i32>>,
}

impl MockTask {
    pub const fn new() -> Self {
        Self {
            exit_status: Mutex::new(None),
        }
    }

    /// 以 status 终止任务
    pub fn exit(&self, status: i32) {
        let mut slot = self.exit_status.lock().unwrap();
        assert!(slot.is_none(), "MockTask: exited twice");
        *slot = Some(status);
    }

    /// 任务的退出状态（仍在运行时为 None）
    pub fn exit_status(&self) -> Option<i32> {
        *self.exit_status.lock().unwrap()
    }
}

impl Default for MockTask {
    fn default() -> Self {
        Self::new()
    }
}
