//! swap 设备的 Mock 实现

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 的 swap 设备：固定数量的槽，每个槽保存一页数据
pub struct MockSwap {
    capacity: usize,
    slots: Mutex<BTreeMap<usize, Vec<u8>>>,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl MockSwap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(BTreeMap::new()),
            fail_reads: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// 分配编号最小的空闲槽，设备满时返回 None
    pub fn alloc_slot(&self) -> Option<usize> {
        let mut slots = self.slots.lock().unwrap();
        let id = (0..self.capacity).find(|id| !slots.contains_key(id))?;
        slots.insert(id, Vec::new());
        Some(id)
    }

    pub fn write(&self, slot: usize, page: &[u8]) -> Result<(), isize> {
        let mut slots = self.slots.lock().unwrap();
        let data = slots.get_mut(&slot).ok_or(-22isize)?;
        *data = page.to_vec();
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn read(&self, slot: usize, page: &mut [u8]) -> Result<(), isize> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(-5);
        }
        let slots = self.slots.lock().unwrap();
        let data = slots.get(&slot).ok_or(-22isize)?;
        page.copy_from_slice(&data[..page.len()]);
        Ok(())
    }

    pub fn free(&self, slot: usize) {
        let removed = self.slots.lock().unwrap().remove(&slot);
        assert!(removed.is_some(), "MockSwap: double free of slot {slot}");
    }

    /// 已占用的槽数
    pub fn used(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// 写操作次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }
}
