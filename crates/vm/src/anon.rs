//! 匿名页
//!
//! 匿名页没有文件后备，换出时写入交换设备。
//! 内容全为零的页换出时直接丢弃，下次缺页重新清零即可。

use crate::error::{VmError, VmResult};
use crate::swap::{SwapDevice, SwapSlot};

/// 匿名页的后备信息
#[derive(Debug, Default)]
pub struct AnonPage {
    /// 换出后内容所在的槽位
    slot: Option<SwapSlot>,
}

impl AnonPage {
    /// 内容当前所在的交换槽位
    pub fn swap_slot(&self) -> Option<SwapSlot> {
        self.slot
    }

    /// 装入内容：有槽位则换入并释放槽位，否则清零
    pub(crate) fn populate(&mut self, frame: &mut [u8], swap: &dyn SwapDevice) -> VmResult<()> {
        match self.slot {
            Some(slot) => {
                swap.read(slot, frame).map_err(VmError::Io)?;
                swap.free(slot);
                self.slot = None;
            }
            None => frame.fill(0),
        }
        Ok(())
    }

    /// 换出到交换设备
    ///
    /// # Panics
    /// 交换设备已满或写入失败时 panic：牺牲帧无法腾出
    pub(crate) fn evict(&mut self, frame: &[u8], swap: &dyn SwapDevice) {
        debug_assert!(self.slot.is_none());
        if frame.iter().all(|&b| b == 0) {
            return;
        }
        let Some(slot) = swap.alloc_slot() else {
            panic!("vm: swap device full, cannot evict anonymous page");
        };
        if let Err(err) = swap.write(slot, frame) {
            panic!("vm: swap write to slot {} failed ({})", slot.0, err);
        }
        self.slot = Some(slot);
    }

    /// 释放占用的交换槽位
    pub(crate) fn destroy(&mut self, swap: &dyn SwapDevice) {
        if let Some(slot) = self.slot.take() {
            swap.free(slot);
        }
    }
}
