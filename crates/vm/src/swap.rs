//! 交换区
//!
//! 追加式的后备存储：每个被换出的页占用一个页大小的交换槽。
//!
//! - 交换槽映射 `(pid, vpn) -> slot` 在第一次写回时惰性建立；
//!   没有映射说明该页从未被换出（未访问、零填充或可直接从可执行段加载）。
//! - 槽号单调分配，本次运行内从不复用，也不压缩交换文件。
//!   进程退出时只丢弃它的映射，槽位本身不回收。
//! - 只读页永远不会写入交换区。

use crate::address::{Ppn, Vpn};
use crate::error::{VmError, VmResult};
use crate::machine::Machine;
use crate::page_table::TranslationEntry;
use crate::pid::Pid;
use alloc::sync::Arc;
use alloc::vec;
use hashbrown::HashMap;

/// 交换文件接口
///
/// 此 trait 抽象了交换区所需的最小文件接口：按偏移读写定长页。
pub trait SwapFile: Send + Sync {
    /// 文件名
    fn name(&self) -> &str;

    /// 从指定偏移读取数据到缓冲区
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 将缓冲区数据写入指定偏移
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;
}

/// 交换区
pub struct SwapStore {
    file: Arc<dyn SwapFile>,
    /// 交换槽映射
    slots: HashMap<(Pid, Vpn), usize>,
    /// 下一个未使用的槽号
    next_slot: usize,
    page_size: usize,
}

impl SwapStore {
    /// 在交换文件 `file` 上创建交换区
    pub fn new(file: Arc<dyn SwapFile>, page_size: usize) -> Self {
        log::debug!("vm: swap store on {}", file.name());
        Self {
            file,
            slots: HashMap::new(),
            next_slot: 0,
            page_size,
        }
    }

    /// 查询 `(pid, vpn)` 的交换槽
    pub fn slot_of(&self, pid: Pid, vpn: Vpn) -> Option<usize> {
        self.slots.get(&(pid, vpn)).copied()
    }

    /// 已分配的槽数
    pub fn slots_allocated(&self) -> usize {
        self.next_slot
    }

    /// 把帧 `ppn` 的内容写回 `entry` 所在页的交换槽
    ///
    /// 槽不存在时分配新槽；只有写入成功后新槽才会生效。
    /// 只读页不写回，返回 `Ok(None)`。
    pub fn write_back(
        &mut self,
        pid: Pid,
        entry: &TranslationEntry,
        ppn: Ppn,
        machine: &dyn Machine,
    ) -> VmResult<Option<usize>> {
        if entry.is_read_only() {
            log::error!(
                "vm: refusing to write back read-only page pid {} vpn {}",
                pid,
                entry.vpn
            );
            return Ok(None);
        }

        let existing = self.slot_of(pid, entry.vpn);
        let slot = existing.unwrap_or(self.next_slot);

        let mut page = vec![0u8; self.page_size];
        machine.read_memory(ppn.start_addr(self.page_size), &mut page);
        match self.file.write_at(slot * self.page_size, &page) {
            Ok(n) if n == self.page_size => {}
            Ok(n) => {
                log::warn!("vm: short swap write at slot {}: {} bytes", slot, n);
                return Err(VmError::BackingStore { slot });
            }
            Err(err) => {
                log::warn!("vm: swap write failed at slot {}: {}", slot, err);
                return Err(VmError::BackingStore { slot });
            }
        }

        if existing.is_none() {
            self.slots.insert((pid, entry.vpn), slot);
            self.next_slot += 1;
        }
        log::debug!(
            "vm: swap out pid {} vpn {} from frame {} to slot {}",
            pid,
            entry.vpn,
            ppn,
            slot
        );
        Ok(Some(slot))
    }

    /// 把 `(pid, vpn)` 的交换槽内容读入帧 `ppn`
    ///
    /// 槽必须存在，否则说明调用者破坏了不变式。
    pub fn read_in(&self, pid: Pid, vpn: Vpn, ppn: Ppn, machine: &dyn Machine) -> VmResult<()> {
        let Some(slot) = self.slot_of(pid, vpn) else {
            log::error!("vm: swap in without slot: pid {} vpn {}", pid, vpn);
            return Err(VmError::MissingSwapSlot { pid, vpn });
        };

        let mut page = vec![0u8; self.page_size];
        match self.file.read_at(slot * self.page_size, &mut page) {
            Ok(n) if n == self.page_size => {}
            Ok(n) => {
                log::warn!("vm: short swap read at slot {}: {} bytes", slot, n);
                return Err(VmError::BackingStore { slot });
            }
            Err(err) => {
                log::warn!("vm: swap read failed at slot {}: {}", slot, err);
                return Err(VmError::BackingStore { slot });
            }
        }
        machine.write_memory(ppn.start_addr(self.page_size), &page);
        log::debug!(
            "vm: swap in pid {} vpn {} from slot {} to frame {}",
            pid,
            vpn,
            slot,
            ppn
        );
        Ok(())
    }

    /// 丢弃进程的所有交换槽映射（槽号不复用）
    pub fn forget_process(&mut self, pid: Pid) {
        self.slots.retain(|(owner, _), _| *owner != pid);
    }
}
