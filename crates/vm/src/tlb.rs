//! TLB 同步
//!
//! TLB 中的条目只是页表条目的副本。进程运行期间 CPU 只更新 TLB 副本的
//! `used` / `dirty`，因此以下时机必须把这两个位合并回页表：
//!
//! - 上下文保存：合并并失效所有有效槽，进程离开 CPU 后页表即为权威；
//! - TLB 替换：被替换的槽先合并；
//! - 时钟扫描前：合并运行进程的所有槽，并清除 TLB 中的 `used`，
//!   使扫描能够老化 CPU 经由 TLB 访问过的页；
//! - 换出：缓存着牺牲帧的槽先合并再失效（见 `MemoryManager::evict`）。

use crate::address::Vpn;
use crate::error::VmResult;
use crate::manager::{MemoryManager, ProcessMemory, VmState};
use crate::page_table::TranslationEntry;
use crate::pid::Pid;
use alloc::vec::Vec;
use rand::Rng;
use sync::IntrGuard;

impl MemoryManager {
    /// 进程离开 CPU 前调用：合并并失效所有有效 TLB 槽
    pub fn on_context_save(&self, pid: Pid) {
        let mut guard = self.state.lock();
        let _intr = IntrGuard::new();
        let state = &mut *guard;
        for index in 0..self.machine.tlb_size() {
            let hw = self.machine.read_tlb_entry(index);
            if !hw.is_valid() {
                continue;
            }
            match state.processes.get_mut(&pid) {
                Some(process) => merge_slot(process, index, &hw),
                None => log::error!("vm: context save for unknown pid {}", pid),
            }
            self.machine
                .write_tlb_entry(index, TranslationEntry::invalid(hw.vpn));
        }
        if state.running == Some(pid) {
            state.running = None;
        }
    }

    /// 进程回到 CPU 时调用：只记录运行进程，TLB 已在保存时失效
    pub fn on_context_restore(&self, pid: Pid) {
        self.state.lock().running = Some(pid);
    }

    /// 处理 TLB 缺失：必要时缺页，然后把条目装入 TLB
    ///
    /// 优先使用无效槽，否则伪随机选择一个槽替换。
    pub fn on_tlb_miss(&self, pid: Pid, vaddr: usize) -> VmResult<()> {
        let vpn = Vpn::from_addr(vaddr, self.page_size());
        let mut guard = self.state.lock();
        guard.running = Some(pid);
        self.handle_fault_locked(&mut guard, pid, vpn)?;

        let state = &mut *guard;
        let entry = state.process(pid)?.page_table.lookup(vpn)?;
        let tlb_size = self.machine.tlb_size();
        if tlb_size == 0 {
            return Ok(());
        }

        let _intr = IntrGuard::new();
        let slots: Vec<TranslationEntry> = (0..tlb_size)
            .map(|i| self.machine.read_tlb_entry(i))
            .collect();
        let index = slots
            .iter()
            .position(|hw| hw.is_valid() && hw.vpn == vpn)
            .or_else(|| slots.iter().position(|hw| !hw.is_valid()))
            .unwrap_or_else(|| state.rng.gen_range(0..tlb_size));

        let old = slots[index];
        if old.is_valid() {
            merge_slot(state.process_mut(pid)?, index, &old);
        }
        self.machine.write_tlb_entry(index, entry);
        log::debug!("vm: tlb[{}] <- pid {} vpn {}", index, pid, vpn);
        Ok(())
    }

    /// 把运行进程的 TLB 访问位/修改位合并回页表，并清除 TLB 中的访问位
    pub(crate) fn sync_running_tlb(&self, state: &mut VmState) {
        let Some(pid) = state.running else {
            return;
        };
        let Some(process) = state.processes.get_mut(&pid) else {
            return;
        };
        for index in 0..self.machine.tlb_size() {
            let mut hw = self.machine.read_tlb_entry(index);
            if !hw.is_valid() {
                continue;
            }
            if let Ok(true) = process.page_table.merge_hw_bits(&hw) {
                if hw.is_used() {
                    hw.set_used(false);
                    self.machine.write_tlb_entry(index, hw);
                }
            }
        }
    }

    /// 失效所有 TLB 槽，不合并
    pub(crate) fn flush_tlb(&self) {
        let _intr = IntrGuard::new();
        for index in 0..self.machine.tlb_size() {
            let hw = self.machine.read_tlb_entry(index);
            if hw.is_valid() {
                self.machine
                    .write_tlb_entry(index, TranslationEntry::invalid(hw.vpn));
            }
        }
    }
}

/// 把 TLB 槽 `index` 的副本合并回页表，副本与页表不符时记录错误
fn merge_slot(process: &mut ProcessMemory, index: usize, hw: &TranslationEntry) {
    match process.page_table.merge_hw_bits(hw) {
        Ok(true) => {}
        Ok(false) => log::error!("vm: stale tlb slot {} for vpn {}", index, hw.vpn),
        Err(err) => log::error!("vm: tlb slot {} holds bad entry: {}", index, err),
    }
}
