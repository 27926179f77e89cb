//! 内存管理器
//!
//! [`MemoryManager`] 持有全局共享的物理帧池：空闲帧链表、反向页表、时钟指针、
//! 交换区以及所有进程的页表。所有这些状态由一把全局自旋锁保护；
//! 帧耗尽（所有帧都被钉住）时分配者在条件变量上等待，`unpin` 负责唤醒。
//!
//! 进程以 [`Pid`] 为键保存在管理器内部的表中，反向页表只记录 `(pid, vpn)`，
//! 不持有对翻译条目的引用。
//!
//! ## 缺页处理
//!
//! 1. 检查 vpn 是否在进程页表范围内，越界返回 [`VmError::AddressFault`]；
//! 2. 通过 `acquire_frame` 获取一个帧（可能换出其它进程的页）；
//! 3. 确定页面来源：有交换槽则换入；否则属于可执行段则从段加载；否则清零；
//! 4. 安装有效条目并在反向页表中登记所有者。

use crate::address::{Ppn, Vpn, page_offset};
use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::frame_allocator::FrameAllocator;
use crate::frame_registry::{FrameOwner, FrameRegistry};
use crate::machine::Machine;
use crate::page_table::{PageTable, PteFlags, TranslationEntry};
use crate::pid::{Pid, PidAllocator};
use crate::section::ProcessImage;
use crate::swap::{SwapFile, SwapStore};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashMap;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sync::{Condvar, SpinLock, SpinLockGuard};

/// 单个进程的内存记录
pub(crate) struct ProcessMemory {
    pub(crate) page_table: PageTable,
    pub(crate) image: Arc<ProcessImage>,
}

/// 受全局锁保护的状态
pub(crate) struct VmState {
    pub(crate) processes: HashMap<Pid, ProcessMemory>,
    pub(crate) registry: FrameRegistry,
    pub(crate) allocator: FrameAllocator,
    pub(crate) swap: SwapStore,
    /// 当前在 CPU 上运行、其条目可能缓存在 TLB 中的进程
    pub(crate) running: Option<Pid>,
    pub(crate) rng: SmallRng,
}

impl VmState {
    pub(crate) fn process(&self, pid: Pid) -> VmResult<&ProcessMemory> {
        self.processes.get(&pid).ok_or(VmError::UnknownProcess(pid))
    }

    pub(crate) fn process_mut(&mut self, pid: Pid) -> VmResult<&mut ProcessMemory> {
        self.processes
            .get_mut(&pid)
            .ok_or(VmError::UnknownProcess(pid))
    }
}

/// 按需分页的内存管理器
pub struct MemoryManager {
    pub(crate) machine: Arc<dyn Machine>,
    config: VmConfig,
    page_size: usize,
    pub(crate) state: SpinLock<VmState>,
    /// 有帧被解除钉住或释放时通知
    frame_available: Condvar,
    pids: PidAllocator,
}

impl MemoryManager {
    /// 创建内存管理器，所有物理帧初始为空闲
    pub fn new(
        machine: Arc<dyn Machine>,
        swap_file: Arc<dyn SwapFile>,
        config: VmConfig,
    ) -> Arc<Self> {
        let page_size = machine.page_size();
        let total_frames = machine.num_phys_pages();
        log::info!(
            "vm: {} frames of {} bytes, {} tlb slots, {} stack pages",
            total_frames,
            page_size,
            machine.tlb_size(),
            config.stack_pages
        );
        Arc::new(Self {
            config,
            page_size,
            state: SpinLock::new(VmState {
                processes: HashMap::new(),
                registry: FrameRegistry::new(total_frames),
                allocator: FrameAllocator::new(total_frames),
                swap: SwapStore::new(swap_file, page_size),
                running: None,
                rng: SmallRng::seed_from_u64(config.tlb_seed),
            }),
            machine,
            frame_available: Condvar::new(),
            pids: PidAllocator::new(),
        })
    }

    /// 模拟机器
    pub fn machine(&self) -> &dyn Machine {
        self.machine.as_ref()
    }

    /// 配置
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 注册一个新进程，页表全部无效
    pub fn register_process(&self, image: Arc<ProcessImage>) -> Pid {
        let pid = self.pids.allocate();
        let page_table = PageTable::new(image.num_pages());
        log::debug!("vm: register pid {} with {} pages", pid, page_table.len());
        self.state
            .lock()
            .processes
            .insert(pid, ProcessMemory { page_table, image });
        pid
    }

    /// 释放进程占用的所有帧并丢弃它的交换槽映射
    ///
    /// 若进程正在运行，一并失效整个 TLB。
    pub fn release_process(&self, pid: Pid) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.processes.remove(&pid).is_none() {
            return;
        }

        let frames: Vec<Ppn> = state
            .registry
            .owned_frames()
            .filter(|(_, owner)| owner.pid == pid)
            .map(|(ppn, _)| ppn)
            .collect();
        for &ppn in &frames {
            state.registry.clear(ppn);
            state.allocator.push_free(ppn);
        }
        state.swap.forget_process(pid);

        if state.running == Some(pid) {
            self.flush_tlb();
            state.running = None;
        }
        log::debug!("vm: release pid {}, {} frames freed", pid, frames.len());
        self.frame_available.notify_all();
    }

    /// 处理 `pid` 在 `vpn` 上的缺页，返回页所在的帧
    ///
    /// 页已有效时直接返回。
    pub fn handle_fault(&self, pid: Pid, vpn: Vpn) -> VmResult<Ppn> {
        let mut guard = self.state.lock();
        self.handle_fault_locked(&mut guard, pid, vpn)
    }

    pub(crate) fn handle_fault_locked(
        &self,
        guard: &mut SpinLockGuard<'_, VmState>,
        pid: Pid,
        vpn: Vpn,
    ) -> VmResult<Ppn> {
        let entry = match guard.process(pid)?.page_table.lookup(vpn) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("vm: pid {} fault out of range at vpn {}", pid, vpn);
                return Err(err);
            }
        };
        if let Some(ppn) = entry.valid_ppn() {
            return Ok(ppn);
        }

        let ppn = self.acquire_frame(guard)?;

        // 等待帧期间锁曾被释放，重新检查
        let state = &mut **guard;
        let entry = match state.process(pid).and_then(|p| p.page_table.lookup(vpn)) {
            Ok(entry) => entry,
            Err(err) => {
                self.release_frame(state, ppn);
                return Err(err);
            }
        };
        if let Some(existing) = entry.valid_ppn() {
            self.release_frame(state, ppn);
            return Ok(existing);
        }

        let flags = match self.fill_frame(state, pid, vpn, ppn) {
            Ok(flags) => flags,
            Err(err) => {
                self.release_frame(state, ppn);
                return Err(err);
            }
        };

        let entry = TranslationEntry::mapped(vpn, ppn, flags | PteFlags::USED);
        state.process_mut(pid)?.page_table.install(vpn, entry)?;
        state.registry.record(ppn, FrameOwner { pid, vpn });
        log::debug!("vm: pid {} vpn {} -> frame {}", pid, vpn, ppn);
        Ok(ppn)
    }

    /// 把页面内容放入帧 `ppn`，返回新条目的附加标志
    fn fill_frame(
        &self,
        state: &mut VmState,
        pid: Pid,
        vpn: Vpn,
        ppn: Ppn,
    ) -> VmResult<PteFlags> {
        let machine = self.machine.as_ref();
        if state.swap.slot_of(pid, vpn).is_some() {
            state.swap.read_in(pid, vpn, ppn, machine)?;
            return Ok(PteFlags::empty());
        }

        let image = state.process(pid)?.image.clone();
        let mut page = vec![0u8; self.page_size];
        if let Some((section, spn)) = image.section_for(vpn) {
            section.load_page(spn, &mut page).map_err(|err| {
                log::warn!(
                    "vm: loading {} page {} for pid {} failed: {}",
                    section.name(),
                    spn,
                    pid,
                    err
                );
                VmError::SectionLoad { vpn }
            })?;
            machine.write_memory(ppn.start_addr(self.page_size), &page);
            return Ok(if section.is_read_only() {
                PteFlags::READ_ONLY
            } else {
                PteFlags::DIRTY
            });
        }

        machine.write_memory(ppn.start_addr(self.page_size), &page);
        Ok(PteFlags::empty())
    }

    /// 获取一个物理帧
    ///
    /// 空闲链表为空时运行时钟扫描并换出牺牲页；所有帧都被钉住时阻塞等待。
    /// 返回时调用者仍持有锁，且从选中帧起锁未被释放过。
    pub(crate) fn acquire_frame(&self, guard: &mut SpinLockGuard<'_, VmState>) -> VmResult<Ppn> {
        loop {
            if let Some(ppn) = guard.allocator.pop_free() {
                return Ok(ppn);
            }
            if guard.registry.all_pinned() {
                log::debug!("vm: all frames pinned, waiting");
                self.frame_available.wait(guard);
                continue;
            }

            self.sync_running_tlb(guard);
            let state = &mut **guard;
            let processes = &mut state.processes;
            let test = |ppn, owner| test_and_clear_used(processes, ppn, owner);
            let victim = state.allocator.sweep(&state.registry, test);
            let Some(victim) = victim else {
                self.frame_available.wait(guard);
                continue;
            };

            self.evict(state, victim)?;
            return Ok(victim);
        }
    }

    /// 换出帧 `ppn` 上的页
    ///
    /// 写回失败时牺牲页保持原样（条目仍有效），帧不会被重复分配。
    /// 登记表中的旧记录由调用者的 `record` 覆盖。
    fn evict(&self, state: &mut VmState, ppn: Ppn) -> VmResult<()> {
        let Some(owner) = state.registry.owner(ppn) else {
            return Ok(());
        };
        let running = state.running == Some(owner.pid);
        let Some(process) = state.processes.get_mut(&owner.pid) else {
            log::error!("vm: frame {} owned by unknown pid {}", ppn, owner.pid);
            return Ok(());
        };
        let entry = process.page_table.entry_mut(owner.vpn)?;

        for index in 0..self.machine.tlb_size() {
            let hw = self.machine.read_tlb_entry(index);
            if hw.is_valid() && hw.ppn == Some(ppn) {
                if running {
                    entry.merge_hw_bits(&hw);
                }
                let invalid = TranslationEntry::invalid(hw.vpn);
                self.machine.write_tlb_entry(index, invalid);
            }
        }

        let victim = *entry;
        if victim.is_dirty() {
            state
                .swap
                .write_back(owner.pid, &victim, ppn, self.machine.as_ref())?;
        }
        state
            .process_mut(owner.pid)?
            .page_table
            .entry_mut(owner.vpn)?
            .invalidate();
        log::debug!(
            "vm: evict pid {} vpn {} from frame {}{}",
            owner.pid,
            owner.vpn,
            ppn,
            if victim.is_dirty() { " (dirty)" } else { "" }
        );
        Ok(())
    }

    /// 把未使用的帧放回空闲链表
    fn release_frame(&self, state: &mut VmState, ppn: Ppn) {
        state.registry.clear(ppn);
        state.allocator.push_free(ppn);
        self.frame_available.notify_one();
    }

    /// 钉住 `pid` 的 `vpn` 所在帧，必要时先缺页，返回帧号
    pub fn pin(&self, pid: Pid, vpn: Vpn) -> VmResult<Ppn> {
        let mut guard = self.state.lock();
        let ppn = self.handle_fault_locked(&mut guard, pid, vpn)?;
        guard.registry.pin(ppn);
        Ok(ppn)
    }

    /// 解除钉住，帧变为可换出时唤醒一个等待者
    pub fn unpin(&self, pid: Pid, vpn: Vpn) -> VmResult<()> {
        let mut guard = self.state.lock();
        let entry = guard.process(pid)?.page_table.lookup(vpn)?;
        match entry.valid_ppn() {
            Some(ppn) => {
                if guard.registry.unpin(ppn) {
                    self.frame_available.notify_one();
                }
            }
            None => log::error!("vm: unpin of unmapped page pid {} vpn {}", pid, vpn),
        }
        Ok(())
    }

    fn unpin_frame(&self, ppn: Ppn) {
        if self.state.lock().registry.unpin(ppn) {
            self.frame_available.notify_one();
        }
    }

    /// 为一次直接内存拷贝钉住页面并更新访问位/修改位
    ///
    /// 写只读页或缺页失败时返回 `None`。
    fn pin_for_transfer(&self, pid: Pid, vpn: Vpn, write: bool) -> Option<Ppn> {
        let mut guard = self.state.lock();
        let ppn = match self.handle_fault_locked(&mut guard, pid, vpn) {
            Ok(ppn) => ppn,
            Err(err) => {
                log::warn!("vm: transfer stopped at pid {} vpn {}: {}", pid, vpn, err);
                return None;
            }
        };
        let state = &mut *guard;
        let process = state.process_mut(pid).ok()?;
        let entry = process.page_table.entry_mut(vpn).ok()?;
        if write && entry.is_read_only() {
            log::warn!(
                "vm: transfer stopped at read-only page pid {} vpn {}",
                pid,
                vpn
            );
            return None;
        }
        entry.set_used(true);
        if write {
            entry.set_dirty(true);
        }
        state.registry.pin(ppn);
        Some(ppn)
    }

    /// 逐页拷贝，返回实际传输的字节数
    fn transfer<F>(
        &self,
        pid: Pid,
        vaddr: usize,
        len: usize,
        write: bool,
        mut copy: F,
    ) -> usize
    where
        F: FnMut(usize, core::ops::Range<usize>),
    {
        let mut done = 0;
        while done < len {
            let Some(addr) = vaddr.checked_add(done) else {
                break;
            };
            let vpn = Vpn::from_addr(addr, self.page_size);
            let offset = page_offset(addr, self.page_size);
            let amount = (self.page_size - offset).min(len - done);
            let Some(ppn) = self.pin_for_transfer(pid, vpn, write) else {
                break;
            };
            let paddr = ppn.start_addr(self.page_size) + offset;
            copy(paddr, done..done + amount);
            self.unpin_frame(ppn);
            done += amount;
        }
        done
    }

    /// 从 `pid` 的虚拟地址 `vaddr` 读取到 `buf`，返回读取的字节数
    pub fn read_virtual_memory(&self, pid: Pid, vaddr: usize, buf: &mut [u8]) -> usize {
        self.transfer(pid, vaddr, buf.len(), false, |paddr, range| {
            self.machine.read_memory(paddr, &mut buf[range]);
        })
    }

    /// 把 `buf` 写入 `pid` 的虚拟地址 `vaddr`，返回写入的字节数
    pub fn write_virtual_memory(&self, pid: Pid, vaddr: usize, buf: &[u8]) -> usize {
        self.transfer(pid, vaddr, buf.len(), true, |paddr, range| {
            self.machine.write_memory(paddr, &buf[range]);
        })
    }

    /// 读取以 NUL 结尾的字符串，最多 `max_len` 字节（不含 NUL）
    ///
    /// 逐页读取，遇到 NUL、读满 `max_len + 1` 字节或到达地址空间末尾即停止。
    pub fn read_virtual_string(&self, pid: Pid, vaddr: usize, max_len: usize) -> Option<String> {
        let limit = max_len.saturating_add(1);
        let mut bytes = Vec::new();
        let mut chunk = vec![0u8; self.page_size];
        while bytes.len() < limit {
            let addr = vaddr.checked_add(bytes.len())?;
            let room = self.page_size - page_offset(addr, self.page_size);
            let want = room.min(limit - bytes.len());
            let read = self.read_virtual_memory(pid, addr, &mut chunk[..want]);
            if let Some(end) = chunk[..read].iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&chunk[..end]);
                return String::from_utf8(bytes).ok();
            }
            if read < want {
                return None;
            }
            bytes.extend_from_slice(&chunk[..read]);
        }
        None
    }

    /// 空闲帧数
    pub fn free_frames(&self) -> usize {
        self.state.lock().allocator.free_frames()
    }

    /// 被钉住的帧数
    pub fn pinned_frames(&self) -> usize {
        self.state.lock().registry.pinned_frames()
    }

    /// 时钟指针位置
    pub fn clock_hand(&self) -> usize {
        self.state.lock().allocator.clock_hand()
    }

    /// 帧 `ppn` 的所有者
    pub fn frame_owner(&self, ppn: Ppn) -> Option<FrameOwner> {
        self.state.lock().registry.owner(ppn)
    }

    /// `(pid, vpn)` 的交换槽
    pub fn swap_slot(&self, pid: Pid, vpn: Vpn) -> Option<usize> {
        self.state.lock().swap.slot_of(pid, vpn)
    }

    /// 已分配的交换槽数
    pub fn swap_slots_allocated(&self) -> usize {
        self.state.lock().swap.slots_allocated()
    }

    /// 正在等待帧的分配者数量
    pub fn blocked_waiters(&self) -> usize {
        self.frame_available.waiters()
    }

    /// 当前运行的进程
    pub fn running(&self) -> Option<Pid> {
        self.state.lock().running
    }

    /// `pid` 页表中 `vpn` 的条目（副本）
    pub fn translation(&self, pid: Pid, vpn: Vpn) -> VmResult<TranslationEntry> {
        self.state.lock().process(pid)?.page_table.lookup(vpn)
    }

    /// 检查反向页表与各进程页表是否一致
    ///
    /// 每个有效条目指向的帧都登记着同一 `(pid, vpn)`，反之亦然；
    /// 空闲帧与有主帧之和等于总帧数。
    pub fn registry_consistent(&self) -> bool {
        let state = self.state.lock();
        for (&pid, process) in &state.processes {
            for entry in process.page_table.valid_entries() {
                let vpn = entry.vpn;
                let Some(ppn) = entry.ppn else {
                    return false;
                };
                if state.registry.owner(ppn) != Some(FrameOwner { pid, vpn }) {
                    log::error!("vm: frame {} disagrees with pid {} vpn {}", ppn, pid, vpn);
                    return false;
                }
            }
        }

        let mut owned = 0;
        for (ppn, owner) in state.registry.owned_frames() {
            owned += 1;
            let mapped = state
                .process(owner.pid)
                .and_then(|p| p.page_table.lookup(owner.vpn))
                .map(|e| e.valid_ppn() == Some(ppn))
                .unwrap_or(false);
            if !mapped {
                log::error!("vm: frame {} records stale owner {:?}", ppn, owner);
                return false;
            }
        }
        owned + state.allocator.free_frames() == state.registry.total_frames()
    }
}

/// 时钟扫描回调：读取并清除所有者条目的访问位
fn test_and_clear_used(
    processes: &mut HashMap<Pid, ProcessMemory>,
    ppn: Ppn,
    owner: FrameOwner,
) -> bool {
    let entry = processes
        .get_mut(&owner.pid)
        .and_then(|p| p.page_table.entry_mut(owner.vpn).ok());
    match entry {
        Some(entry) if entry.valid_ppn() == Some(ppn) => {
            let used = entry.is_used();
            entry.set_used(false);
            used
        }
        _ => {
            log::error!(
                "vm: frame {} has stale owner pid {} vpn {}",
                ppn,
                owner.pid,
                owner.vpn
            );
            false
        }
    }
}
