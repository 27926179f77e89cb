//! 模拟机器的 Mock 实现：物理内存、软件管理的 TLB 和故障地址寄存器
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `Machine`）。

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

/// Mock 的 TLB 条目，字段与硬件 TLB 槽一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockTlbEntry {
    pub vpn: usize,
    pub ppn: usize,
    pub valid: bool,
    pub read_only: bool,
    pub used: bool,
    pub dirty: bool,
}

impl MockTlbEntry {
    /// 无效条目
    pub const INVALID: Self = Self {
        vpn: 0,
        ppn: usize::MAX,
        valid: false,
        read_only: false,
        used: false,
        dirty: false,
    };
}

/// Mock 的模拟机器
pub struct MockMachine {
    page_size: usize,
    num_phys_pages: usize,
    memory: Mutex<Vec<u8>>,
    tlb: Mutex<Vec<MockTlbEntry>>,
    bad_vaddr: AtomicUsize,
    tlb_writes: AtomicUsize,
}

impl MockMachine {
    pub fn new(page_size: usize, num_phys_pages: usize, tlb_size: usize) -> Self {
        Self {
            page_size,
            num_phys_pages,
            memory: Mutex::new(vec![0u8; page_size * num_phys_pages]),
            tlb: Mutex::new(vec![MockTlbEntry::INVALID; tlb_size]),
            bad_vaddr: AtomicUsize::new(0),
            tlb_writes: AtomicUsize::new(0),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_phys_pages(&self) -> usize {
        self.num_phys_pages
    }

    pub fn tlb_size(&self) -> usize {
        self.tlb.lock().len()
    }

    pub fn read_tlb_entry(&self, index: usize) -> MockTlbEntry {
        self.tlb.lock()[index]
    }

    pub fn write_tlb_entry(&self, index: usize, entry: MockTlbEntry) {
        self.tlb_writes.fetch_add(1, Ordering::Relaxed);
        self.tlb.lock()[index] = entry;
    }

    /// TLB 写入次数
    pub fn tlb_writes(&self) -> usize {
        self.tlb_writes.load(Ordering::Relaxed)
    }

    /// 查找映射 `vpn` 的有效 TLB 槽
    pub fn find_tlb(&self, vpn: usize) -> Option<usize> {
        self.tlb
            .lock()
            .iter()
            .position(|e| e.valid && e.vpn == vpn)
    }

    /// 模拟 CPU 通过 TLB 访问页面：置 used，写访问还会置 dirty
    pub fn touch(&self, vpn: usize, write: bool) -> bool {
        let mut tlb = self.tlb.lock();
        match tlb.iter_mut().find(|e| e.valid && e.vpn == vpn) {
            Some(entry) => {
                entry.used = true;
                if write {
                    entry.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    /// 模拟 CPU 通过 TLB 执行一次存储
    pub fn store(&self, vaddr: usize, data: &[u8]) -> bool {
        let vpn = vaddr / self.page_size;
        let entry = match self.find_tlb(vpn) {
            Some(index) => self.read_tlb_entry(index),
            None => return false,
        };
        if entry.read_only {
            return false;
        }
        self.touch(vpn, true);
        let paddr = entry.ppn * self.page_size + vaddr % self.page_size;
        self.write_memory(paddr, data);
        true
    }

    pub fn read_memory(&self, paddr: usize, buf: &mut [u8]) {
        let memory = self.memory.lock();
        buf.copy_from_slice(&memory[paddr..paddr + buf.len()]);
    }

    pub fn write_memory(&self, paddr: usize, buf: &[u8]) {
        let mut memory = self.memory.lock();
        memory[paddr..paddr + buf.len()].copy_from_slice(buf);
    }

    /// 读取整个物理帧（用于断言）
    pub fn frame(&self, ppn: usize) -> Vec<u8> {
        let mut page = vec![0u8; self.page_size];
        self.read_memory(ppn * self.page_size, &mut page);
        page
    }

    pub fn bad_vaddr(&self) -> usize {
        self.bad_vaddr.load(Ordering::Relaxed)
    }

    pub fn set_bad_vaddr(&self, vaddr: usize) {
        self.bad_vaddr.store(vaddr, Ordering::Relaxed);
    }
}
