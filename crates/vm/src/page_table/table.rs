//! 每进程页表
//!
//! 以 vpn 为下标的线性数组，大小为进程的总虚拟页数（代码/数据段 + 栈 + 一页参数）。
//! 页表本身不做并发控制，由 [`crate::MemoryManager`] 的全局锁保护。

use super::TranslationEntry;
use crate::address::Vpn;
use crate::error::{VmError, VmResult};
use alloc::vec::Vec;

/// 每进程页表
#[derive(Debug, Clone)]
pub struct PageTable {
    entries: Vec<TranslationEntry>,
}

impl PageTable {
    /// 创建 `num_pages` 页的页表，所有条目无效且未分配物理帧
    pub fn new(num_pages: usize) -> Self {
        Self {
            entries: (0..num_pages)
                .map(|vpn| TranslationEntry::invalid(Vpn::from_usize(vpn)))
                .collect(),
        }
    }

    /// 页表覆盖的虚拟页数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 页表是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 查询 `vpn` 的条目（副本）
    ///
    /// 越界返回 [`VmError::AddressFault`]。
    pub fn lookup(&self, vpn: Vpn) -> VmResult<TranslationEntry> {
        self.entries
            .get(vpn.as_usize())
            .copied()
            .ok_or(VmError::AddressFault { vpn })
    }

    /// 获取 `vpn` 条目的可变引用
    pub fn entry_mut(&mut self, vpn: Vpn) -> VmResult<&mut TranslationEntry> {
        self.entries
            .get_mut(vpn.as_usize())
            .ok_or(VmError::AddressFault { vpn })
    }

    /// 覆盖 `vpn` 处的条目
    ///
    /// 只应由缺页处理和 TLB 同步调用。
    pub fn install(&mut self, vpn: Vpn, entry: TranslationEntry) -> VmResult<()> {
        debug_assert_eq!(entry.vpn, vpn);
        *self.entry_mut(vpn)? = entry;
        Ok(())
    }

    /// 把 TLB 副本的 `used` / `dirty` 合并回对应条目
    pub fn merge_hw_bits(&mut self, hw: &TranslationEntry) -> VmResult<bool> {
        Ok(self.entry_mut(hw.vpn)?.merge_hw_bits(hw))
    }

    /// 遍历所有有效条目
    pub fn valid_entries(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.entries.iter().filter(|e| e.is_valid())
    }
}
