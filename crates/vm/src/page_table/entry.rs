//! 翻译条目

use crate::address::{Ppn, Vpn};

bitflags::bitflags! {
    /// 翻译条目标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PteFlags: u8 {
        /// 映射有效
        const VALID = 1 << 0;
        /// 只读页
        const READ_ONLY = 1 << 1;
        /// 自上次清除以来被访问过
        const USED = 1 << 2;
        /// 自上次写回以来被修改过
        const DIRTY = 1 << 3;
    }
}

/// 翻译条目：一个虚拟页到物理帧的映射
///
/// `ppn` 为 `None` 表示该页从未分配过物理帧。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    /// 虚拟页号
    pub vpn: Vpn,
    /// 物理页号
    pub ppn: Option<Ppn>,
    /// 标志位
    pub flags: PteFlags,
}

impl TranslationEntry {
    /// 创建一个无效、未分配物理帧的条目
    pub const fn invalid(vpn: Vpn) -> Self {
        Self {
            vpn,
            ppn: None,
            flags: PteFlags::empty(),
        }
    }

    /// 创建一个指向 `ppn` 的有效条目
    pub fn mapped(vpn: Vpn, ppn: Ppn, flags: PteFlags) -> Self {
        Self {
            vpn,
            ppn: Some(ppn),
            flags: flags | PteFlags::VALID,
        }
    }

    /// 映射是否有效
    pub fn is_valid(&self) -> bool {
        self.flags.contains(PteFlags::VALID)
    }

    /// 是否只读
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(PteFlags::READ_ONLY)
    }

    /// 是否被访问过
    pub fn is_used(&self) -> bool {
        self.flags.contains(PteFlags::USED)
    }

    /// 是否被修改过
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PteFlags::DIRTY)
    }

    /// 设置访问位
    pub fn set_used(&mut self, used: bool) {
        self.flags.set(PteFlags::USED, used);
    }

    /// 设置修改位
    pub fn set_dirty(&mut self, dirty: bool) {
        self.flags.set(PteFlags::DIRTY, dirty);
    }

    /// 有效时返回物理页号
    pub fn valid_ppn(&self) -> Option<Ppn> {
        if self.is_valid() { self.ppn } else { None }
    }

    /// 使映射失效，同时清除访问位和修改位
    pub fn invalidate(&mut self) {
        self.ppn = None;
        self.flags -= PteFlags::VALID | PteFlags::USED | PteFlags::DIRTY;
    }

    /// 把硬件 TLB 副本中的 `used` / `dirty` 合并进来
    ///
    /// 只有当副本与本条目指向同一物理帧时才合并，返回是否合并。
    pub fn merge_hw_bits(&mut self, hw: &TranslationEntry) -> bool {
        if !self.is_valid() || self.ppn != hw.ppn {
            return false;
        }
        self.flags |= hw.flags & (PteFlags::USED | PteFlags::DIRTY);
        true
    }
}
