//! 帧分配器模块
//!
//! 本模块管理全局共享的物理帧池：空闲帧链表和二次机会（时钟）换出扫描。
//!
//! ## 分配策略
//!
//! 1. 空闲链表非空时直接弹出一个帧，无需换出。
//! 2. 否则从时钟指针处开始扫描 [`FrameRegistry`]：
//!    - 被钉住的帧：跳过，且**不**清除其访问位；
//!    - 访问位为 1 的帧：清除访问位，给它第二次机会；
//!    - 访问位为 0 且未被钉住的帧：选为牺牲帧，指针越过它。
//!
//! 时钟指针在多次调用之间保持不变（不会重置），保证换出按轮转方式公平进行。
//!
//! 扫描本身不知道翻译条目在哪里，访问位的读取和清除通过回调交给调用者，
//! 这样分配器只依赖反向页表，而换出的副作用（写回交换区、失效条目）
//! 由 [`crate::MemoryManager`] 统一完成。
//!
//! 所有帧都被钉住时扫描返回 `None`；阻塞等待由调用者负责。

use crate::address::Ppn;
use crate::frame_registry::{FrameOwner, FrameRegistry};
use alloc::collections::VecDeque;

/// 物理帧分配器
#[derive(Debug)]
pub struct FrameAllocator {
    /// 空闲帧链表
    free: VecDeque<Ppn>,
    /// 时钟指针
    clock_hand: usize,
    /// 总帧数
    total_frames: usize,
}

impl FrameAllocator {
    /// 创建分配器，`0..total_frames` 的所有帧初始为空闲
    pub fn new(total_frames: usize) -> Self {
        Self {
            free: (0..total_frames).map(Ppn::from_usize).collect(),
            clock_hand: 0,
            total_frames,
        }
    }

    /// 从空闲链表取出一个帧
    pub fn pop_free(&mut self) -> Option<Ppn> {
        self.free.pop_front()
    }

    /// 把帧放回空闲链表
    pub fn push_free(&mut self, ppn: Ppn) {
        debug_assert!(ppn.as_usize() < self.total_frames);
        debug_assert!(
            !self.free.contains(&ppn),
            "push_free: double free detected" // 检测到重复释放
        );
        self.free.push_back(ppn);
    }

    /// 空闲帧数
    pub fn free_frames(&self) -> usize {
        self.free.len()
    }

    /// 总帧数
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 当前时钟指针位置
    pub fn clock_hand(&self) -> usize {
        self.clock_hand
    }

    /// 执行一次时钟扫描，返回牺牲帧
    ///
    /// `referenced(ppn, owner)` 返回该页自上次扫描以来是否被访问过，
    /// 并负责清除访问位。
    ///
    /// 所有帧都被钉住时返回 `None`。只要存在未钉住的帧，
    /// 扫描最多两圈即可结束（第一圈清除访问位）。
    pub fn sweep<F>(&mut self, registry: &FrameRegistry, mut referenced: F) -> Option<Ppn>
    where
        F: FnMut(Ppn, FrameOwner) -> bool,
    {
        if self.total_frames == 0 || registry.all_pinned() {
            return None;
        }

        for _ in 0..=2 * self.total_frames {
            let ppn = Ppn::from_usize(self.clock_hand);
            self.clock_hand = (self.clock_hand + 1) % self.total_frames;

            if registry.is_pinned(ppn) {
                continue;
            }

            match registry.owner(ppn) {
                Some(owner) => {
                    if referenced(ppn, owner) {
                        continue;
                    }
                    return Some(ppn);
                }
                None => {
                    // 空闲链表为空时不应出现无主帧
                    log::error!("vm: ownerless frame {} found by clock sweep", ppn);
                    return Some(ppn);
                }
            }
        }

        None
    }
}
