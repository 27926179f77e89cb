//! 反向页表（物理帧登记表）
//!
//! 以物理页号为下标，记录每个帧当前的所有者 `(pid, vpn)` 以及钉住计数。
//! 换出算法以它为准判断“哪一页住在哪个帧”，而不是遍历各进程页表。
//!
//! 登记表只保存进程 ID 和虚拟页号，不保存对翻译条目的引用；
//! 需要条目时由调用者按 `(pid, vpn)` 到进程页表中查找。

use crate::address::{Ppn, Vpn};
use crate::pid::Pid;
use alloc::vec;
use alloc::vec::Vec;

/// 帧的所有者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    /// 所属进程
    pub pid: Pid,
    /// 映射到该帧的虚拟页号
    pub vpn: Vpn,
}

/// 单个物理帧的登记信息
#[derive(Debug, Clone, Copy, Default)]
struct FrameInfo {
    owner: Option<FrameOwner>,
    /// 钉住计数，大于 0 时不可被换出
    pin_count: usize,
}

/// 反向页表
#[derive(Debug)]
pub struct FrameRegistry {
    frames: Vec<FrameInfo>,
    /// 被钉住（pin_count > 0）的帧数
    pinned_frames: usize,
}

impl FrameRegistry {
    /// 创建覆盖 `total_frames` 个帧的登记表，所有帧无主
    pub fn new(total_frames: usize) -> Self {
        Self {
            frames: vec![FrameInfo::default(); total_frames],
            pinned_frames: 0,
        }
    }

    /// 总帧数
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// 记录 `ppn` 的新所有者，覆盖旧记录
    pub fn record(&mut self, ppn: Ppn, owner: FrameOwner) {
        self.frames[ppn.as_usize()].owner = Some(owner);
    }

    /// 把 `ppn` 标记为无主
    ///
    /// 若帧仍被钉住，一并解除并修正钉住帧计数。
    pub fn clear(&mut self, ppn: Ppn) {
        let info = &mut self.frames[ppn.as_usize()];
        if info.pin_count > 0 {
            self.pinned_frames -= 1;
        }
        *info = FrameInfo::default();
    }

    /// 查询 `ppn` 的所有者
    pub fn owner(&self, ppn: Ppn) -> Option<FrameOwner> {
        self.frames[ppn.as_usize()].owner
    }

    /// 钉住 `ppn`
    pub fn pin(&mut self, ppn: Ppn) {
        let info = &mut self.frames[ppn.as_usize()];
        if info.pin_count == 0 {
            self.pinned_frames += 1;
        }
        info.pin_count += 1;
    }

    /// 解除一次钉住，返回该帧是否因此变为可换出
    pub fn unpin(&mut self, ppn: Ppn) -> bool {
        let info = &mut self.frames[ppn.as_usize()];
        if info.pin_count == 0 {
            log::error!("vm: unpin of unpinned frame {}", ppn);
            return false;
        }
        info.pin_count -= 1;
        if info.pin_count == 0 {
            self.pinned_frames -= 1;
            true
        } else {
            false
        }
    }

    /// `ppn` 是否被钉住
    pub fn is_pinned(&self, ppn: Ppn) -> bool {
        self.frames[ppn.as_usize()].pin_count > 0
    }

    /// 被钉住的帧数
    pub fn pinned_frames(&self) -> usize {
        self.pinned_frames
    }

    /// 是否所有帧都被钉住
    pub fn all_pinned(&self) -> bool {
        self.pinned_frames == self.frames.len()
    }

    /// 遍历所有有主的帧
    pub fn owned_frames(&self) -> impl Iterator<Item = (Ppn, FrameOwner)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter_map(|(ppn, info)| {
                info.owner.map(|owner| (Ppn::from_usize(ppn), owner))
            })
    }
}
