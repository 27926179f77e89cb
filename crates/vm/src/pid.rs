//! 进程标识与分配器

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 进程标识
///
/// 内存管理器以它为键索引进程的页表，反向页表也只保存它而不保存引用。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Pid(usize);

impl Pid {
    /// 从 usize 创建
    pub const fn from_usize(value: usize) -> Self {
        Self(value)
    }

    /// 转换为 usize
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 简单的进程ID分配器。
/// 每次调用 `allocate` 返回唯一的进程ID，从 1 开始递增，不回收。
#[derive(Debug)]
pub struct PidAllocator {
    next_pid: AtomicUsize,
}

impl PidAllocator {
    /// 创建一个新的PidAllocator实例。
    pub const fn new() -> Self {
        PidAllocator {
            next_pid: AtomicUsize::new(1),
        }
    }

    /// 分配一个新的进程ID。
    pub fn allocate(&self) -> Pid {
        Pid(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 顺序分配测试：检查分配值从1开始并依次递增
    #[test]
    fn test_pid_allocate_sequence() {
        let alloc = PidAllocator::new();
        assert_eq!(alloc.allocate(), Pid::from_usize(1));
        assert_eq!(alloc.allocate(), Pid::from_usize(2));
        assert_eq!(alloc.allocate(), Pid::from_usize(3));
    }
}
