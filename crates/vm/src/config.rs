//! 虚拟内存子系统配置
//!
//! 页大小、物理帧数和 TLB 大小由模拟机器提供（见 [`crate::Machine`]），
//! 这里只保存内核自己的策略参数。

/// 用户栈默认页数
pub const DEFAULT_STACK_PAGES: usize = 8;

/// TLB 伪随机替换的默认种子
pub const DEFAULT_TLB_SEED: u64 = 0x5eed_0f_7eb;

/// 虚拟内存子系统配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// 每个进程的用户栈页数
    pub stack_pages: usize,
    /// TLB 伪随机替换的种子
    pub tlb_seed: u64,
}

impl VmConfig {
    /// 使用指定栈页数
    pub const fn with_stack_pages(mut self, stack_pages: usize) -> Self {
        self.stack_pages = stack_pages;
        self
    }

    /// 使用指定 TLB 替换种子
    pub const fn with_tlb_seed(mut self, tlb_seed: u64) -> Self {
        self.tlb_seed = tlb_seed;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_pages: DEFAULT_STACK_PAGES,
            tlb_seed: DEFAULT_TLB_SEED,
        }
    }
}
