//! 模拟机器硬件接口 trait 定义
//!
//! 虚拟内存子系统运行在一台带软件管理 TLB 的模拟 CPU 上。
//! 寄存器、TLB 和物理内存都归模拟机器所有，这里只定义子系统需要的最小接口。

use crate::page_table::TranslationEntry;

/// 模拟机器接口
///
/// 此 trait 抽象了模拟机器的 TLB、物理内存和故障地址寄存器。
/// 内核启动代码为具体的模拟机器实现此 trait，并在创建
/// [`crate::MemoryManager`] 时传入。
pub trait Machine: Send + Sync {
    /// 页大小（字节）
    fn page_size(&self) -> usize;

    /// 物理帧数
    fn num_phys_pages(&self) -> usize;

    /// TLB 槽数
    fn tlb_size(&self) -> usize;

    /// 读取第 `index` 个 TLB 槽
    fn read_tlb_entry(&self, index: usize) -> TranslationEntry;

    /// 写入第 `index` 个 TLB 槽
    fn write_tlb_entry(&self, index: usize, entry: TranslationEntry);

    /// 从物理地址 `paddr` 读取 `buf.len()` 字节
    fn read_memory(&self, paddr: usize, buf: &mut [u8]);

    /// 向物理地址 `paddr` 写入 `buf`
    fn write_memory(&self, paddr: usize, buf: &[u8]);

    /// 读取最近一次 TLB 缺失的虚拟地址寄存器
    fn bad_vaddr(&self) -> usize;
}
