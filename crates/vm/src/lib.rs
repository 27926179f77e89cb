//! 虚拟内存子系统
//!
//! 为运行在模拟机器上的用户进程提供按需分页：缺页时装入页面，
//! 物理帧不足时以时钟（二次机会）算法换出页面到交换区，
//! 并在软件管理的 TLB 与每进程页表之间同步访问位和修改位。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与外部协作者解耦：
//! - [`Machine`]: TLB、物理内存和故障地址寄存器
//! - [`ExecSection`]: 可执行段加载器
//! - [`SwapFile`]: 交换文件
//!
//! 所有共享状态集中在显式构造的 [`MemoryManager`] 中，
//! 没有隐藏的全局变量。锁依赖 `sync` crate，使用前必须注册其 `ArchOps`。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod manager;
mod process;
mod tlb;

pub mod address;
pub mod config;
pub mod error;
pub mod frame_allocator;
pub mod frame_registry;
pub mod machine;
pub mod page_table;
pub mod pid;
pub mod section;
pub mod swap;

pub use address::{Ppn, Vpn, page_offset};
pub use config::{DEFAULT_STACK_PAGES, DEFAULT_TLB_SEED, VmConfig};
pub use error::{VmError, VmResult};
pub use frame_allocator::FrameAllocator;
pub use frame_registry::{FrameOwner, FrameRegistry};
pub use machine::Machine;
pub use manager::MemoryManager;
pub use page_table::{PageTable, PteFlags, TranslationEntry};
pub use pid::{Pid, PidAllocator};
pub use process::{AddressSpace, VmProcess};
pub use section::{ExecSection, Executable, ProcessImage, args_size};
pub use swap::{SwapFile, SwapStore};

#[cfg(test)]
mod tests;
