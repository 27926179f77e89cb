//! 虚拟内存错误类型

use crate::address::Vpn;
use crate::pid::Pid;
use core::fmt;

/// 虚拟内存操作中可能发生的错误
///
/// 帧耗尽不在其中：分配器通过阻塞等待解决，从不作为错误返回。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 虚拟页号超出进程页表范围
    AddressFault {
        /// 越界的虚拟页号
        vpn: Vpn,
    },
    /// 进程未在内存管理器中注册
    UnknownProcess(Pid),
    /// 交换文件读写失败
    BackingStore {
        /// 出错的交换槽
        slot: usize,
    },
    /// 换入时找不到交换槽（内部不变式被破坏）
    MissingSwapSlot {
        /// 所属进程
        pid: Pid,
        /// 虚拟页号
        vpn: Vpn,
    },
    /// 可执行段加载失败
    SectionLoad {
        /// 正在加载的虚拟页号
        vpn: Vpn,
    },
    /// 可执行文件的段不连续或不从 0 页开始
    FragmentedExecutable,
    /// 参数无法放入一页
    ArgumentsTooLong,
    /// 参数写入用户内存不完整
    ArgumentCopy,
}

impl VmError {
    /// 该错误是否导致请求进程终止
    ///
    /// 加载阶段的错误只会使 exec 失败，不影响已存在的进程。
    pub fn is_fatal_to_process(&self) -> bool {
        matches!(
            self,
            VmError::AddressFault { .. }
                | VmError::BackingStore { .. }
                | VmError::MissingSwapSlot { .. }
                | VmError::SectionLoad { .. }
        )
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::AddressFault { vpn } => write!(f, "address fault at vpn {}", vpn),
            VmError::UnknownProcess(pid) => write!(f, "unknown process {}", pid),
            VmError::BackingStore { slot } => write!(f, "swap I/O failed at slot {}", slot),
            VmError::MissingSwapSlot { pid, vpn } => {
                write!(f, "no swap slot for pid {} vpn {}", pid, vpn)
            }
            VmError::SectionLoad { vpn } => write!(f, "section load failed at vpn {}", vpn),
            VmError::FragmentedExecutable => write!(f, "fragmented executable"),
            VmError::ArgumentsTooLong => write!(f, "arguments too long"),
            VmError::ArgumentCopy => write!(f, "failed to copy arguments"),
        }
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
