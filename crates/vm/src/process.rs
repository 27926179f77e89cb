//! 按需分页的用户进程
//!
//! [`AddressSpace`] 是进程层（系统调用、异常处理）看到的地址空间能力接口。
//! [`VmProcess`] 是它的按需分页实现：加载时不分配任何帧，
//! 所有页面在第一次访问时由缺页处理装入。
//!
//! 参数页布局：页首是 `argc` 个小端 32 位指针，随后是以 NUL 结尾的参数字符串。

use crate::address::{Ppn, Vpn};
use crate::error::{VmError, VmResult};
use crate::manager::MemoryManager;
use crate::page_table::TranslationEntry;
use crate::pid::Pid;
use crate::section::{ExecSection, Executable, ProcessImage};
use alloc::string::String;
use alloc::sync::Arc;

/// 地址空间能力接口
pub trait AddressSpace {
    /// 虚拟页数
    fn num_pages(&self) -> usize;

    /// `vpn` 的翻译条目（副本）
    fn translation(&self, vpn: Vpn) -> VmResult<TranslationEntry>;

    /// 处理 `vpn` 上的缺页
    fn handle_fault(&self, vpn: Vpn) -> VmResult<Ppn>;

    /// 支撑 `vpn` 的可执行段及段内页号
    fn section_for(&self, vpn: Vpn) -> Option<(&Arc<dyn ExecSection>, usize)>;

    /// 从虚拟地址读取，返回读取的字节数
    fn read_virtual_memory(&self, vaddr: usize, buf: &mut [u8]) -> usize;

    /// 写入虚拟地址，返回写入的字节数
    fn write_virtual_memory(&self, vaddr: usize, buf: &[u8]) -> usize;

    /// 读取以 NUL 结尾的字符串
    fn read_virtual_string(&self, vaddr: usize, max_len: usize) -> Option<String>;
}

/// 按需分页的进程
///
/// 析构时释放所有帧和交换槽映射。
pub struct VmProcess {
    manager: Arc<MemoryManager>,
    pid: Pid,
    image: Arc<ProcessImage>,
    argc: usize,
    argv: usize,
}

impl VmProcess {
    /// 加载可执行文件并写入参数
    pub fn load(
        manager: Arc<MemoryManager>,
        executable: Executable,
        args: &[&str],
    ) -> VmResult<Self> {
        let image = Arc::new(ProcessImage::layout(
            executable,
            args,
            manager.page_size(),
            manager.config().stack_pages,
        )?);
        let pid = manager.register_process(image.clone());
        let argv = image.argv_vpn().start_addr(manager.page_size());
        let process = Self {
            manager,
            pid,
            image,
            argc: args.len(),
            argv,
        };
        process.write_arguments(args)?;
        log::debug!(
            "vm: loaded pid {}: {} pages, entry {:#x}, sp {:#x}",
            pid,
            process.num_pages(),
            process.initial_pc(),
            process.initial_sp()
        );
        Ok(process)
    }

    fn write_arguments(&self, args: &[&str]) -> VmResult<()> {
        let mut pointer = self.argv;
        let mut string = self.argv + args.len() * 4;
        for arg in args {
            let Some(address) = user_pointer(string) else {
                log::warn!("vm: argv {:#x} of pid {} exceeds u32", string, self.pid);
                return Err(VmError::ArgumentCopy);
            };
            if self.write_virtual_memory(pointer, &address) != address.len()
                || self.write_virtual_memory(string, arg.as_bytes()) != arg.len()
                || self.write_virtual_memory(string + arg.len(), &[0]) != 1
            {
                log::warn!("vm: copying arguments into pid {} failed", self.pid);
                return Err(VmError::ArgumentCopy);
            }
            pointer += 4;
            string += arg.len() + 1;
        }
        Ok(())
    }

    /// 进程标识
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 所属内存管理器
    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    /// 初始程序计数器
    pub fn initial_pc(&self) -> usize {
        self.image.entry_point()
    }

    /// 初始栈指针
    pub fn initial_sp(&self) -> usize {
        self.image.initial_sp()
    }

    /// 参数个数
    pub fn argc(&self) -> usize {
        self.argc
    }

    /// 参数指针数组的虚拟地址
    pub fn argv(&self) -> usize {
        self.argv
    }

    /// 处理 TLB 缺失，故障地址取自模拟机器的寄存器
    pub fn handle_tlb_miss(&self) -> VmResult<()> {
        let vaddr = self.manager.machine().bad_vaddr();
        self.manager.on_tlb_miss(self.pid, vaddr)
    }

    /// 上下文切换：离开 CPU
    pub fn save_state(&self) {
        self.manager.on_context_save(self.pid);
    }

    /// 上下文切换：回到 CPU
    pub fn restore_state(&self) {
        self.manager.on_context_restore(self.pid);
    }

    /// 钉住 `vpn` 所在帧
    pub fn pin(&self, vpn: Vpn) -> VmResult<Ppn> {
        self.manager.pin(self.pid, vpn)
    }

    /// 解除钉住
    pub fn unpin(&self, vpn: Vpn) -> VmResult<()> {
        self.manager.unpin(self.pid, vpn)
    }
}

impl AddressSpace for VmProcess {
    fn num_pages(&self) -> usize {
        self.image.num_pages()
    }

    fn translation(&self, vpn: Vpn) -> VmResult<TranslationEntry> {
        self.manager.translation(self.pid, vpn)
    }

    fn handle_fault(&self, vpn: Vpn) -> VmResult<Ppn> {
        self.manager.handle_fault(self.pid, vpn)
    }

    fn section_for(&self, vpn: Vpn) -> Option<(&Arc<dyn ExecSection>, usize)> {
        self.image.section_for(vpn)
    }

    fn read_virtual_memory(&self, vaddr: usize, buf: &mut [u8]) -> usize {
        self.manager.read_virtual_memory(self.pid, vaddr, buf)
    }

    fn write_virtual_memory(&self, vaddr: usize, buf: &[u8]) -> usize {
        self.manager.write_virtual_memory(self.pid, vaddr, buf)
    }

    fn read_virtual_string(&self, vaddr: usize, max_len: usize) -> Option<String> {
        self.manager.read_virtual_string(self.pid, vaddr, max_len)
    }
}

impl Drop for VmProcess {
    fn drop(&mut self) {
        self.manager.release_process(self.pid);
    }
}

/// 参数指针的小端 32 位编码，地址超出 32 位时返回 `None`
fn user_pointer(addr: usize) -> Option<[u8; 4]> {
    u32::try_from(addr).ok().map(u32::to_le_bytes)
}
