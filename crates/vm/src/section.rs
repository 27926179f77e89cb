//! 可执行段与进程地址空间布局
//!
//! 可执行文件由若干段组成，每段覆盖从 `first_vpn` 开始的连续若干页。
//! 段加载器是只读、可随机访问的：任何一页都可以在任意时刻按需重新加载。
//!
//! ## 地址空间布局
//!
//! ```text
//! 0                     section_pages         section_pages + stack_pages
//! +---------------------+---------------------+----------+
//! |  代码 / 数据段       |       用户栈         | 参数页    |
//! +---------------------+---------------------+----------+
//! ```
//!
//! 初始栈指针位于栈顶（参数页起始地址）。

use crate::address::Vpn;
use crate::error::{VmError, VmResult};
use alloc::sync::Arc;
use alloc::vec::Vec;

/// 可执行段接口
///
/// 段的元数据在进程加载时提供，此后不可变。
pub trait ExecSection: Send + Sync {
    /// 段名（用于日志）
    fn name(&self) -> &str;

    /// 段的首个虚拟页号
    fn first_vpn(&self) -> usize;

    /// 段的页数
    fn num_pages(&self) -> usize;

    /// 段是否只读
    fn is_read_only(&self) -> bool;

    /// 把段内第 `spn` 页的内容写入 `buf`（长度为一页）
    fn load_page(&self, spn: usize, buf: &mut [u8]) -> Result<(), isize>;
}

/// 可执行文件：段列表和入口地址
#[derive(Clone)]
pub struct Executable {
    sections: Vec<Arc<dyn ExecSection>>,
    entry_point: usize,
}

impl Executable {
    /// 创建可执行文件
    pub fn new(sections: Vec<Arc<dyn ExecSection>>, entry_point: usize) -> Self {
        Self {
            sections,
            entry_point,
        }
    }
}

/// 参数块占用的字节数：每个参数一个 4 字节指针，外加字符串和结尾的 NUL
pub fn args_size(args: &[&str]) -> usize {
    args.iter().map(|arg| 4 + arg.len() + 1).sum()
}

/// 进程地址空间布局
pub struct ProcessImage {
    sections: Vec<Arc<dyn ExecSection>>,
    entry_point: usize,
    section_pages: usize,
    stack_pages: usize,
    page_size: usize,
}

impl ProcessImage {
    /// 根据可执行文件和参数计算地址空间布局
    ///
    /// 段必须从 0 页开始且彼此连续；参数块必须能放入一页。
    pub fn layout(
        executable: Executable,
        args: &[&str],
        page_size: usize,
        stack_pages: usize,
    ) -> VmResult<Self> {
        let mut section_pages = 0;
        for section in &executable.sections {
            if section.first_vpn() != section_pages {
                log::warn!("vm: fragmented executable at section {}", section.name());
                return Err(VmError::FragmentedExecutable);
            }
            section_pages += section.num_pages();
        }

        if args_size(args) > page_size {
            log::warn!("vm: arguments too long");
            return Err(VmError::ArgumentsTooLong);
        }

        Ok(Self {
            sections: executable.sections,
            entry_point: executable.entry_point,
            section_pages,
            stack_pages,
            page_size,
        })
    }

    /// 总虚拟页数：段 + 栈 + 一页参数
    pub fn num_pages(&self) -> usize {
        self.section_pages + self.stack_pages + 1
    }

    /// 段占用的页数
    pub fn section_pages(&self) -> usize {
        self.section_pages
    }

    /// 程序入口
    pub fn entry_point(&self) -> usize {
        self.entry_point
    }

    /// 初始栈指针
    pub fn initial_sp(&self) -> usize {
        (self.section_pages + self.stack_pages) * self.page_size
    }

    /// 参数页的虚拟页号
    pub fn argv_vpn(&self) -> Vpn {
        Vpn::from_usize(self.num_pages() - 1)
    }

    /// 查找支撑 `vpn` 的段及段内页号
    pub fn section_for(&self, vpn: Vpn) -> Option<(&Arc<dyn ExecSection>, usize)> {
        let vpn = vpn.as_usize();
        self.sections.iter().find_map(|section| {
            let first = section.first_vpn();
            let pages = first..first + section.num_pages();
            pages.contains(&vpn).then(|| (section, vpn - first))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use test_support::mock::section::MockSection;

    fn exe(sections: Vec<MockSection>) -> Executable {
        Executable::new(
            sections
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn ExecSection>)
                .collect(),
            0x40,
        )
    }

    #[test]
    fn test_layout_pages_and_sp() {
        let image = ProcessImage::layout(
            exe(vec![
                MockSection::new(".text", 0, 2, true, 0x10),
                MockSection::new(".data", 2, 1, false, 0x20),
            ]),
            &["prog"],
            1024,
            8,
        )
        .unwrap();
        assert_eq!(image.section_pages(), 3);
        assert_eq!(image.num_pages(), 12);
        assert_eq!(image.initial_sp(), 11 * 1024);
        assert_eq!(image.argv_vpn(), Vpn::from_usize(11));
        assert_eq!(image.entry_point(), 0x40);
    }

    #[test]
    fn test_section_for() {
        let image = ProcessImage::layout(
            exe(vec![
                MockSection::new(".text", 0, 2, true, 0x10),
                MockSection::new(".data", 2, 1, false, 0x20),
            ]),
            &[],
            1024,
            8,
        )
        .unwrap();
        let (section, spn) = image.section_for(Vpn::from_usize(1)).unwrap();
        assert_eq!(section.name(), ".text");
        assert_eq!(spn, 1);
        let (section, spn) = image.section_for(Vpn::from_usize(2)).unwrap();
        assert_eq!(section.name(), ".data");
        assert_eq!(spn, 0);
        assert!(image.section_for(Vpn::from_usize(3)).is_none());
    }

    // 段必须从 0 开始并连续
    #[test]
    fn test_fragmented_executable() {
        let result = ProcessImage::layout(
            exe(vec![MockSection::new(".text", 1, 2, true, 0)]),
            &[],
            1024,
            8,
        );
        assert!(matches!(result, Err(VmError::FragmentedExecutable)));
    }

    #[test]
    fn test_arguments_too_long() {
        let long = "x".repeat(60);
        let args = [long.as_str(); 3];
        assert_eq!(args_size(&args), 3 * 65);
        let result = ProcessImage::layout(exe(vec![]), &args, 128, 8);
        assert!(matches!(result, Err(VmError::ArgumentsTooLong)));
        assert!(ProcessImage::layout(exe(vec![]), &args, 256, 8).is_ok());
    }
}
