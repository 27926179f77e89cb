//! 页码抽象模块
//!
//! 此模块定义了虚拟页号 [`Vpn`] 和物理页号 [`Ppn`]。
//!
//! 页大小由模拟机器决定，因此所有与地址互相转换的方法都显式接收 `page_size`。

use core::fmt;

/// `impl_page_num!` 宏
/// ---------------------
/// 为给定的 newtype 生成与 usize 互相转换以及与地址互相转换的方法。
///
/// # 使用示例
/// ```ignore
/// #[repr(transparent)]
/// #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
/// pub struct MyPpn(usize);
/// impl_page_num!(MyPpn);
/// ```
macro_rules! impl_page_num {
    ($type:ty) => {
        impl $type {
            /// 从 usize 创建页号
            #[inline]
            pub const fn from_usize(value: usize) -> Self {
                Self(value)
            }

            /// 转换为 usize
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// 包含 `addr` 的页的页号（向下取整）
            #[inline]
            pub const fn from_addr(addr: usize, page_size: usize) -> Self {
                Self(addr / page_size)
            }

            /// 页的起始地址
            #[inline]
            pub const fn start_addr(self, page_size: usize) -> usize {
                self.0 * page_size
            }

            /// 页号加上 `offset` 页
            #[inline]
            pub const fn offset(self, offset: usize) -> Self {
                Self(self.0 + offset)
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

/// 虚拟页号（Virtual Page Number）
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
pub struct Vpn(usize);

/// 物理页号（Physical Page Number），即物理帧号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
pub struct Ppn(usize);

impl_page_num!(Vpn);
impl_page_num!(Ppn);

/// 地址在页内的偏移
#[inline]
pub const fn page_offset(addr: usize, page_size: usize) -> usize {
    addr % page_size
}
