//! 可执行段加载器的 Mock 实现
//!
//! 每页内容由 `fill` 和页内偏移决定，便于断言页面来源。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 的可执行段
pub struct MockSection {
    pub name: &'static str,
    pub first_vpn: usize,
    pub num_pages: usize,
    pub read_only: bool,
    pub fill: u8,
    loads: AtomicUsize,
    fail: AtomicBool,
}

impl MockSection {
    pub const fn new(
        name: &'static str,
        first_vpn: usize,
        num_pages: usize,
        read_only: bool,
        fill: u8,
    ) -> Self {
        Self {
            name,
            first_vpn,
            num_pages,
            read_only,
            fill,
            loads: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// 段内第 `spn` 页的填充字节
    pub fn page_byte(&self, spn: usize) -> u8 {
        self.fill.wrapping_add(spn as u8)
    }

    pub fn load_page(&self, spn: usize, buf: &mut [u8]) -> Result<(), isize> {
        if self.fail.load(Ordering::Relaxed) || spn >= self.num_pages {
            return Err(-5);
        }
        self.loads.fetch_add(1, Ordering::Relaxed);
        buf.fill(self.page_byte(spn));
        Ok(())
    }

    /// 已加载的页数
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}
