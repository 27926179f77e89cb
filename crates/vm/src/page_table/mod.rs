//! 页表模块
//!
//! 本模块提供翻译条目 [`TranslationEntry`] 和每个进程一张的线性页表 [`PageTable`]。
//!
//! ## 所有权
//!
//! 页表独占其中的每个翻译条目。TLB 中缓存的只是条目的副本，
//! 同步回页表时只合并 `used` / `dirty` 两个位（见 [`TranslationEntry::merge_hw_bits`]），
//! 从不共享引用。
mod entry;
mod table;

pub use entry::*;
pub use table::*;
