//! 测试支持 crate
//!
//! 提供模拟机器、可执行段、交换文件等 Mock 实现

#![no_std]

extern crate alloc;

pub mod mock;
