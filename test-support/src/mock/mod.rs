//! Mock 实现模块
//!
//! 提供模拟机器和各类外部协作者的 Mock 实现，用于测试

pub mod arch;
pub mod machine;
pub mod section;
pub mod swap;
