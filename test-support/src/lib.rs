//! 测试支持 crate
//!
//! 提供宿主机测试使用的 Mock 协作者。
//!
//! Mock 类型不依赖被测 crate（避免循环依赖），
//! 被测 crate 在 `cfg(test)` 下为这些类型实现自己的 trait。

pub mod mock;
