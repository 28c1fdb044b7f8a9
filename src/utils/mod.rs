//! # 单元测试辅助
//!
//! 本模块提供单元测试中常用的断言宏
