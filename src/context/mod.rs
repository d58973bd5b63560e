//! 上下文系统模块
//!
//! 提供环境状态的类型化键值存储以及用于门控命令可见性/启用状态的
//! 布尔 "when" 表达式求值器。

pub mod expression;
pub mod store;

pub use expression::ExpressionEvaluator;
pub use store::ContextStore;
