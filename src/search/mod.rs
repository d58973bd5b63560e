//! 命令搜索模块
//!
//! 为命令面板提供子序列模糊匹配与排序：
//! - 匹配：查询字符须按序出现在目标中（大小写不敏感）
//! - 评分：连续段数、词边界起始加成、匹配密度
//! - 排序：逐字段加权汇总，叠加最近使用/高频使用加成
//!
//! Levenshtein 编辑距离作为次级工具暴露，用于子序列匹配失败时的容错场景。

pub mod engine;
pub mod matcher;

pub use engine::SearchEngine;
pub use matcher::{fuzzy_match, levenshtein_distance, FuzzyMatch};
