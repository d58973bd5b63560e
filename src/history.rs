//! 命令执行历史追踪
//!
//! 有界的执行日志加上使用频率与最近使用时间计数。
//! 条目按执行完成顺序追加，超出上限时淘汰最旧一条。

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use crate::types::{CommandContext, CommandHistoryEntry, CommandResult};

/// 历史条目上限
pub const MAX_HISTORY: usize = 100;

#[derive(Default)]
struct HistoryState {
    /// 最旧在队首，最新在队尾
    entries: VecDeque<CommandHistoryEntry>,
    frequency: HashMap<String, u64>,
    last_used: HashMap<String, i64>,
}

/// 历史追踪器
pub struct HistoryTracker {
    state: RwLock<HistoryState>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HistoryState::default()),
        }
    }

    /// 记录一次执行（成功或失败都会计入频率与最近使用）
    pub fn record_execution(
        &self,
        command_id: &str,
        args: Vec<Value>,
        context: CommandContext,
        result: CommandResult,
    ) {
        let timestamp = result.timestamp;
        let entry = CommandHistoryEntry {
            command_id: command_id.to_string(),
            args,
            context,
            result,
            timestamp,
        };

        let mut state = self.state.write();
        state.entries.push_back(entry);
        if state.entries.len() > MAX_HISTORY {
            state.entries.pop_front();
        }

        *state.frequency.entry(command_id.to_string()).or_insert(0) += 1;
        state.last_used.insert(command_id.to_string(), timestamp);
    }

    /// 获取历史条目（最新在前）
    pub fn get_history(&self, limit: Option<usize>) -> Vec<CommandHistoryEntry> {
        let state = self.state.read();
        let iter = state.entries.iter().rev().cloned();
        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// 当前历史长度
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// 指定命令的累计执行次数
    pub fn get_command_frequency(&self, command_id: &str) -> u64 {
        self.state
            .read()
            .frequency
            .get(command_id)
            .copied()
            .unwrap_or(0)
    }

    /// 指定命令的最近使用时间戳
    pub fn get_last_used(&self, command_id: &str) -> Option<i64> {
        self.state.read().last_used.get(command_id).copied()
    }

    /// 最近使用的命令ID（去重，按最近使用时间降序）
    ///
    /// 追踪器不持有注册表，只返回ID；调用方经 CommandRegistry 解析为完整命令。
    pub fn get_recent_commands(&self, limit: usize) -> Vec<String> {
        let state = self.state.read();
        let mut pairs: Vec<(&String, &i64)> = state.last_used.iter().collect();
        // 时间相同按ID排序保证确定性
        pairs.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        pairs.into_iter().take(limit).map(|(id, _)| id.clone()).collect()
    }

    /// 高频命令ID（按频率降序，频率相同按最近使用降序）
    ///
    /// 同 get_recent_commands，ID由调用方经注册表解析。
    pub fn get_frequent_commands(&self, limit: usize) -> Vec<String> {
        let state = self.state.read();
        let mut pairs: Vec<(&String, &u64)> = state.frequency.iter().collect();
        pairs.sort_by(|a, b| {
            b.1.cmp(a.1)
                .then_with(|| {
                    let a_used = state.last_used.get(a.0).copied().unwrap_or(0);
                    let b_used = state.last_used.get(b.0).copied().unwrap_or(0);
                    b_used.cmp(&a_used)
                })
                .then_with(|| a.0.cmp(b.0))
        });
        pairs.into_iter().take(limit).map(|(id, _)| id.clone()).collect()
    }

    /// 清空历史与计数器
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.frequency.clear();
        state.last_used.clear();
    }
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new()
    }
}
