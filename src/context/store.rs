//! 上下文键值存储
//!
//! 环境状态（活跃文件、选区、自定义标志等）的类型化键值表。
//! 只保存当前值，不保留历史；变更时发出事件。

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::events::Emitter;
use crate::types::{ContextKey, ContextKeyType};

/// 从值推断上下文键类型
///
/// boolean/number/array 取对应标签，其余一律回退为 string（字符串转换兜底）。
pub fn infer_key_type(value: &Value) -> ContextKeyType {
    match value {
        Value::Bool(_) => ContextKeyType::Boolean,
        Value::Number(_) => ContextKeyType::Number,
        Value::Array(_) => ContextKeyType::Array,
        _ => ContextKeyType::String,
    }
}

/// 上下文存储
pub struct ContextStore {
    keys: DashMap<String, ContextKey>,
    /// 上下文变更事件
    pub on_context_changed: Emitter<ContextKey>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            on_context_changed: Emitter::new(),
        }
    }

    /// 设置上下文键
    ///
    /// 未声明类型时从值推断。
    pub fn set_context(&self, key: impl Into<String>, value: Value, key_type: Option<ContextKeyType>) {
        let key = key.into();
        let context_key = ContextKey {
            key: key.clone(),
            key_type: key_type.unwrap_or_else(|| infer_key_type(&value)),
            value,
        };

        debug!("上下文已更新: {}", key);
        self.keys.insert(key, context_key.clone());
        self.on_context_changed.fire(&context_key);
    }

    /// 获取上下文值
    pub fn get_context(&self, key: &str) -> Option<Value> {
        self.keys.get(key).map(|k| k.value.clone())
    }

    /// 获取完整的上下文键（含类型）
    pub fn get_context_key(&self, key: &str) -> Option<ContextKey> {
        self.keys.get(key).map(|k| k.clone())
    }

    /// 删除上下文键（不存在时为空操作）
    pub fn delete_context(&self, key: &str) {
        if self.keys.remove(key).is_some() {
            debug!("上下文已删除: {}", key);
        }
    }

    /// 当前键数量
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}
