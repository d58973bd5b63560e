//! 命令注册表
//!
//! 维护命令ID到定义的映射与分类索引，注册与注销时发出事件。
//! 命令ID在任意时刻全局唯一；分类索引始终与当前注册集合一致。

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PaletteError, PaletteResult};
use crate::events::{Disposable, Emitter};
use crate::types::{Command, CommandRegisteredEvent};

/// 命令注册表
pub struct CommandRegistry {
    /// command_id -> Command
    commands: DashMap<String, Command>,
    /// category -> 该分类下的命令ID集合
    by_category: DashMap<String, BTreeSet<String>>,
    /// 命令注册事件
    pub on_command_registered: Emitter<CommandRegisteredEvent>,
    /// 命令注销事件（负载为命令ID）
    pub on_command_unregistered: Emitter<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: DashMap::new(),
            by_category: DashMap::new(),
            on_command_registered: Emitter::new(),
            on_command_unregistered: Emitter::new(),
        }
    }

    /// 注册命令
    ///
    /// ID冲突时返回 DuplicateCommand，已注册的命令不受影响。
    /// 返回的句柄负责注销这一条命令，重复释放是空操作。
    pub fn register_command(self: &Arc<Self>, command: Command) -> PaletteResult<Disposable> {
        let id = command.id.clone();

        // entry 占位保证检查与插入的原子性
        match self.commands.entry(id.clone()) {
            dashmap::Entry::Occupied(_) => {
                return Err(PaletteError::DuplicateCommand(id));
            }
            dashmap::Entry::Vacant(entry) => {
                let category = command.effective_category().to_string();
                let event = CommandRegisteredEvent {
                    command: command.clone(),
                    source: command.source,
                };
                entry.insert(command);

                self.by_category
                    .entry(category)
                    .or_default()
                    .insert(id.clone());

                debug!("命令已注册: {}", id);
                self.on_command_registered.fire(&event);
            }
        }

        let registry = Arc::downgrade(self);
        let disposable_id = id;
        Ok(Disposable::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.unregister_command(&disposable_id);
            }
        }))
    }

    /// 按顺序注册多个命令
    ///
    /// 中途失败时已注册的命令保持注册状态（不回滚），组合语义由调用方负责。
    pub fn register_commands(self: &Arc<Self>, commands: Vec<Command>) -> PaletteResult<Disposable> {
        let mut disposables = Vec::with_capacity(commands.len());
        for command in commands {
            disposables.push(self.register_command(command)?);
        }
        Ok(Disposable::from_many(disposables))
    }

    /// 注销命令
    ///
    /// ID不存在时为空操作，不报错。
    pub fn unregister_command(&self, command_id: &str) {
        let Some((id, command)) = self.commands.remove(command_id) else {
            return;
        };

        let category = command.effective_category().to_string();
        let mut remove_bucket = false;
        if let Some(mut bucket) = self.by_category.get_mut(&category) {
            bucket.remove(&id);
            remove_bucket = bucket.is_empty();
        }
        // 空桶随命令一起删除，保持索引与注册集合一致
        if remove_bucket {
            self.by_category.remove(&category);
        }

        debug!("命令已注销: {}", id);
        self.on_command_unregistered.fire(&id);
    }

    /// 检查命令是否存在
    pub fn has_command(&self, command_id: &str) -> bool {
        self.commands.contains_key(command_id)
    }

    /// 按ID获取命令
    pub fn get_command(&self, command_id: &str) -> Option<Command> {
        self.commands.get(command_id).map(|c| c.clone())
    }

    /// 获取所有命令
    pub fn get_all_commands(&self) -> Vec<Command> {
        self.commands.iter().map(|c| c.clone()).collect()
    }

    /// 获取指定分类下的命令
    pub fn get_commands_by_category(&self, category: &str) -> Vec<Command> {
        let Some(ids) = self.by_category.get(category) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.commands.get(id).map(|c| c.clone()))
            .collect()
    }

    /// 获取所有分类（排序后）
    pub fn get_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> =
            self.by_category.iter().map(|e| e.key().clone()).collect();
        categories.sort();
        categories
    }

    /// 当前注册的命令数量
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
