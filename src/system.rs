//! 命令面板系统装配
//!
//! 唯一的组件拥有者：构造注册表、上下文存储、历史等单例，
//! 把 Arc 引用分发给执行器、搜索引擎、宏引擎与交互代理，
//! 注册内置命令并灌入默认上下文键。不使用全局状态。

use std::sync::{Arc, Weak};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::context::{ContextStore, ExpressionEvaluator};
use crate::error::{PaletteError, PaletteResult};
use crate::executor::Executor;
use crate::history::HistoryTracker;
use crate::interaction::InteractionBroker;
use crate::macros::MacroEngine;
use crate::registry::CommandRegistry;
use crate::search::SearchEngine;
use crate::types::{
    handler_fn, ArgumentSchema, ArgumentType, Command, CommandSearchOptions, CommandSearchResult,
    CommandSource, ContextExpressionResult, QuickPickItem, QuickPickOptions, QuickPickSelection,
};

/// 命令面板系统
pub struct CommandPaletteSystem {
    registry: Arc<CommandRegistry>,
    store: Arc<ContextStore>,
    evaluator: Arc<ExpressionEvaluator>,
    history: Arc<HistoryTracker>,
    executor: Arc<Executor>,
    search: Arc<SearchEngine>,
    macros: Arc<MacroEngine>,
    broker: Arc<InteractionBroker>,
}

impl CommandPaletteSystem {
    /// 构造并装配整个系统
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(CommandRegistry::new());
        let store = Arc::new(ContextStore::new());
        let evaluator = Arc::new(ExpressionEvaluator::new(Arc::clone(&store)));
        let history = Arc::new(HistoryTracker::new());
        let executor = Arc::new(Executor::new(
            Arc::clone(&registry),
            Arc::clone(&history),
            Arc::clone(&evaluator),
        ));
        let search = Arc::new(SearchEngine::new(
            Arc::clone(&registry),
            Arc::clone(&history),
            Arc::clone(&evaluator),
        ));
        let macros = Arc::new(MacroEngine::new(
            Arc::clone(&executor),
            Arc::clone(&store),
            Arc::clone(&evaluator),
        ));
        let broker = Arc::new(InteractionBroker::new());

        // 执行器 → 录制器使用弱引用，避免 Arc 环
        let recorder = Arc::downgrade(&macros);
        executor.set_recording_observer(Box::new(move |command_id, args| {
            if let Some(engine) = recorder.upgrade() {
                engine.observe(command_id, args);
            }
        }));

        let system = Arc::new(Self {
            registry,
            store,
            evaluator,
            history,
            executor,
            search,
            macros,
            broker,
        });
        system.seed_default_context();
        system.register_core_commands();
        info!("命令面板系统已装配");
        system
    }

    // ==================== 组件访问 ====================

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn context_store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<HistoryTracker> {
        &self.history
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn search_engine(&self) -> &Arc<SearchEngine> {
        &self.search
    }

    pub fn macro_engine(&self) -> &Arc<MacroEngine> {
        &self.macros
    }

    pub fn interaction(&self) -> &Arc<InteractionBroker> {
        &self.broker
    }

    // ==================== 便捷入口 ====================

    pub async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> PaletteResult<Value> {
        self.executor.execute_command(command_id, args).await
    }

    pub fn search_commands(&self, options: &CommandSearchOptions) -> Vec<CommandSearchResult> {
        self.search.search_commands(options)
    }

    pub fn set_context(&self, key: impl Into<String>, value: Value) {
        self.store.set_context(key, value, None);
    }

    pub fn evaluate_context_expression(&self, expression: &str) -> ContextExpressionResult {
        self.evaluator.evaluate(expression)
    }

    /// 命令面板流程：过滤可用命令，按最近/高频/标题排序，
    /// 经快速选择供用户挑选并执行
    pub async fn show_command_palette(&self) -> PaletteResult<Option<Value>> {
        let mut commands: Vec<Command> = self
            .registry
            .get_all_commands()
            .into_iter()
            .filter(|command| match &command.when {
                Some(when) => self.evaluator.evaluate(when).result,
                None => true,
            })
            .collect();

        commands.sort_by(|a, b| {
            let recency = |id: &str| self.history.get_last_used(id);
            let frequency = |id: &str| self.history.get_command_frequency(id);
            recency(&b.id)
                .cmp(&recency(&a.id))
                .then_with(|| frequency(&b.id).cmp(&frequency(&a.id)))
                .then_with(|| a.title.cmp(&b.title))
        });

        let items: Vec<QuickPickItem> = commands
            .iter()
            .map(|command| {
                let mut item = QuickPickItem::new(&command.title)
                    .with_data(json!(command.id));
                if let Some(category) = &command.category {
                    item = item.with_description(category.clone());
                }
                if let Some(description) = &command.description {
                    item = item.with_detail(description.clone());
                }
                item
            })
            .collect();

        let options = QuickPickOptions {
            title: None,
            placeholder: Some("输入命令名称".to_string()),
            can_pick_many: false,
            match_on_description: true,
            match_on_detail: false,
        };

        let Some(selection) = self.broker.show_quick_pick(items, options).await else {
            return Ok(None);
        };
        let item = match selection {
            QuickPickSelection::Single(item) => item,
            QuickPickSelection::Many(mut items) => match items.pop() {
                Some(item) => item,
                None => return Ok(None),
            },
        };
        let Some(Value::String(command_id)) = item.data else {
            return Ok(None);
        };

        self.executor
            .execute_command(&command_id, vec![])
            .await
            .map(Some)
    }

    // ==================== 初始装配 ====================

    /// 默认上下文键（平台标志与编辑器/面板/工作区初值）
    fn seed_default_context(&self) {
        let seed = |key: &str, value: Value| self.store.set_context(key, value, None);

        seed("isWindows", json!(cfg!(target_os = "windows")));
        seed("isMac", json!(cfg!(target_os = "macos")));
        seed("isLinux", json!(cfg!(target_os = "linux")));

        seed("editorFocus", json!(false));
        seed("editorReadonly", json!(false));
        seed("editorHasSelection", json!(false));
        seed("panelVisible", json!(false));
        seed("sidebarVisible", json!(true));
        seed("workspaceOpen", json!(false));
        seed("activeFileType", json!(""));
        seed("recordingMacro", json!(false));
    }

    /// 注册内置命令；处理器持有系统的弱引用
    fn register_core_commands(self: &Arc<Self>) {
        let commands = vec![
            self.core_show_commands(),
            self.core_start_recording(),
            self.core_stop_recording(),
            self.core_play_last(),
            self.core_repeat_last(),
            self.core_clear_history(),
        ];
        if let Err(err) = self.registry.register_commands(commands) {
            warn!("内置命令注册失败: {}", err);
        }
    }

    fn core_show_commands(self: &Arc<Self>) -> Command {
        let system: Weak<Self> = Arc::downgrade(self);
        Command::new(
            "workbench.action.showCommands",
            "Show All Commands",
            handler_fn(move |_| {
                let system = system.clone();
                async move {
                    let system = system.upgrade().ok_or_else(system_released)?;
                    let value = system.show_command_palette().await?;
                    Ok(value.unwrap_or(Value::Null))
                }
            }),
        )
        .with_category("View")
        .with_description("打开命令面板")
        .with_source(CommandSource::Core)
    }

    fn core_start_recording(self: &Arc<Self>) -> Command {
        let macros = Arc::downgrade(&self.macros);
        Command::new(
            "macro.startRecording",
            "Start Macro Recording",
            handler_fn(move |args| {
                let macros = macros.clone();
                async move {
                    let macros = macros.upgrade().ok_or_else(system_released)?;
                    let macro_id = match args.first() {
                        Some(Value::String(id)) => id.clone(),
                        _ => format!("macro-{}", uuid::Uuid::new_v4()),
                    };
                    macros.start_recording_macro(&macro_id)?;
                    Ok(json!(macro_id))
                }
            }),
        )
        .with_category("Macros")
        .with_when("!recordingMacro")
        .with_source(CommandSource::Core)
    }

    fn core_stop_recording(self: &Arc<Self>) -> Command {
        let macros = Arc::downgrade(&self.macros);
        Command::new(
            "macro.stopRecording",
            "Stop Macro Recording",
            handler_fn(move |args| {
                let macros = macros.clone();
                async move {
                    let macros = macros.upgrade().ok_or_else(system_released)?;
                    let Some(Value::String(name)) = args.first().cloned() else {
                        return Err(anyhow::anyhow!("需要宏名称"));
                    };
                    let recorded = macros.stop_recording_macro(&name, None)?;
                    Ok(serde_json::to_value(recorded)?)
                }
            }),
        )
        .with_category("Macros")
        .with_when("recordingMacro")
        .with_arguments(vec![ArgumentSchema::new(
            "name",
            ArgumentType::String,
            true,
        )])
        .with_source(CommandSource::Core)
    }

    fn core_play_last(self: &Arc<Self>) -> Command {
        let macros = Arc::downgrade(&self.macros);
        Command::new(
            "macro.playLast",
            "Play Last Macro",
            handler_fn(move |_| {
                let macros = macros.clone();
                async move {
                    let macros = macros.upgrade().ok_or_else(system_released)?;
                    let Some(macro_id) = macros.last_macro_id() else {
                        return Err(anyhow::anyhow!("没有可回放的宏"));
                    };
                    let summary = macros.run_macro(&macro_id, None).await?;
                    Ok(serde_json::to_value(summary)?)
                }
            }),
        )
        .with_category("Macros")
        .with_source(CommandSource::Core)
    }

    fn core_repeat_last(self: &Arc<Self>) -> Command {
        let system: Weak<Self> = Arc::downgrade(self);
        Command::new(
            "workbench.action.repeatLastCommand",
            "Repeat Last Command",
            handler_fn(move |_| {
                let system = system.clone();
                async move {
                    let system = system.upgrade().ok_or_else(system_released)?;
                    let Some(entry) = system
                        .history
                        .get_history(None)
                        .into_iter()
                        .find(|entry| entry.command_id != "workbench.action.repeatLastCommand")
                    else {
                        return Err(anyhow::anyhow!("没有可重复的命令"));
                    };
                    let value = system
                        .executor
                        .execute_command(&entry.command_id, entry.args)
                        .await?;
                    Ok(value)
                }
            }),
        )
        .with_category("View")
        .with_source(CommandSource::Core)
    }

    fn core_clear_history(self: &Arc<Self>) -> Command {
        let history = Arc::downgrade(&self.history);
        Command::new(
            "workbench.action.clearCommandHistory",
            "Clear Command History",
            handler_fn(move |_| {
                let history = history.clone();
                async move {
                    let history = history.upgrade().ok_or_else(system_released)?;
                    history.clear();
                    Ok(Value::Null)
                }
            }),
        )
        .with_category("View")
        .with_source(CommandSource::Core)
    }
}

fn system_released() -> anyhow::Error {
    anyhow::Error::from(PaletteError::Internal("系统已释放".to_string()))
}
