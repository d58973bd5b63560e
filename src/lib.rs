//! 命令面板内核
//!
//! 面向编辑器类应用的命令执行内核，提供可注册、可校验、可检索的
//! 命令体系。主要功能包括：
//! - 命令注册与分类索引
//! - 参数校验与异步执行管线
//! - 上下文表达式门控与模糊搜索排序
//! - 宏录制/回放与快速选择/输入框交互代理

// 模块声明
pub mod context; // 上下文存储与表达式求值模块
pub mod error; // 统一错误处理模块
pub mod events; // 事件发射器模块
pub mod executor; // 命令执行管线模块
pub mod history; // 执行历史追踪模块
pub mod interaction; // 交互请求代理模块
pub mod macros; // 宏录制与回放模块
pub mod registry; // 命令注册表模块
pub mod search; // 命令搜索引擎模块
pub mod system; // 系统装配模块
pub mod types; // 共享数据模型模块
pub mod utils; // 工具模块
pub mod validator; // 参数校验模块

pub use context::{ContextStore, ExpressionEvaluator};
pub use error::{PaletteError, PaletteResult};
pub use events::{Disposable, Emitter};
pub use executor::Executor;
pub use history::{HistoryTracker, MAX_HISTORY};
pub use interaction::InteractionBroker;
pub use macros::MacroEngine;
pub use registry::CommandRegistry;
pub use search::{fuzzy_match, levenshtein_distance, FuzzyMatch, SearchEngine};
pub use system::CommandPaletteSystem;
pub use types::{
    handler_fn, sync_handler_fn, ArgumentSchema, ArgumentType, Command,
    CommandContext, CommandExecutedEvent, CommandHandler, CommandHistoryEntry,
    CommandRegisteredEvent, CommandResult, CommandSearchOptions, CommandSearchResult,
    CommandSource, ContextExpressionResult, ContextKey, ContextKeyType, InputBoxOptions,
    InputValidator, Macro, MacroRecordedEvent, MacroRunSummary, MacroStep, MacroStepOutcome,
    MatchField, Position, QuickPickItem, QuickPickOptions, QuickPickSelection,
    QuickPickShownEvent, SearchHighlights, SelectionRange, StepErrorPolicy, StepStatus,
    TriggerSource, ValidationRules,
};
pub use validator::ArgumentValidator;
