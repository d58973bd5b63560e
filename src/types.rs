//! 命令系统相关的类型定义
//!
//! 包含命令定义、参数模式、执行上下文与结果、宏、交互请求
//! 以及搜索选项等共享数据模型。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 当前时间戳（毫秒）
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ==================== 命令定义 ====================

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    File,
    Selection,
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::File => "file",
            Self::Selection => "selection",
        };
        write!(f, "{}", name)
    }
}

/// 自定义校验谓词，返回 Err(message) 表示失败
pub type CustomValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// 参数校验规则
///
/// 规则按字段声明顺序应用：pattern → min → max → min_length → max_length → custom，
/// 首个失败的规则终止该参数的后续检查。
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    /// 正则模式（仅字符串）
    pub pattern: Option<String>,
    /// 数值下界
    pub min: Option<f64>,
    /// 数值上界
    pub max: Option<f64>,
    /// 最小长度（字符串按字符计，数组按元素计）
    pub min_length: Option<usize>,
    /// 最大长度
    pub max_length: Option<usize>,
    /// 自定义校验谓词
    #[serde(skip)]
    pub custom: Option<CustomValidator>,
}

impl fmt::Debug for ValidationRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRules")
            .field("pattern", &self.pattern)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("custom", &self.custom.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// 命令参数模式
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentSchema {
    /// 参数名
    pub name: String,
    /// 参数类型
    #[serde(rename = "type")]
    pub arg_type: ArgumentType,
    /// 描述信息
    pub description: String,
    /// 是否必填
    pub required: bool,
    /// 缺省值（未提供时代入）
    pub default: Option<Value>,
    /// 枚举限定值
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    /// 校验规则
    pub validation: Option<ValidationRules>,
}

impl ArgumentSchema {
    /// 创建新的参数模式
    pub fn new(name: impl Into<String>, arg_type: ArgumentType, required: bool) -> Self {
        Self {
            name: name.into(),
            arg_type,
            description: String::new(),
            required,
            default: None,
            enum_values: None,
            validation: None,
        }
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 设置缺省值
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// 设置枚举限定值
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// 设置校验规则
    pub fn with_validation(mut self, validation: ValidationRules) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// 命令来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSource {
    Core,
    Extension,
    User,
    Workspace,
}

/// 命令处理器
///
/// 处理器接收已通过校验的位置参数表，返回结果值或失败。
/// 业务逻辑对内核不透明，校验完成前不得产生副作用。
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn invoke(&self, args: Vec<Value>) -> anyhow::Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn invoke(&self, args: Vec<Value>) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// 将异步闭包包装为命令处理器
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// 将同步闭包包装为命令处理器
pub fn sync_handler_fn<F>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    handler_fn(move |args| std::future::ready(f(args)))
}

/// 命令定义
///
/// 注册后由 CommandRegistry 独占持有；处理器闭包在注册表
/// 与进行中的执行之间共享所有权。
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// 全局唯一ID
    pub id: String,
    /// 显示标题
    pub title: String,
    /// 分类（缺省归入 "uncategorized"）
    pub category: Option<String>,
    /// 描述信息
    pub description: Option<String>,
    /// 图标（仅透传给展示层）
    pub icon: Option<String>,
    /// 搜索关键字
    pub keywords: Vec<String>,
    /// 参数模式（按位置顺序）
    pub arguments: Vec<ArgumentSchema>,
    /// 可用性上下文表达式
    pub when: Option<String>,
    /// 启用条件上下文表达式
    pub enablement: Option<String>,
    /// 处理器
    #[serde(skip)]
    pub handler: Arc<dyn CommandHandler>,
    /// 命令来源
    pub source: CommandSource,
}

impl Command {
    /// 创建新的命令定义
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: None,
            description: None,
            icon: None,
            keywords: Vec::new(),
            arguments: Vec::new(),
            when: None,
            enablement: None,
            handler,
            source: CommandSource::Core,
        }
    }

    /// 设置分类
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 设置图标
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// 设置关键字
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// 设置参数模式
    pub fn with_arguments(mut self, arguments: Vec<ArgumentSchema>) -> Self {
        self.arguments = arguments;
        self
    }

    /// 设置可用性表达式
    pub fn with_when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    /// 设置启用条件表达式
    pub fn with_enablement(mut self, enablement: impl Into<String>) -> Self {
        self.enablement = Some(enablement.into());
        self
    }

    /// 设置来源
    pub fn with_source(mut self, source: CommandSource) -> Self {
        self.source = source;
        self
    }

    /// 有效分类（缺省归入 uncategorized）
    pub fn effective_category(&self) -> &str {
        self.category.as_deref().unwrap_or("uncategorized")
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("category", &self.category)
            .field("arguments", &self.arguments.len())
            .field("source", &self.source)
            .finish()
    }
}

// ==================== 执行上下文与结果 ====================

/// 触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Palette,
    Keybinding,
    Menu,
    Api,
    Macro,
}

/// 文本位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// 选区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub start: Position,
    pub end: Position,
    pub text: Option<String>,
}

/// 命令执行上下文
///
/// 每次调用构造，随结果进入历史条目，不做其他保留。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandContext {
    /// 工作区ID
    pub workspace_id: Option<String>,
    /// 当前活跃文件
    pub active_file: Option<String>,
    /// 当前选区
    pub selection: Option<SelectionRange>,
    /// 自由变量表
    pub variables: HashMap<String, Value>,
    /// 触发来源
    pub triggered_by: TriggerSource,
}

impl CommandContext {
    /// 创建指定触发来源的最小上下文
    pub fn new(triggered_by: TriggerSource) -> Self {
        Self {
            workspace_id: None,
            active_file: None,
            selection: None,
            variables: HashMap::new(),
            triggered_by,
        }
    }

    /// API 调用的默认上下文
    pub fn api() -> Self {
        Self::new(TriggerSource::Api)
    }

    /// 设置变量
    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::api()
    }
}

/// 命令执行结果（产生后不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command_id: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// 执行耗时（毫秒）
    pub duration: u64,
    /// 完成时间戳（毫秒）
    pub timestamp: i64,
}

/// 命令执行历史条目
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandHistoryEntry {
    pub command_id: String,
    pub args: Vec<Value>,
    pub context: CommandContext,
    pub result: CommandResult,
    pub timestamp: i64,
}

// ==================== 上下文键 ====================

/// 上下文键类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKeyType {
    Boolean,
    String,
    Number,
    Array,
}

/// 上下文键
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextKey {
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub key_type: ContextKeyType,
}

/// 上下文表达式求值结果
///
/// 解析失败不抛错误：result 为 false，parse_error 携带原因。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextExpressionResult {
    pub expression: String,
    pub result: bool,
    /// 引用到的标识符，按首次出现顺序去重
    pub used_keys: Vec<String>,
    pub parse_error: Option<String>,
}

// ==================== 宏 ====================

/// 步骤失败策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepErrorPolicy {
    /// 中止剩余步骤，整个宏运行失败（默认）
    Stop,
    /// 跳到下一步，宏运行报告部分成功
    Continue,
    /// 同一步骤最多尝试 3 次，用尽后按 Stop 处理
    Retry,
}

impl Default for StepErrorPolicy {
    fn default() -> Self {
        Self::Stop
    }
}

/// 宏步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroStep {
    pub command_id: String,
    pub args: Vec<Value>,
    /// 每次重复调用前的延迟（毫秒）
    pub delay: Option<u64>,
    /// 步骤条件表达式，为假时跳过
    pub condition: Option<String>,
    /// 重复次数（默认 1）
    pub repeat_count: Option<u32>,
    pub on_error: Option<StepErrorPolicy>,
}

impl MacroStep {
    pub fn new(command_id: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            command_id: command_id.into(),
            args,
            delay: None,
            condition: None,
            repeat_count: None,
            on_error: None,
        }
    }

    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_repeat_count(mut self, repeat_count: u32) -> Self {
        self.repeat_count = Some(repeat_count);
        self
    }

    pub fn with_on_error(mut self, on_error: StepErrorPolicy) -> Self {
        self.on_error = Some(on_error);
        self
    }
}

/// 宏定义
///
/// 仅由停止录制产生；steps 在录制结束后不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macro {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<MacroStep>,
    pub enabled: bool,
    pub recorded_at: Option<i64>,
    pub last_run: Option<i64>,
    pub run_count: u64,
}

/// 宏步骤执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// 全部重复次数执行成功
    Executed,
    /// 条件为假被跳过
    Skipped,
    /// 执行失败（按策略处理后）
    Failed,
}

/// 单个步骤的执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroStepOutcome {
    pub step_index: usize,
    pub command_id: String,
    pub status: StepStatus,
    /// 实际调用处理器的次数（含重试）
    pub attempts: u32,
    pub error: Option<String>,
}

/// 宏运行汇总
///
/// run_macro 正常返回时调用方从这里获知部分失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroRunSummary {
    pub macro_id: String,
    pub steps_total: usize,
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 所有未跳过的步骤都成功
    pub success: bool,
    pub step_outcomes: Vec<MacroStepOutcome>,
}

// ==================== 交互请求 ====================

/// 快速选择项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickPickItem {
    pub label: String,
    pub description: Option<String>,
    pub detail: Option<String>,
    pub icon_path: Option<String>,
    pub picked: bool,
    /// 调用方自定义负载（通常是命令ID）
    pub data: Option<Value>,
}

impl QuickPickItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
            detail: None,
            icon_path: None,
            picked: false,
            data: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// 快速选择选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickPickOptions {
    pub title: Option<String>,
    pub placeholder: Option<String>,
    pub can_pick_many: bool,
    pub match_on_description: bool,
    pub match_on_detail: bool,
}

/// 快速选择的选中结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuickPickSelection {
    Single(QuickPickItem),
    Many(Vec<QuickPickItem>),
}

/// 输入框校验回调，返回 Some(message) 表示拒绝
pub type InputValidator = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// 输入框选项
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBoxOptions {
    pub title: Option<String>,
    pub placeholder: Option<String>,
    pub prompt: Option<String>,
    /// 预填值
    pub value: Option<String>,
    pub password: bool,
    /// 提交校验
    #[serde(skip)]
    pub validate_input: Option<InputValidator>,
}

impl fmt::Debug for InputBoxOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBoxOptions")
            .field("title", &self.title)
            .field("placeholder", &self.placeholder)
            .field("prompt", &self.prompt)
            .field("value", &self.value)
            .field("password", &self.password)
            .field("validate_input", &self.validate_input.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ==================== 搜索 ====================

/// 命令搜索选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSearchOptions {
    pub query: String,
    /// 结果数量上限（缺省不限）
    pub limit: Option<usize>,
    /// 限定分类
    pub categories: Option<Vec<String>>,
    /// 包含 when 表达式为假的命令
    pub include_disabled: bool,
    /// 最近使用加成
    pub prefer_recent: bool,
    /// 高频使用加成
    pub prefer_frequent: bool,
    /// 综合分数下限（默认 0：任何非零匹配都保留）
    pub fuzzy_threshold: f64,
}

impl CommandSearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            categories: None,
            include_disabled: false,
            prefer_recent: false,
            prefer_frequent: false,
            fuzzy_threshold: 0.0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn prefer_recent(mut self) -> Self {
        self.prefer_recent = true;
        self
    }

    pub fn prefer_frequent(mut self) -> Self {
        self.prefer_frequent = true;
        self
    }
}

/// 匹配命中的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Title,
    Category,
    Description,
    Keywords,
}

/// 匹配高亮区间（字符索引，仅用于展示）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHighlights {
    pub title: Vec<(usize, usize)>,
    pub category: Vec<(usize, usize)>,
    pub description: Vec<(usize, usize)>,
}

/// 命令搜索结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSearchResult {
    pub command: Command,
    pub score: f64,
    pub matched_on: Vec<MatchField>,
    pub highlights: SearchHighlights,
    pub recent_usage: Option<i64>,
    pub frequency: Option<u64>,
}

// ==================== 事件负载 ====================

/// 命令注册事件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRegisteredEvent {
    pub command: Command,
    pub source: CommandSource,
}

/// 命令执行事件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecutedEvent {
    pub command_id: String,
    pub args: Vec<Value>,
    pub result: CommandResult,
    pub context: CommandContext,
}

/// 宏录制完成事件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroRecordedEvent {
    pub macro_def: Macro,
}

/// 快速选择显示事件（由 UI 层消费）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickPickShownEvent {
    pub items: Vec<QuickPickItem>,
    pub options: QuickPickOptions,
}
