//! 命令系统统一错误处理
//!
//! 提供一致的错误类型定义和转换机制。注册与校验类错误同步抛给调用方，
//! 不会进入执行历史；处理器错误先记录历史再原样向上传播。

use thiserror::Error;

/// 命令系统统一错误类型
#[derive(Debug, Error)]
pub enum PaletteError {
    /// 命令不存在
    #[error("命令不存在: {0}")]
    UnknownCommand(String),

    /// 命令ID重复注册
    #[error("命令已注册: {0}")]
    DuplicateCommand(String),

    /// 命令在当前上下文中不可用（when 表达式为假）
    #[error("命令在当前上下文中不可用: {0}")]
    CommandNotAvailable(String),

    /// 命令未启用（enablement 表达式为假）
    #[error("命令未启用: {0}")]
    CommandDisabled(String),

    /// 缺少必填参数
    #[error("命令 '{command_id}' 缺少必填参数 '{name}'")]
    MissingArgument { command_id: String, name: String },

    /// 参数类型不匹配
    #[error("参数 '{name}' 类型错误: 期望 {expected}, 实际 {actual}")]
    ArgumentType {
        name: String,
        expected: String,
        actual: String,
    },

    /// 参数不在枚举范围内
    #[error("参数 '{name}' 的值不在允许范围内: {value}")]
    ArgumentEnum { name: String, value: String },

    /// 参数校验规则失败
    #[error("参数 '{name}' 校验失败 ({rule}): {message}")]
    ArgumentValidation {
        name: String,
        rule: String,
        message: String,
    },

    /// 处理器执行失败（保留原始错误）
    #[error("命令 '{command_id}' 执行失败: {error}")]
    Handler {
        command_id: String,
        error: anyhow::Error,
    },

    /// 当前没有正在录制的宏
    #[error("当前没有正在录制的宏")]
    NotRecording,

    /// 已有宏在录制中
    #[error("已有宏在录制中: {0}")]
    AlreadyRecording(String),

    /// 宏不存在
    #[error("宏不存在: {0}")]
    MacroNotFound(String),

    /// 宏已禁用
    #[error("宏已禁用: {0}")]
    MacroDisabled(String),

    /// 内部错误（组件已释放等）
    #[error("内部错误: {0}")]
    Internal(String),
}

impl PaletteError {
    /// 创建缺少参数错误
    pub fn missing_argument(command_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingArgument {
            command_id: command_id.into(),
            name: name.into(),
        }
    }

    /// 创建参数类型错误
    pub fn argument_type(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ArgumentType {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// 创建参数校验错误
    pub fn argument_validation(
        name: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ArgumentValidation {
            name: name.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// 创建处理器错误
    pub fn handler(command_id: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Handler {
            command_id: command_id.into(),
            error,
        }
    }

    /// 是否属于校验类错误（从不进入执行历史）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingArgument { .. }
                | Self::ArgumentType { .. }
                | Self::ArgumentEnum { .. }
                | Self::ArgumentValidation { .. }
        )
    }

    /// 获取错误类别（用于日志与统计）
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::DuplicateCommand(_) => "duplicate_command",
            Self::CommandNotAvailable(_) => "not_available",
            Self::CommandDisabled(_) => "disabled",
            Self::MissingArgument { .. } => "missing_argument",
            Self::ArgumentType { .. } => "argument_type",
            Self::ArgumentEnum { .. } => "argument_enum",
            Self::ArgumentValidation { .. } => "argument_validation",
            Self::Handler { .. } => "handler",
            Self::NotRecording => "not_recording",
            Self::AlreadyRecording(_) => "already_recording",
            Self::MacroNotFound(_) => "macro_not_found",
            Self::MacroDisabled(_) => "macro_disabled",
            Self::Internal(_) => "internal",
        }
    }
}

/// 结果类型别名
pub type PaletteResult<T> = Result<T, PaletteError>;
