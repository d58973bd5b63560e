//! 命令执行管线
//!
//! 查找 → 可用性/启用门控 → 参数校验 → 计时执行处理器。
//! 每次处理器完成（无论成败）都会写入历史并触发执行事件，
//! 处理器错误在落史之后原样向上传播。

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ExpressionEvaluator;
use crate::error::{PaletteError, PaletteResult};
use crate::events::{Disposable, Emitter};
use crate::history::HistoryTracker;
use crate::registry::CommandRegistry;
use crate::types::{now_millis, CommandContext, CommandExecutedEvent, CommandResult};
use crate::validator::ArgumentValidator;

/// 宏录制控制命令本身不进入录制缓冲
const RECORDING_CONTROL_COMMANDS: [&str; 3] = [
    "macro.startRecording",
    "macro.stopRecording",
    "macro.cancelRecording",
];

/// 录制观察者：接收每次完成的命令调用（最终参数）
pub type RecordingObserver = Box<dyn Fn(&str, &[Value]) + Send + Sync>;

/// 命令执行器
pub struct Executor {
    registry: Arc<CommandRegistry>,
    history: Arc<HistoryTracker>,
    evaluator: Arc<ExpressionEvaluator>,
    on_command_executed: Emitter<CommandExecutedEvent>,
    recording_observer: RwLock<Option<RecordingObserver>>,
}

impl Executor {
    pub fn new(
        registry: Arc<CommandRegistry>,
        history: Arc<HistoryTracker>,
        evaluator: Arc<ExpressionEvaluator>,
    ) -> Self {
        Self {
            registry,
            history,
            evaluator,
            on_command_executed: Emitter::new(),
            recording_observer: RwLock::new(None),
        }
    }

    /// 订阅命令执行事件（成功与失败都会触发）
    pub fn on_command_executed(
        &self,
        listener: impl Fn(&CommandExecutedEvent) + Send + Sync + 'static,
    ) -> Disposable {
        self.on_command_executed.subscribe(listener)
    }

    /// 设置宏录制观察者（由系统装配时注入）
    pub fn set_recording_observer(&self, observer: RecordingObserver) {
        *self.recording_observer.write() = Some(observer);
    }

    /// 以 API 默认上下文执行命令
    pub async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> PaletteResult<Value> {
        self.execute_command_with_context(command_id, CommandContext::api(), args)
            .await
    }

    /// 以指定上下文执行命令
    pub async fn execute_command_with_context(
        &self,
        command_id: &str,
        context: CommandContext,
        args: Vec<Value>,
    ) -> PaletteResult<Value> {
        let command = self
            .registry
            .get_command(command_id)
            .ok_or_else(|| PaletteError::UnknownCommand(command_id.to_string()))?;

        // when/enablement 门控在校验之前，失败不落史（没有执行结果可言）
        if let Some(when) = &command.when {
            if !self.evaluator.evaluate(when).result {
                warn!("命令不可用: {} (when='{}')", command_id, when);
                return Err(PaletteError::CommandNotAvailable(command_id.to_string()));
            }
        }
        if let Some(enablement) = &command.enablement {
            if !self.evaluator.evaluate(enablement).result {
                warn!("命令未启用: {} (enablement='{}')", command_id, enablement);
                return Err(PaletteError::CommandDisabled(command_id.to_string()));
            }
        }

        // 校验失败同步抛出，处理器不会被调用
        let final_args = ArgumentValidator::validate(&command, &args)?;

        debug!("执行命令: {} (args={})", command_id, final_args.len());
        let start = Instant::now();
        let outcome = command.handler.invoke(final_args.clone()).await;
        let duration = start.elapsed().as_millis() as u64;
        let timestamp = now_millis();

        let result = match &outcome {
            Ok(value) => CommandResult {
                command_id: command_id.to_string(),
                success: true,
                result: Some(value.clone()),
                error: None,
                duration,
                timestamp,
            },
            Err(err) => CommandResult {
                command_id: command_id.to_string(),
                success: false,
                result: None,
                error: Some(err.to_string()),
                duration,
                timestamp,
            },
        };

        // 无论成败都先落史、触发事件，再向调用方返回
        self.history
            .record_execution(command_id, final_args.clone(), context.clone(), result.clone());
        self.on_command_executed.fire(&CommandExecutedEvent {
            command_id: command_id.to_string(),
            args: final_args.clone(),
            result,
            context,
        });
        self.notify_recorder(command_id, &final_args);

        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!("命令执行失败: {}: {}", command_id, err);
                Err(PaletteError::handler(command_id, err))
            }
        }
    }

    /// 通知宏录制器（录制控制命令本身除外）
    fn notify_recorder(&self, command_id: &str, args: &[Value]) {
        if RECORDING_CONTROL_COMMANDS.contains(&command_id) {
            return;
        }
        if let Some(observer) = self.recording_observer.read().as_ref() {
            observer(command_id, args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStore;
    use crate::types::{
        handler_fn, sync_handler_fn, ArgumentSchema, ArgumentType, Command, TriggerSource,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        registry: Arc<CommandRegistry>,
        history: Arc<HistoryTracker>,
        store: Arc<ContextStore>,
        executor: Executor,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(CommandRegistry::new());
        let history = Arc::new(HistoryTracker::new());
        let store = Arc::new(ContextStore::new());
        let evaluator = Arc::new(ExpressionEvaluator::new(Arc::clone(&store)));
        let executor = Executor::new(Arc::clone(&registry), Arc::clone(&history), evaluator);
        Fixture {
            registry,
            history,
            store,
            executor,
        }
    }

    fn echo_command() -> Command {
        Command::new(
            "echo",
            "Echo Text",
            sync_handler_fn(|args| Ok(args.into_iter().next().unwrap_or(json!(null)))),
        )
        .with_arguments(vec![ArgumentSchema::new(
            "text",
            ArgumentType::String,
            true,
        )])
    }

    #[tokio::test]
    async fn test_echo_executes_and_records() {
        let f = fixture();
        f.registry.register_command(echo_command()).unwrap();

        let value = f
            .executor
            .execute_command("echo", vec![json!("hi")])
            .await
            .unwrap();
        assert_eq!(value, json!("hi"));

        let history = f.history.get_history(None);
        assert_eq!(history.len(), 1);
        assert!(history[0].result.success);
        assert_eq!(history[0].result.result, Some(json!("hi")));
        assert_eq!(history[0].context.triggered_by, TriggerSource::Api);
    }

    #[tokio::test]
    async fn test_unknown_command_records_nothing() {
        let f = fixture();
        let err = f.executor.execute_command("missing", vec![]).await;
        assert!(matches!(err, Err(PaletteError::UnknownCommand(_))));
        assert!(f.history.get_history(None).is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_skips_handler() {
        let f = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let command = Command::new(
            "strict",
            "Strict Command",
            handler_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok(json!(null)))
            }),
        )
        .with_arguments(vec![ArgumentSchema::new(
            "name",
            ArgumentType::String,
            true,
        )]);
        f.registry.register_command(command).unwrap();

        let err = f.executor.execute_command("strict", vec![]).await;
        assert!(matches!(err, Err(PaletteError::MissingArgument { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "处理器不应被调用");
        assert!(f.history.get_history(None).is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_recorded_then_propagated() {
        let f = fixture();
        f.registry
            .register_command(Command::new(
                "boom",
                "Boom",
                sync_handler_fn(|_| Err(anyhow::anyhow!("炸了"))),
            ))
            .unwrap();

        let err = f.executor.execute_command("boom", vec![]).await;
        assert!(matches!(err, Err(PaletteError::Handler { .. })));

        let history = f.history.get_history(None);
        assert_eq!(history.len(), 1);
        assert!(!history[0].result.success);
        assert_eq!(history[0].result.error.as_deref(), Some("炸了"));
    }

    #[tokio::test]
    async fn test_when_and_enablement_gates() {
        let f = fixture();
        f.registry
            .register_command(
                Command::new("gated", "Gated", sync_handler_fn(|_| Ok(json!(null))))
                    .with_when("panelVisible")
                    .with_enablement("editorFocus"),
            )
            .unwrap();

        let err = f.executor.execute_command("gated", vec![]).await;
        assert!(matches!(err, Err(PaletteError::CommandNotAvailable(_))));

        f.store.set_context("panelVisible", json!(true), None);
        let err = f.executor.execute_command("gated", vec![]).await;
        assert!(matches!(err, Err(PaletteError::CommandDisabled(_))));

        f.store.set_context("editorFocus", json!(true), None);
        assert!(f.executor.execute_command("gated", vec![]).await.is_ok());
        // 门控失败的两次尝试都不落史
        assert_eq!(f.history.get_history(None).len(), 1);
    }

    #[tokio::test]
    async fn test_execution_event_fired() {
        let f = fixture();
        f.registry.register_command(echo_command()).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _sub = f.executor.on_command_executed(move |event| {
            assert_eq!(event.command_id, "echo");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        f.executor
            .execute_command("echo", vec![json!("hi")])
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recorder_skips_control_commands() {
        let f = fixture();
        f.registry.register_command(echo_command()).unwrap();
        f.registry
            .register_command(Command::new(
                "macro.startRecording",
                "Start Recording",
                sync_handler_fn(|_| Ok(json!(null))),
            ))
            .unwrap();

        let recorded = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);
        f.executor.set_recording_observer(Box::new(move |id, _| {
            sink.lock().push(id.to_string());
        }));

        f.executor
            .execute_command("macro.startRecording", vec![])
            .await
            .unwrap();
        f.executor
            .execute_command("echo", vec![json!("hi")])
            .await
            .unwrap();

        assert_eq!(*recorded.lock(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_default_substituted_args_recorded() {
        let f = fixture();
        let command = Command::new(
            "greet",
            "Greet",
            sync_handler_fn(|args| Ok(args[0].clone())),
        )
        .with_arguments(vec![ArgumentSchema::new(
            "name",
            ArgumentType::String,
            false,
        )
        .with_default(json!("world"))]);
        f.registry.register_command(command).unwrap();

        let value = f.executor.execute_command("greet", vec![]).await.unwrap();
        assert_eq!(value, json!("world"));
        // 历史记录的是替换默认值后的最终参数
        assert_eq!(f.history.get_history(None)[0].args, vec![json!("world")]);
    }
}
