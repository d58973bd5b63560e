//! 宏录制与回放
//!
//! 录制状态机 Idle → Recording → Idle：录制期间执行器把每次完成的
//! 命令调用写入缓冲，停止时打包成不可变的 Macro。回放按步骤顺序
//! 串行执行，支持条件跳过、延迟、重复与失败策略。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{ContextStore, ExpressionEvaluator};
use crate::error::{PaletteError, PaletteResult};
use crate::events::{Disposable, Emitter};
use crate::executor::Executor;
use crate::types::{
    now_millis, CommandContext, Macro, MacroRecordedEvent, MacroRunSummary, MacroStep,
    MacroStepOutcome, StepErrorPolicy, StepStatus, TriggerSource,
};

/// retry 策略下单次重复的最大调用次数
const RETRY_MAX_ATTEMPTS: u32 = 3;

/// 录制状态上下文键
const CTX_RECORDING: &str = "recordingMacro";
const CTX_CURRENT_MACRO: &str = "currentMacroId";

struct RecordingSession {
    macro_id: String,
    steps: Vec<MacroStep>,
}

/// 宏引擎
pub struct MacroEngine {
    macros: DashMap<String, Macro>,
    session: Mutex<Option<RecordingSession>>,
    /// 最近一次录制完成或运行过的宏
    last_macro_id: Mutex<Option<String>>,
    executor: Arc<Executor>,
    store: Arc<ContextStore>,
    evaluator: Arc<ExpressionEvaluator>,
    on_macro_recorded: Emitter<MacroRecordedEvent>,
}

impl MacroEngine {
    pub fn new(
        executor: Arc<Executor>,
        store: Arc<ContextStore>,
        evaluator: Arc<ExpressionEvaluator>,
    ) -> Self {
        Self {
            macros: DashMap::new(),
            session: Mutex::new(None),
            last_macro_id: Mutex::new(None),
            executor,
            store,
            evaluator,
            on_macro_recorded: Emitter::new(),
        }
    }

    /// 订阅录制完成事件
    pub fn on_macro_recorded(
        &self,
        listener: impl Fn(&MacroRecordedEvent) + Send + Sync + 'static,
    ) -> Disposable {
        self.on_macro_recorded.subscribe(listener)
    }

    /// 开始录制
    pub fn start_recording_macro(&self, macro_id: &str) -> PaletteResult<()> {
        let mut session = self.session.lock();
        if let Some(active) = session.as_ref() {
            return Err(PaletteError::AlreadyRecording(active.macro_id.clone()));
        }
        *session = Some(RecordingSession {
            macro_id: macro_id.to_string(),
            steps: Vec::new(),
        });
        drop(session);

        self.store
            .set_context(CTX_RECORDING, Value::Bool(true), None);
        self.store
            .set_context(CTX_CURRENT_MACRO, Value::String(macro_id.to_string()), None);
        info!("开始录制宏: {}", macro_id);
        Ok(())
    }

    /// 记录一次命令调用（录制未激活时为空操作）
    pub fn observe(&self, command_id: &str, args: &[Value]) {
        let mut session = self.session.lock();
        if let Some(session) = session.as_mut() {
            session.steps.push(MacroStep::new(command_id, args.to_vec()));
        }
    }

    /// 停止录制并打包为宏
    pub fn stop_recording_macro(
        &self,
        name: &str,
        description: Option<String>,
    ) -> PaletteResult<Macro> {
        let session = self
            .session
            .lock()
            .take()
            .ok_or(PaletteError::NotRecording)?;
        self.clear_recording_context();

        let macro_def = Macro {
            id: session.macro_id,
            name: name.to_string(),
            description,
            steps: session.steps,
            enabled: true,
            recorded_at: Some(now_millis()),
            last_run: None,
            run_count: 0,
        };
        info!(
            "录制完成: {} ('{}', {} 步)",
            macro_def.id,
            macro_def.name,
            macro_def.steps.len()
        );

        self.macros.insert(macro_def.id.clone(), macro_def.clone());
        *self.last_macro_id.lock() = Some(macro_def.id.clone());
        self.on_macro_recorded.fire(&MacroRecordedEvent {
            macro_def: macro_def.clone(),
        });
        Ok(macro_def)
    }

    /// 取消录制，丢弃缓冲（未在录制时为空操作）
    pub fn cancel_macro_recording(&self) {
        if self.session.lock().take().is_some() {
            self.clear_recording_context();
            debug!("录制已取消");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn get_macro(&self, macro_id: &str) -> Option<Macro> {
        self.macros.get(macro_id).map(|entry| entry.clone())
    }

    pub fn get_all_macros(&self) -> Vec<Macro> {
        let mut all: Vec<Macro> = self.macros.iter().map(|entry| entry.clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// 删除宏（不存在时为空操作）
    pub fn delete_macro(&self, macro_id: &str) {
        self.macros.remove(macro_id);
    }

    /// 最近录制完成或运行过的宏ID
    pub fn last_macro_id(&self) -> Option<String> {
        self.last_macro_id.lock().clone()
    }

    /// 运行宏
    ///
    /// 步骤严格串行；条件为假跳过；失败按步骤的 on_error 策略处理，
    /// stop（默认）中止并向上返回错误，continue 记入汇总后继续，
    /// retry 同一次调用最多尝试 3 次后按 stop 处理。run_count 与
    /// last_run 无论成败都会更新。
    pub async fn run_macro(
        &self,
        macro_id: &str,
        context: Option<CommandContext>,
    ) -> PaletteResult<MacroRunSummary> {
        let macro_def = self
            .get_macro(macro_id)
            .ok_or_else(|| PaletteError::MacroNotFound(macro_id.to_string()))?;
        if !macro_def.enabled {
            return Err(PaletteError::MacroDisabled(macro_id.to_string()));
        }

        let mut base_context = context.unwrap_or_else(|| CommandContext::new(TriggerSource::Macro));
        base_context.triggered_by = TriggerSource::Macro;
        let overlay: HashMap<String, Value> = base_context.variables.clone();

        info!("运行宏: {} ({} 步)", macro_id, macro_def.steps.len());
        let mut outcomes: Vec<MacroStepOutcome> = Vec::with_capacity(macro_def.steps.len());
        let mut aborted: Option<PaletteError> = None;

        for (index, step) in macro_def.steps.iter().enumerate() {
            if let Some(condition) = &step.condition {
                if !self.evaluator.evaluate_with_overlay(condition, &overlay).result {
                    debug!("跳过步骤 {}: 条件为假 '{}'", index, condition);
                    outcomes.push(MacroStepOutcome {
                        step_index: index,
                        command_id: step.command_id.clone(),
                        status: StepStatus::Skipped,
                        attempts: 0,
                        error: None,
                    });
                    continue;
                }
            }

            let policy = step.on_error.unwrap_or_default();
            let repeats = step.repeat_count.unwrap_or(1).max(1);
            let mut attempts = 0u32;
            let mut step_error: Option<PaletteError> = None;

            'reps: for _ in 0..repeats {
                // 每次重复前都等待延迟
                if let Some(delay) = step.delay {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                let max_attempts = match policy {
                    StepErrorPolicy::Retry => RETRY_MAX_ATTEMPTS,
                    _ => 1,
                };
                let mut last_err = None;
                for _ in 0..max_attempts {
                    attempts += 1;
                    match self
                        .executor
                        .execute_command_with_context(
                            &step.command_id,
                            base_context.clone(),
                            step.args.clone(),
                        )
                        .await
                    {
                        Ok(_) => {
                            last_err = None;
                            break;
                        }
                        Err(err) => last_err = Some(err),
                    }
                }
                if let Some(err) = last_err {
                    step_error = Some(err);
                    break 'reps;
                }
            }

            match step_error {
                None => outcomes.push(MacroStepOutcome {
                    step_index: index,
                    command_id: step.command_id.clone(),
                    status: StepStatus::Executed,
                    attempts,
                    error: None,
                }),
                Some(err) => {
                    warn!("宏步骤失败: {} 第 {} 步: {}", macro_id, index, err);
                    outcomes.push(MacroStepOutcome {
                        step_index: index,
                        command_id: step.command_id.clone(),
                        status: StepStatus::Failed,
                        attempts,
                        error: Some(err.to_string()),
                    });
                    match policy {
                        StepErrorPolicy::Continue => {}
                        // retry 用尽后与 stop 同样中止
                        StepErrorPolicy::Stop | StepErrorPolicy::Retry => {
                            aborted = Some(err);
                            break;
                        }
                    }
                }
            }
        }

        // 无论成败都更新运行统计
        if let Some(mut entry) = self.macros.get_mut(macro_id) {
            entry.run_count += 1;
            entry.last_run = Some(now_millis());
        }
        *self.last_macro_id.lock() = Some(macro_id.to_string());

        if let Some(err) = aborted {
            return Err(err);
        }

        let executed = outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Executed)
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Skipped)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Failed)
            .count();
        Ok(MacroRunSummary {
            macro_id: macro_id.to_string(),
            steps_total: macro_def.steps.len(),
            executed,
            skipped,
            failed,
            success: failed == 0,
            step_outcomes: outcomes,
        })
    }

    fn clear_recording_context(&self) {
        self.store
            .set_context(CTX_RECORDING, Value::Bool(false), None);
        self.store.delete_context(CTX_CURRENT_MACRO);
    }
}
