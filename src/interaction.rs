//! 交互请求代理
//!
//! 快速选择与输入框各维护一个单槽挂起请求：show_* 返回的 future
//! 只会被对应的 select/submit/cancel 调用解析。新请求到来时先把
//! 旧请求解析为 None（后来者优先）。

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::events::{Disposable, Emitter};
use crate::types::{
    InputBoxOptions, QuickPickItem, QuickPickOptions, QuickPickSelection, QuickPickShownEvent,
};

struct PendingQuickPick {
    tx: oneshot::Sender<Option<QuickPickSelection>>,
}

struct PendingInputBox {
    options: InputBoxOptions,
    tx: oneshot::Sender<Option<String>>,
}

/// 交互代理
pub struct InteractionBroker {
    quick_pick: Mutex<Option<PendingQuickPick>>,
    input_box: Mutex<Option<PendingInputBox>>,
    on_quick_pick_shown: Emitter<QuickPickShownEvent>,
}

impl InteractionBroker {
    pub fn new() -> Self {
        Self {
            quick_pick: Mutex::new(None),
            input_box: Mutex::new(None),
            on_quick_pick_shown: Emitter::new(),
        }
    }

    /// 订阅快速选择显示事件
    pub fn on_quick_pick_shown(
        &self,
        listener: impl Fn(&QuickPickShownEvent) + Send + Sync + 'static,
    ) -> Disposable {
        self.on_quick_pick_shown.subscribe(listener)
    }

    /// 显示快速选择，future 在 select/cancel 时解析
    pub async fn show_quick_pick(
        &self,
        items: Vec<QuickPickItem>,
        options: QuickPickOptions,
    ) -> Option<QuickPickSelection> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.quick_pick.lock();
            // 后来者优先：挂起的旧请求解析为 None
            if let Some(previous) = slot.take() {
                let _ = previous.tx.send(None);
            }
            *slot = Some(PendingQuickPick { tx });
        }
        debug!("显示快速选择: {} 项", items.len());
        self.on_quick_pick_shown
            .fire(&QuickPickShownEvent { items, options });

        rx.await.unwrap_or(None)
    }

    /// 解析挂起的快速选择；没有挂起请求时返回 false
    pub fn select_quick_pick_item(&self, selection: QuickPickSelection) -> bool {
        match self.quick_pick.lock().take() {
            Some(pending) => pending.tx.send(Some(selection)).is_ok(),
            None => false,
        }
    }

    /// 取消挂起的快速选择（无挂起请求时为空操作）
    pub fn cancel_quick_pick(&self) {
        if let Some(pending) = self.quick_pick.lock().take() {
            let _ = pending.tx.send(None);
        }
    }

    /// 显示输入框，future 在 submit/cancel 时解析
    pub async fn show_input_box(&self, options: InputBoxOptions) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.input_box.lock();
            if let Some(previous) = slot.take() {
                let _ = previous.tx.send(None);
            }
            *slot = Some(PendingInputBox { options, tx });
        }
        debug!("显示输入框");

        rx.await.unwrap_or(None)
    }

    /// 提交输入框的值
    ///
    /// 校验拒绝时返回 Some(message)，请求保持挂起；接受（或没有
    /// 挂起请求）时返回 None。
    pub fn submit_input_box(&self, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        let validator = {
            let slot = self.input_box.lock();
            match slot.as_ref() {
                Some(pending) => pending.options.validate_input.clone(),
                None => return None,
            }
        };

        // 校验回调在锁外运行，允许回调回读代理状态
        if let Some(validate) = validator {
            if let Some(message) = validate(&value) {
                debug!("输入被拒绝: {}", message);
                return Some(message);
            }
        }

        if let Some(pending) = self.input_box.lock().take() {
            let _ = pending.tx.send(Some(value));
        }
        None
    }

    /// 取消挂起的输入框（无挂起请求时为空操作）
    pub fn cancel_input_box(&self) {
        if let Some(pending) = self.input_box.lock().take() {
            let _ = pending.tx.send(None);
        }
    }

    pub fn has_pending_quick_pick(&self) -> bool {
        self.quick_pick.lock().is_some()
    }

    pub fn has_pending_input_box(&self) -> bool {
        self.input_box.lock().is_some()
    }
}

impl Default for InteractionBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn items(labels: &[&str]) -> Vec<QuickPickItem> {
        labels.iter().map(|l| QuickPickItem::new(*l)).collect()
    }

    #[tokio::test]
    async fn test_quick_pick_select() {
        let broker = Arc::new(InteractionBroker::new());

        let b = Arc::clone(&broker);
        let pending = tokio::spawn(async move {
            b.show_quick_pick(items(&["甲", "乙"]), QuickPickOptions::default())
                .await
        });

        tokio::task::yield_now().await;
        assert!(broker.has_pending_quick_pick());
        assert!(
            broker.select_quick_pick_item(QuickPickSelection::Single(QuickPickItem::new("乙")))
        );

        let selection = pending.await.unwrap();
        assert_eq!(
            selection,
            Some(QuickPickSelection::Single(QuickPickItem::new("乙")))
        );
        assert!(!broker.has_pending_quick_pick());
    }

    #[tokio::test]
    async fn test_second_quick_pick_cancels_first() {
        let broker = Arc::new(InteractionBroker::new());

        let b = Arc::clone(&broker);
        let first = tokio::spawn(async move {
            b.show_quick_pick(items(&["甲"]), QuickPickOptions::default())
                .await
        });
        tokio::task::yield_now().await;

        let b = Arc::clone(&broker);
        let second = tokio::spawn(async move {
            b.show_quick_pick(items(&["乙"]), QuickPickOptions::default())
                .await
        });
        tokio::task::yield_now().await;

        // 第一个请求被解析为 None，第二个仍然挂起
        assert_eq!(first.await.unwrap(), None);
        assert!(broker.has_pending_quick_pick());

        broker.cancel_quick_pick();
        assert_eq!(second.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_select_without_pending() {
        let broker = InteractionBroker::new();
        assert!(!broker.select_quick_pick_item(QuickPickSelection::Single(
            QuickPickItem::new("甲")
        )));
        // 取消也同样是空操作
        broker.cancel_quick_pick();
        broker.cancel_input_box();
    }

    #[tokio::test]
    async fn test_quick_pick_shown_event() {
        let broker = Arc::new(InteractionBroker::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _sub = broker.on_quick_pick_shown(move |event| {
            assert_eq!(event.items.len(), 2);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let b = Arc::clone(&broker);
        let pending = tokio::spawn(async move {
            b.show_quick_pick(items(&["甲", "乙"]), QuickPickOptions::default())
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        broker.cancel_quick_pick();
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn test_input_box_submit() {
        let broker = Arc::new(InteractionBroker::new());

        let b = Arc::clone(&broker);
        let pending =
            tokio::spawn(async move { b.show_input_box(InputBoxOptions::default()).await });
        tokio::task::yield_now().await;

        assert_eq!(broker.submit_input_box("你好"), None);
        assert_eq!(pending.await.unwrap(), Some("你好".to_string()));
    }

    #[tokio::test]
    async fn test_input_validation_keeps_slot_pending() {
        let broker = Arc::new(InteractionBroker::new());
        let options = InputBoxOptions {
            validate_input: Some(Arc::new(|value: &str| {
                if value.is_empty() {
                    Some("不能为空".to_string())
                } else {
                    None
                }
            })),
            ..Default::default()
        };

        let b = Arc::clone(&broker);
        let pending = tokio::spawn(async move { b.show_input_box(options).await });
        tokio::task::yield_now().await;

        // 拒绝：返回消息，请求保持挂起
        assert_eq!(broker.submit_input_box(""), Some("不能为空".to_string()));
        assert!(broker.has_pending_input_box());

        // 接受：解析为提交的值
        assert_eq!(broker.submit_input_box("ok"), None);
        assert_eq!(pending.await.unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn test_quick_pick_future_pending_until_selected() {
        let broker = InteractionBroker::new();
        let mut pending = tokio_test::task::spawn(
            broker.show_quick_pick(items(&["甲"]), QuickPickOptions::default()),
        );

        assert!(pending.poll().is_pending());
        assert!(
            broker.select_quick_pick_item(QuickPickSelection::Single(QuickPickItem::new("甲")))
        );
        assert!(pending.is_woken());
        match pending.poll() {
            std::task::Poll::Ready(selection) => assert!(selection.is_some()),
            std::task::Poll::Pending => panic!("选择后 future 应已就绪"),
        }
    }

    #[tokio::test]
    async fn test_validator_may_read_broker_state() {
        let broker = Arc::new(InteractionBroker::new());

        // 校验回调回读代理状态不得死锁
        let inner = Arc::clone(&broker);
        let options = InputBoxOptions {
            validate_input: Some(Arc::new(move |value: &str| {
                assert!(inner.has_pending_input_box());
                if value.is_empty() {
                    Some("不能为空".to_string())
                } else {
                    None
                }
            })),
            ..Default::default()
        };

        let b = Arc::clone(&broker);
        let pending = tokio::spawn(async move { b.show_input_box(options).await });
        tokio::task::yield_now().await;

        assert_eq!(broker.submit_input_box(""), Some("不能为空".to_string()));
        assert_eq!(broker.submit_input_box("好"), None);
        assert_eq!(pending.await.unwrap(), Some("好".to_string()));
    }

    #[tokio::test]
    async fn test_input_box_cancel() {
        let broker = Arc::new(InteractionBroker::new());

        let b = Arc::clone(&broker);
        let pending =
            tokio::spawn(async move { b.show_input_box(InputBoxOptions::default()).await });
        tokio::task::yield_now().await;

        broker.cancel_input_box();
        assert_eq!(pending.await.unwrap(), None);
    }
}
