//! 事件发射器
//!
//! 按事件维护显式的监听者列表，订阅返回可释放句柄，不使用全局事件总线。

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 可释放句柄
///
/// 释放动作最多执行一次，重复调用 dispose 是安全的空操作。
pub struct Disposable {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Disposable {
    /// 包装一个释放动作
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// 创建空句柄（无释放动作）
    pub fn noop() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    /// 将多个句柄合并为一个，释放时依次释放
    pub fn from_many(disposables: Vec<Disposable>) -> Self {
        Self::new(move || {
            for d in &disposables {
                d.dispose();
            }
        })
    }

    /// 执行释放动作（幂等）
    pub fn dispose(&self) {
        if let Some(action) = self.action.lock().take() {
            action();
        }
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.action.lock().is_none())
            .finish()
    }
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// 事件发射器
///
/// 监听者按订阅顺序同步回调，fire 时持有监听者快照，
/// 回调中再次订阅或退订不会影响本次分发。
pub struct Emitter<T> {
    listeners: Arc<Mutex<Vec<(u64, Listener<T>)>>>,
    next_id: AtomicU64,
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// 订阅事件，返回用于退订的句柄
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Disposable {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));

        let listeners = Arc::clone(&self.listeners);
        Disposable::new(move || {
            listeners.lock().retain(|(lid, _)| *lid != id);
        })
    }

    /// 向所有监听者分发事件
    pub fn fire(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// 当前监听者数量
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
