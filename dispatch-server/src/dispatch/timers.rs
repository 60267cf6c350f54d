//! 波次定时器
//!
//! 每个订单至多一个活动定时器。重新布置会取消旧的；定时器触发时携带
//! 布置时的 wave 编号，调用方据此判断是否已过期。
//!
//! 定时器只是提示：真正的状态迁移由控制器在存储事务里按 wave 比较完成，
//! 因此取消与触发之间的竞态不会产生重复推进。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

struct WaveTimer {
    token: CancellationToken,
    wave: u32,
}

/// 按订单索引的可取消定时器集合
pub struct WaveTimers {
    timers: DashMap<String, WaveTimer>,
    shutdown: CancellationToken,
}

impl Default for WaveTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WaveTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveTimers")
            .field("armed", &self.timers.len())
            .finish()
    }
}

impl WaveTimers {
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// 布置定时器，`delay` 后执行 `on_fire`（除非先被取消）
    pub fn arm<F, Fut>(self: &Arc<Self>, order_id: &str, wave: u32, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        if let Some(previous) = self.timers.insert(
            order_id.to_string(),
            WaveTimer {
                token: token.clone(),
                wave,
            },
        ) {
            previous.token.cancel();
        }

        let timers = Arc::clone(self);
        let order_id = order_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(order_id = %order_id, wave, "Wave timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    // 只移除自己的条目，后布置的定时器不受影响
                    timers.timers.remove_if(&order_id, |_, t| t.wave == wave);
                    on_fire().await;
                }
            }
        });
    }

    /// 取消订单的定时器，返回是否存在
    pub fn cancel(&self, order_id: &str) -> bool {
        match self.timers.remove(order_id) {
            Some((_, timer)) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    /// 仅当布置的仍是 `wave` 时取消，较新的定时器保持不变
    pub fn cancel_wave(&self, order_id: &str, wave: u32) -> bool {
        match self.timers.remove_if(order_id, |_, t| t.wave == wave) {
            Some((_, timer)) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    /// 当前布置的 wave 编号
    pub fn armed_wave(&self, order_id: &str) -> Option<u32> {
        self.timers.get(order_id).map(|t| t.wave)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// 取消全部定时器（优雅关闭）
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let timers = Arc::new(WaveTimers::new());
        let fired = Arc::new(AtomicU32::new(0));

        let f = fired.clone();
        timers.arm("o-1", 1, Duration::from_secs(30), move || async move {
            f.store(1, Ordering::SeqCst);
        });
        assert_eq!(timers.armed_wave("o-1"), Some(1));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_timer() {
        let timers = Arc::new(WaveTimers::new());
        let fired = Arc::new(AtomicU32::new(0));

        for wave in [1u32, 2] {
            let f = fired.clone();
            timers.arm("o-1", wave, Duration::from_secs(30), move || async move {
                f.store(wave, Ordering::SeqCst);
            });
        }
        assert_eq!(timers.len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = Arc::new(WaveTimers::new());
        let fired = Arc::new(AtomicU32::new(0));

        let f = fired.clone();
        timers.arm("o-1", 1, Duration::from_secs(5), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.cancel("o-1"));
        assert!(!timers.cancel("o-1"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_wave_leaves_newer_timer_alone() {
        let timers = Arc::new(WaveTimers::new());
        let fired = Arc::new(AtomicU32::new(0));

        let f = fired.clone();
        timers.arm("o-1", 2, Duration::from_secs(5), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!timers.cancel_wave("o-1", 1));
        assert_eq!(timers.armed_wave("o-1"), Some(2));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let f = fired.clone();
        timers.arm("o-1", 3, Duration::from_secs(5), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.cancel_wave("o-1", 3));
        assert!(timers.is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let timers = Arc::new(WaveTimers::new());
        let fired = Arc::new(AtomicU32::new(0));

        for id in ["a", "b"] {
            let f = fired.clone();
            timers.arm(id, 1, Duration::from_secs(1), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }
        timers.shutdown();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
