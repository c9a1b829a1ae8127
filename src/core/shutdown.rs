//! 关闭与资源释放
//!
//! - ShutdownManager：监听 Ctrl+C / SIGTERM，通过 CancellationToken 取消进行中的 run
//! - SessionResource：会话独占的外部资源（浏览器进程等）
//! - Teardown：同步、幂等、尽力而为的释放；不依赖当前是否处于 async 运行时

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
}

/// 关闭原因
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// Ctrl+C 或输入结束
    UserInitiated,
    /// SIGTERM
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
        }
    }

    /// 获取关闭 token（传给 run 以取消进行中的模型 / 工具调用）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        tracing::info!(reason = ?reason, "shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, cancelling in-flight run...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, cancelling in-flight run...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话独占的外部资源；close 为同步调用，可在任意线程 / 运行时状态下执行
pub trait SessionResource: Send + Sync {
    /// 资源名称（用于日志）
    fn name(&self) -> &'static str;

    /// 释放资源；可能被重复调用，实现应保证第二次调用无副作用
    fn close(&self) -> anyhow::Result<()>;
}

/// 会话资源的释放器：cleanup 只执行一次，后续调用为空操作；单个资源失败只记录日志
#[derive(Default)]
pub struct Teardown {
    resources: Mutex<Vec<Arc<dyn SessionResource>>>,
    closed: AtomicBool,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记会话资源；已关闭后登记的资源立即释放
    pub fn register(&self, resource: Arc<dyn SessionResource>) {
        if self.is_closed() {
            release(resource.as_ref());
            return;
        }
        if let Ok(mut guard) = self.resources.lock() {
            guard.push(resource);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 释放全部资源（幂等）；返回本次实际释放的资源数
    pub fn cleanup(&self) -> usize {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("teardown already done, skipping");
            return 0;
        }
        let resources = match self.resources.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        tracing::info!("Releasing {} session resources...", resources.len());
        for resource in &resources {
            release(resource.as_ref());
        }
        resources.len()
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn release(resource: &dyn SessionResource) {
    match resource.close() {
        Ok(()) => tracing::info!("Resource '{}' released", resource.name()),
        Err(e) => tracing::warn!("Resource '{}' release failed: {}", resource.name(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingResource {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl SessionResource for CountingResource {
        fn name(&self) -> &'static str {
            "Counting"
        }

        fn close(&self) -> anyhow::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("simulated close failure");
            }
            Ok(())
        }
    }

    #[test]
    fn test_shutdown_manager_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!token.is_cancelled());
        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(manager.is_shutdown());
    }

    #[test]
    fn test_teardown_is_idempotent_without_runtime() {
        let closes = Arc::new(AtomicUsize::new(0));
        let teardown = Teardown::new();
        teardown.register(Arc::new(CountingResource {
            closes: closes.clone(),
            fail: false,
        }));
        assert_eq!(teardown.cleanup(), 1);
        assert_eq!(teardown.cleanup(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_inside_runtime_swallows_failures() {
        let closes = Arc::new(AtomicUsize::new(0));
        let teardown = Teardown::new();
        teardown.register(Arc::new(CountingResource {
            closes: closes.clone(),
            fail: true,
        }));
        teardown.register(Arc::new(CountingResource {
            closes: closes.clone(),
            fail: false,
        }));
        assert_eq!(teardown.cleanup(), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_register_after_close_releases_immediately() {
        let closes = Arc::new(AtomicUsize::new(0));
        let teardown = Teardown::new();
        teardown.cleanup();
        teardown.register(Arc::new(CountingResource {
            closes: closes.clone(),
            fail: false,
        }));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
