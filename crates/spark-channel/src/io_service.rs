use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::IoServiceConfig;

/// 执行通道操作的 IO 服务。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 真正的反应器与线程池属于外部协作者；通道端点只需要一个能派生方向执行上下文的句柄。
///   `IoService` 把 Tokio 运行时包装成这一句柄，自身不引入任何调度策略。
///
/// ## 逻辑 (How)
/// - [`IoService::new`] 依据 [`IoServiceConfig`] 构建多线程运行时并持有它；
/// - [`IoService::from_handle`] / [`IoService::current`] 复用调用方已有的运行时；
/// - 克隆共享同一运行时，最后一个克隆析构时运行时随之关闭。
///
/// ## 注意事项 (Trade-offs)
/// - 持有运行时的实例不得在异步上下文内析构（Tokio 禁止在运行时线程内阻塞关闭），
///   异步代码中请使用 `current()`。
#[derive(Clone, Debug)]
pub struct IoService {
    handle: Handle,
    _runtime: Option<Arc<Runtime>>,
}

impl IoService {
    /// 构建并持有一个多线程运行时。
    pub fn new(config: &IoServiceConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(config.thread_name.clone());
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads);
        }
        let runtime = builder.build()?;
        tracing::debug!(
            threads = ?config.worker_threads,
            name = %config.thread_name,
            "spark-channel io service started"
        );
        Ok(Self {
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(runtime)),
        })
    }

    /// 复用外部运行时句柄。
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            _runtime: None,
        }
    }

    /// 复用当前所在的运行时；必须在 Tokio 上下文中调用。
    pub fn current() -> Self {
        Self::from_handle(Handle::current())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// 派生一个分离的任务；方向执行上下文自行在关闭后退出，无需等待其句柄。
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.handle.spawn(future));
    }

    /// 在运行时上阻塞执行 `future`；只能在运行时线程之外调用。
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}
