//! 有界并发执行器 - 基础设施层
//!
//! 以固定的并发上限运行一批异步工作项，收集每一项的成功或失败结果：
//!
//! - 任意时刻执行中的 `work` 调用不超过上限，多余的工作项等待信号量
//! - 某一项失败（返回错误或 panic）不会取消或跳过其他项
//! - 返回结果与输入按下标对齐，与完成顺序无关
//! - 取消信号在每一项开始执行前检查，已取消时剩余项直接记为取消

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// 单个工作项的失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum ItemFailure<E> {
    /// `work` 返回了错误
    Error(E),
    /// `work` 发生 panic
    Panicked(String),
    /// 开始执行前收到取消信号
    Cancelled,
}

impl<E: fmt::Display> fmt::Display for ItemFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFailure::Error(e) => write!(f, "{}", e),
            ItemFailure::Panicked(msg) => write!(f, "执行时发生 panic: {}", msg),
            ItemFailure::Cancelled => write!(f, "已取消"),
        }
    }
}

/// 单个工作项的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R, E> {
    Success(R),
    Failure(ItemFailure<E>),
}

impl<R, E> Outcome<R, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn into_result(self) -> Result<R, ItemFailure<E>> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

/// 有界并发执行器
///
/// 信号量由执行器持有；同一个执行器被多次调用（例如多个任务共享一个编排器）时，
/// 并发上限对所有调用共同生效。
#[derive(Clone)]
pub struct FanOutExecutor {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl FanOutExecutor {
    /// 创建执行器，`limit` 为 0 时按 1 处理
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 当前空闲的并发槽位
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 运行所有工作项，返回与输入对齐的结果
    pub async fn run<T, R, E, F, Fut>(&self, items: Vec<T>, work: F) -> Vec<Outcome<R, E>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.run_with_cancel(items, &CancellationToken::new(), work)
            .await
    }

    /// 运行所有工作项；`cancel` 触发后尚未开始的工作项记为 [`ItemFailure::Cancelled`]
    pub async fn run_with_cancel<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        work: F,
    ) -> Vec<Outcome<R, E>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let work = &work;
        let tasks = items.into_iter().map(|item| {
            let semaphore = self.semaphore.clone();
            async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Outcome::Failure(ItemFailure::Cancelled),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Outcome::Failure(ItemFailure::Cancelled),
                    },
                };

                // work 在 catch_unwind 内部调用，同步 panic 同样被捕获
                match AssertUnwindSafe(async move { work(item).await })
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(value)) => Outcome::Success(value),
                    Ok(Err(e)) => Outcome::Failure(ItemFailure::Error(e)),
                    Err(panic) => Outcome::Failure(ItemFailure::Panicked(panic_message(&panic))),
                }
            }
        });

        // join_all 保持输入顺序
        join_all(tasks).await
    }
}

/// 便捷函数：以 `limit` 为上限运行一批工作项
pub async fn run_bounded<T, R, E, F, Fut>(items: Vec<T>, limit: usize, work: F) -> Vec<Outcome<R, E>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    FanOutExecutor::new(limit).run(items, work).await
}

/// 提取 panic 信息
pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "未知 panic".to_string()
    }
}
