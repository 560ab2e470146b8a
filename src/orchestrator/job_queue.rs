//! 后台任务队列 - 编排层
//!
//! ## 职责
//!
//! 管理分析任务的完整生命周期，让耗时的分析不阻塞请求路径。
//!
//! ## 核心功能
//!
//! 1. **提交**：记录为 `pending`，立即返回任务 ID
//! 2. **执行**：进程级信号量限制同时运行的任务数，任务的错误和 panic 都被捕获
//! 3. **查询 / 取消 / 进度**：取消只在等待点生效；任务可以自行检查取消信号后返回，
//!    否则在下一个等待点被丢弃
//! 4. **过期清理**：后台定期删除结束时间早于 TTL 的任务，从不触碰未结束的任务
//! 5. **关闭**：不再接受新任务，取消所有任务并等待它们在下一个等待点退出
//!
//! ## 写入约定
//!
//! 每个任务的状态、进度字段只由执行它的那个 tokio 任务修改；
//! `cancel` 只发出信号，不直接改状态。

use crate::config::Config;
use crate::error::{AnalysisError, AppError, AppResult, JobError};
use crate::infrastructure::fan_out::panic_message;
use crate::models::AggregatedResponse;
use crate::orchestrator::job::{ErrorDetail, Job, JobContext, JobStatus, QueueStats};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct JobEntry<R> {
    job: Job<R>,
    cancel: CancellationToken,
}

/// 任务表：任务 ID → 任务
///
/// 每个队列实例持有自己的任务表，测试之间互不影响。
pub(crate) struct JobStore<R> {
    jobs: RwLock<HashMap<String, JobEntry<R>>>,
}

impl<R: Clone> JobStore<R> {
    fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    async fn insert(&self, job: Job<R>, cancel: CancellationToken) {
        self.jobs
            .write()
            .await
            .insert(job.id.clone(), JobEntry { job, cancel });
    }

    async fn snapshot(&self, job_id: &str) -> Option<Job<R>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|entry| entry.job.clone())
    }

    /// 修改任务；任务不存在时返回 false
    async fn update(&self, job_id: &str, f: impl FnOnce(&mut Job<R>)) -> bool {
        match self.jobs.write().await.get_mut(job_id) {
            Some(entry) => {
                f(&mut entry.job);
                true
            }
            None => false,
        }
    }

    async fn request_cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(job_id) {
            Some(entry) if !entry.job.status.is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// 删除结束时间早于 `ttl` 的终态任务，返回删除数量
    async fn purge_expired(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| {
            if !entry.job.status.is_terminal() {
                return true;
            }
            match entry.job.completed_at {
                // 时钟回拨时 to_std 失败，按未过期处理
                Some(completed_at) => match (now - completed_at).to_std() {
                    Ok(elapsed) => elapsed <= ttl,
                    Err(_) => true,
                },
                None => true,
            }
        });
        before - jobs.len()
    }

    async fn status_counts(&self) -> BTreeMap<JobStatus, usize> {
        let mut counts: BTreeMap<JobStatus, usize> =
            JobStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for entry in self.jobs.read().await.values() {
            *counts.entry(entry.job.status).or_insert(0) += 1;
        }
        counts
    }
}

/// 交给任务闭包的句柄：取消信号 + 进度上报
pub struct JobHandle<R> {
    job_id: String,
    cancel: CancellationToken,
    store: Arc<JobStore<R>>,
}

impl<R> Clone for JobHandle<R> {
    fn clone(&self) -> Self {
        Self {
            job_id: self.job_id.clone(),
            cancel: self.cancel.clone(),
            store: self.store.clone(),
        }
    }
}

impl<R: Clone> JobHandle<R> {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// 上报进度；任务已不存在或不在运行时什么也不做
    pub async fn update_progress(&self, percent: f64, message: &str) {
        update_running_progress(&self.store, &self.job_id, percent, message).await;
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> JobContext for JobHandle<R> {
    fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn report_progress(&self, percent: f64, message: &str) {
        self.update_progress(percent, message).await;
    }
}

#[derive(Default)]
struct TaskSet {
    closed: bool,
    handles: Vec<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

/// 后台任务队列
///
/// `R` 是任务的结果类型，默认为一次完整分析的汇总结果。
/// 构造时会启动过期清理任务，必须在 tokio 运行时内调用。
pub struct JobQueue<R = AggregatedResponse> {
    store: Arc<JobStore<R>>,
    semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    result_ttl: Duration,
    shutdown: CancellationToken,
    tasks: Mutex<TaskSet>,
}

impl<R> JobQueue<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// 创建任务队列
    ///
    /// - `max_concurrent_jobs`：同时运行的任务数，0 按 1 处理
    /// - `result_ttl`：终态任务的保留时长
    /// - `sweep_interval`：过期清理的间隔
    pub fn new(max_concurrent_jobs: usize, result_ttl: Duration, sweep_interval: Duration) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        let store = Arc::new(JobStore::new());
        let shutdown = CancellationToken::new();

        let sweeper = spawn_sweeper(
            store.clone(),
            result_ttl,
            sweep_interval.max(Duration::from_millis(1)),
            shutdown.clone(),
        );

        Self {
            store,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            result_ttl,
            shutdown,
            tasks: Mutex::new(TaskSet {
                sweeper: Some(sweeper),
                ..TaskSet::default()
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_concurrent_jobs,
            config.result_ttl(),
            config.cleanup_interval(),
        )
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// 提交任务，立即返回任务 ID，不等待任务开始
    ///
    /// 队列关闭后提交返回 [`JobError::ShuttingDown`]。
    pub async fn submit<F, Fut>(&self, task: F) -> AppResult<String>
    where
        F: FnOnce(JobHandle<R>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        if tasks.closed {
            return Err(JobError::ShuttingDown.into());
        }

        let job_id = new_job_id();
        let cancel = self.shutdown.child_token();
        self.store
            .insert(Job::new(job_id.clone()), cancel.clone())
            .await;

        tasks.handles.retain(|handle| !handle.is_finished());
        tasks.handles.push(tokio::spawn(execute(
            self.store.clone(),
            self.semaphore.clone(),
            job_id.clone(),
            cancel,
            task,
        )));

        info!("[任务 {}] 📥 已提交", job_id);
        Ok(job_id)
    }

    /// 任务快照；不存在（或已过期删除）时返回 `None`
    pub async fn get_status(&self, job_id: &str) -> Option<Job<R>> {
        self.store.snapshot(job_id).await
    }

    /// 请求取消；任务不存在或已结束时返回 false
    pub async fn cancel(&self, job_id: &str) -> bool {
        let delivered = self.store.request_cancel(job_id).await;
        if delivered {
            info!("[任务 {}] 🛑 已发出取消信号", job_id);
        } else {
            debug!("[任务 {}] 取消请求被忽略：任务不存在或已结束", job_id);
        }
        delivered
    }

    /// 更新运行中任务的进度；任务不存在时什么也不做
    pub async fn update_progress(&self, job_id: &str, percent: f64, message: &str) {
        update_running_progress(&self.store, job_id, percent, message).await;
    }

    pub async fn stats(&self) -> QueueStats {
        let status_breakdown = self.store.status_counts().await;
        QueueStats {
            total_jobs: status_breakdown.values().sum(),
            running_jobs: status_breakdown
                .get(&JobStatus::Running)
                .copied()
                .unwrap_or(0),
            available_slots: self.semaphore.available_permits(),
            max_concurrent_jobs: self.max_concurrent_jobs,
            status_breakdown,
            result_ttl_hours: self.result_ttl.as_secs_f64() / 3600.0,
        }
    }

    /// 立即执行一轮过期清理，返回删除的任务数
    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired(self.result_ttl).await
    }

    /// 关闭队列
    ///
    /// 拒绝新的提交，取消所有未结束的任务并等待它们退出，停止过期清理。
    /// 重复调用直接返回。
    pub async fn shutdown(&self) {
        let (handles, sweeper) = {
            let mut tasks = self.tasks.lock().await;
            if tasks.closed {
                return;
            }
            tasks.closed = true;
            (std::mem::take(&mut tasks.handles), tasks.sweeper.take())
        };

        info!("🔻 任务队列关闭中，等待 {} 个任务退出", handles.len());
        self.shutdown.cancel();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("任务在关闭过程中异常退出: {}", e);
            }
        }
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }
        info!("✓ 任务队列已关闭");
    }
}

impl<R> Drop for JobQueue<R> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn new_job_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("job_{}", &id[..12])
}

async fn update_running_progress<R: Clone>(
    store: &JobStore<R>,
    job_id: &str,
    percent: f64,
    message: &str,
) {
    store
        .update(job_id, |job| {
            if job.status == JobStatus::Running {
                job.progress = percent.clamp(0.0, 100.0);
                job.progress_message = message.to_string();
            }
        })
        .await;
}

fn spawn_sweeper<R>(
    store: Arc<JobStore<R>>,
    ttl: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    R: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let removed = store.purge_expired(ttl).await;
                    if removed > 0 {
                        info!("🧹 已清理 {} 个过期任务", removed);
                    }
                }
            }
        }
        debug!("过期清理任务已停止");
    })
}

/// 执行单个任务：等待槽位 → running → 运行 → 记录终态
async fn execute<R, F, Fut>(
    store: Arc<JobStore<R>>,
    semaphore: Arc<Semaphore>,
    job_id: String,
    cancel: CancellationToken,
    task: F,
) where
    R: Clone + Send + Sync + 'static,
    F: FnOnce(JobHandle<R>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = semaphore.acquire_owned() => permit.ok(),
    };
    // 槽位一直持有到终态写入之后
    let Some(_permit) = permit else {
        info!("[任务 {}] 🚫 开始前已被取消", job_id);
        store
            .update(&job_id, |job| {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                job.progress_message = "Job cancelled before start".to_string();
            })
            .await;
        return;
    };

    store
        .update(&job_id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.progress_message = "Job started".to_string();
        })
        .await;
    info!("[任务 {}] ▶️ 开始执行", job_id);

    let handle = JobHandle {
        job_id: job_id.clone(),
        cancel: cancel.clone(),
        store: store.clone(),
    };
    let run = AssertUnwindSafe(async move { task(handle).await }).catch_unwind();

    // 任务先于取消信号轮询；没有自行检查信号的任务在下一个等待点被丢弃
    let outcome = tokio::select! {
        biased;
        outcome = run => Some(outcome),
        _ = cancel.cancelled() => None,
    };

    match outcome {
        None => {
            info!("[任务 {}] 🚫 已在等待点被取消", job_id);
            store
                .update(&job_id, |job| {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(Utc::now());
                    job.progress_message = "Job cancelled".to_string();
                    job.error = Some(AnalysisError::Cancelled.to_string());
                })
                .await;
        }
        Some(Ok(Ok(result))) => {
            info!("[任务 {}] ✅ 完成", job_id);
            store
                .update(&job_id, |job| {
                    job.status = JobStatus::Completed;
                    job.completed_at = Some(Utc::now());
                    job.progress = 100.0;
                    job.progress_message = "Job completed".to_string();
                    job.result = Some(result);
                })
                .await;
        }
        Some(Ok(Err(err))) if cancel.is_cancelled() || is_cancellation(&err) => {
            info!("[任务 {}] 🚫 已取消: {}", job_id, err);
            store
                .update(&job_id, |job| {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(Utc::now());
                    job.progress_message = "Job cancelled".to_string();
                    job.error = Some(err.to_string());
                })
                .await;
        }
        Some(Ok(Err(err))) => {
            error!("[任务 {}] ❌ 失败: {:#}", job_id, err);
            let detail = error_detail(&err);
            store
                .update(&job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(Utc::now());
                    job.progress_message = "Job failed".to_string();
                    job.error = Some(err.to_string());
                    job.error_detail = Some(detail);
                })
                .await;
        }
        Some(Err(panic)) => {
            let message = panic_message(&panic);
            error!("[任务 {}] 💥 执行时发生 panic: {}", job_id, message);
            store
                .update(&job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(Utc::now());
                    job.progress_message = "Job failed".to_string();
                    job.error = Some(message.clone());
                    job.error_detail = Some(ErrorDetail {
                        error_type: "Panic".to_string(),
                        message,
                        causes: Vec::new(),
                    });
                })
                .await;
        }
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<AppError>())
        .any(AppError::is_cancelled)
}

fn error_detail(err: &anyhow::Error) -> ErrorDetail {
    let error_type = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
        .map(AppError::kind)
        .unwrap_or("Error");

    ErrorDetail {
        error_type: error_type.to_string(),
        message: err.to_string(),
        causes: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnalysisError, LlmError};
    use anyhow::Context;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio_test::assert_err;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn wait_for<R>(queue: &JobQueue<R>, job_id: &str, wanted: JobStatus) -> Job<R>
    where
        R: Clone + Send + Sync + 'static,
    {
        for _ in 0..400 {
            if let Some(job) = queue.get_status(job_id).await {
                if job.status == wanted {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("任务 {job_id} 没有进入 {wanted} 状态");
    }

    /// 提交一个阻塞到 `gate` 被通知的任务
    async fn submit_gated(queue: &JobQueue<u32>, gate: Arc<Notify>) -> String {
        queue
            .submit(move |_handle| async move {
                gate.notified().await;
                Ok(1)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_pending_to_completed() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);
        let gate = Arc::new(Notify::new());
        let blocker = submit_gated(&queue, gate.clone()).await;
        wait_for(&queue, &blocker, JobStatus::Running).await;

        let job_id = queue
            .submit(|handle| async move {
                handle.update_progress(50.0, "halfway").await;
                Ok(42)
            })
            .await
            .unwrap();
        assert!(job_id.starts_with("job_"));

        // 唯一的槽位被占用，新任务保持 pending
        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending = queue.get_status(&job_id).await.unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        assert_eq!(pending.started_at, None);

        gate.notify_one();
        let done = wait_for(&queue, &job_id, JobStatus::Completed).await;
        assert_eq!(done.result, Some(42));
        assert_eq!(done.progress, 100.0);
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());
        assert!(done.processing_time_seconds().is_some());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_rejected() {
        let queue: JobQueue<u32> = JobQueue::new(2, HOUR, HOUR);
        let job_id = queue.submit(|_| async { Ok(7) }).await.unwrap();
        let before = wait_for(&queue, &job_id, JobStatus::Completed).await;

        assert!(!queue.cancel(&job_id).await);
        assert!(!queue.cancel("job_unknown").await);

        let after = queue.get_status(&job_id).await.unwrap();
        assert_eq!(after.status, JobStatus::Completed);
        assert_eq!(after.result, before.result);
        assert_eq!(after.completed_at, before.completed_at);
    }

    #[tokio::test]
    async fn test_failed_job_records_error_detail() {
        let queue: JobQueue<u32> = JobQueue::new(2, HOUR, HOUR);
        let job_id = queue
            .submit(|_| async {
                let err: anyhow::Error = AppError::from(LlmError::EmptyContent {
                    model: "m".to_string(),
                })
                .into();
                Err(err).context("分析帖子失败")
            })
            .await
            .unwrap();

        let job = wait_for(&queue, &job_id, JobStatus::Failed).await;
        let detail = job.error_detail.unwrap();
        assert_eq!(detail.error_type, "LlmError");
        assert_eq!(detail.message, "分析帖子失败");
        assert!(!detail.causes.is_empty());
        assert_eq!(job.error.as_deref(), Some("分析帖子失败"));
        assert_eq!(job.result, None);
    }

    #[tokio::test]
    async fn test_panicking_job_is_failed_not_propagated() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);
        let bad = queue
            .submit(|_| async {
                let explode = true;
                if explode {
                    panic!("task exploded");
                }
                Ok(0)
            })
            .await
            .unwrap();
        let good = queue.submit(|_| async { Ok(1) }).await.unwrap();

        let job = wait_for(&queue, &bad, JobStatus::Failed).await;
        let detail = job.error_detail.unwrap();
        assert_eq!(detail.error_type, "Panic");
        assert_eq!(detail.message, "task exploded");

        // panic 释放了槽位，后续任务正常完成
        wait_for(&queue, &good, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);
        let job_id = queue
            .submit(|handle| async move {
                handle.cancellation().cancelled().await;
                Err(AppError::from(AnalysisError::Cancelled).into())
            })
            .await
            .unwrap();
        wait_for(&queue, &job_id, JobStatus::Running).await;

        assert!(queue.cancel(&job_id).await);
        let job = wait_for(&queue, &job_id, JobStatus::Cancelled).await;
        assert!(job.completed_at.is_some());
        assert!(job.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_cancel_pending_job_never_runs() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);
        let gate = Arc::new(Notify::new());
        let blocker = submit_gated(&queue, gate.clone()).await;
        wait_for(&queue, &blocker, JobStatus::Running).await;

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_task = ran.clone();
        let job_id = queue
            .submit(move |_| async move {
                ran_in_task.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await
            .unwrap();

        assert!(queue.cancel(&job_id).await);
        let job = wait_for(&queue, &job_id, JobStatus::Cancelled).await;
        assert_eq!(job.started_at, None);

        gate.notify_one();
        wait_for(&queue, &blocker, JobStatus::Completed).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_terminal_jobs() {
        let queue: JobQueue<u32> = JobQueue::new(2, Duration::ZERO, HOUR);
        let finished = queue.submit(|_| async { Ok(1) }).await.unwrap();
        wait_for(&queue, &finished, JobStatus::Completed).await;

        let gate = Arc::new(Notify::new());
        let running = submit_gated(&queue, gate.clone()).await;
        wait_for(&queue, &running, JobStatus::Running).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.purge_expired().await, 1);
        assert!(queue.get_status(&finished).await.is_none());
        assert!(queue.get_status(&running).await.is_some());

        gate.notify_one();
        wait_for(&queue, &running, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_periodic_sweep_evicts_completed_job() {
        let queue: JobQueue<u32> =
            JobQueue::new(2, Duration::ZERO, Duration::from_millis(20));
        let finished = queue.submit(|_| async { Ok(1) }).await.unwrap();

        let gate = Arc::new(Notify::new());
        let running = submit_gated(&queue, gate.clone()).await;
        wait_for(&queue, &running, JobStatus::Running).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(queue.get_status(&finished).await.is_none());
        assert_eq!(
            queue.get_status(&running).await.map(|job| job.status),
            Some(JobStatus::Running)
        );

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_stats_and_concurrency_ceiling() {
        let queue: JobQueue<usize> = JobQueue::new(2, HOUR, HOUR);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut ids = Vec::new();
        for i in 0..5 {
            let active = active.clone();
            let peak = peak.clone();
            let id = queue
                .submit(move |_| async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                })
                .await
                .unwrap();
            ids.push(id);
        }

        let stats = queue.stats().await;
        assert_eq!(stats.total_jobs, 5);
        assert_eq!(stats.max_concurrent_jobs, 2);
        assert_eq!(stats.status_breakdown.len(), 5);
        assert_eq!(stats.result_ttl_hours, 1.0);

        for id in &ids {
            wait_for(&queue, id, JobStatus::Completed).await;
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);

        let stats = queue.stats().await;
        assert_eq!(stats.status_breakdown[&JobStatus::Completed], 5);
        assert_eq!(stats.running_jobs, 0);
        assert_eq!(stats.available_slots, 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_rejects_new_jobs() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);
        let running = queue
            .submit(|handle| async move {
                handle.cancellation().cancelled().await;
                Err(AppError::from(AnalysisError::Cancelled).into())
            })
            .await
            .unwrap();
        wait_for(&queue, &running, JobStatus::Running).await;
        let pending = queue.submit(|_| async { Ok(1) }).await.unwrap();

        queue.shutdown().await;

        assert_eq!(
            queue.get_status(&running).await.unwrap().status,
            JobStatus::Cancelled
        );
        assert_eq!(
            queue.get_status(&pending).await.unwrap().status,
            JobStatus::Cancelled
        );

        let err = assert_err!(queue.submit(|_| async { Ok(3) }).await);
        assert_eq!(err.kind(), "JobError");
    }

    #[tokio::test]
    async fn test_shutdown_drops_task_ignoring_cancellation() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);
        // 只等待 gate，从不检查取消信号
        let gate = Arc::new(Notify::new());
        let job_id = submit_gated(&queue, gate).await;
        wait_for(&queue, &job_id, JobStatus::Running).await;

        let finished = tokio::time::timeout(Duration::from_secs(2), queue.shutdown()).await;
        assert!(finished.is_ok(), "关闭队列不应被忽略取消信号的任务卡住");

        let job = queue.get_status(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
        assert_eq!(job.result, None);
    }

    #[tokio::test]
    async fn test_cancel_drops_running_task_at_await_point() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);
        let gate = Arc::new(Notify::new());
        let job_id = submit_gated(&queue, gate).await;
        wait_for(&queue, &job_id, JobStatus::Running).await;

        assert!(queue.cancel(&job_id).await);
        let job = wait_for(&queue, &job_id, JobStatus::Cancelled).await;
        assert!(job.error_detail.is_none());

        // 槽位已释放
        let next = queue.submit(|_| async { Ok(5) }).await.unwrap();
        assert_eq!(wait_for(&queue, &next, JobStatus::Completed).await.result, Some(5));
    }

    #[tokio::test]
    async fn test_update_progress_visible_while_running() {
        let queue: JobQueue<u32> = JobQueue::new(1, HOUR, HOUR);

        // 未知任务直接忽略
        queue.update_progress("job_missing", 10.0, "x").await;
        assert!(queue.get_status("job_missing").await.is_none());

        let reported = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let (reported_in_task, gate_in_task) = (reported.clone(), gate.clone());
        let job_id = queue
            .submit(move |handle| async move {
                handle.update_progress(50.0, "halfway").await;
                reported_in_task.notify_one();
                gate_in_task.notified().await;
                Ok(9)
            })
            .await
            .unwrap();

        reported.notified().await;
        let running = queue.get_status(&job_id).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.progress, 50.0);
        assert_eq!(running.progress_message, "halfway");

        // 队列侧更新同样可见，且超出范围的值被截断
        queue.update_progress(&job_id, 150.0, "almost").await;
        let running = queue.get_status(&job_id).await.unwrap();
        assert_eq!(running.progress, 100.0);
        assert_eq!(running.progress_message, "almost");

        gate.notify_one();
        let done = wait_for(&queue, &job_id, JobStatus::Completed).await;
        assert_eq!(done.progress_message, "Job completed");

        // 终态之后的进度更新不生效
        queue.update_progress(&job_id, 5.0, "late").await;
        let done = queue.get_status(&job_id).await.unwrap();
        assert_eq!(done.progress, 100.0);
        assert_eq!(done.progress_message, "Job completed");
    }
}
