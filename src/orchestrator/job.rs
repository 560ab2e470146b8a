//! 任务模型
//!
//! 任务队列对外暴露的数据结构：任务状态、任务快照、错误详情，
//! 以及提交 / 查询 / 取消 / 统计接口返回的形状。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// 任务状态
///
/// `pending → running → {completed | failed | cancelled}`，右侧三个为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务失败时记录的结构化错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// 错误类别，例如 `LlmError`、`Panic`
    pub error_type: String,
    pub message: String,
    /// 错误链（由外到内，不含最外层）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

/// 任务快照
#[derive(Debug, Clone, Serialize)]
pub struct Job<R> {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 0 - 100
    pub progress: f64,
    pub progress_message: String,
    pub result: Option<R>,
    pub error: Option<String>,
    pub error_detail: Option<ErrorDetail>,
}

impl<R> Job<R> {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0.0,
            progress_message: "Job queued".to_string(),
            result: None,
            error: None,
            error_detail: None,
        }
    }

    /// 已运行的时间（秒）
    ///
    /// 已结束的任务为 结束 - 开始；仍在运行的任务为 当前 - 开始；未开始为 `None`。
    pub fn processing_time_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds().max(0) as f64 / 1000.0)
    }
}

/// 提交接口的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// 取消接口的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// 状态查询接口的返回
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse<R> {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub progress_message: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

impl<R> From<Job<R>> for JobStatusResponse<R> {
    fn from(job: Job<R>) -> Self {
        let processing_time_seconds = job.processing_time_seconds();
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            progress_message: job.progress_message,
            created_at: job.created_at,
            processing_time_seconds,
            result: job.result,
            error: job.error,
            error_detail: job.error_detail,
        }
    }
}

/// 队列统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total_jobs: usize,
    pub running_jobs: usize,
    pub available_slots: usize,
    pub max_concurrent_jobs: usize,
    /// 每种状态的任务数，五种状态都会出现
    pub status_breakdown: BTreeMap<JobStatus, usize>,
    pub result_ttl_hours: f64,
}

/// 任务执行期间可用的上下文：取消信号 + 进度上报
///
/// 编排层只依赖这个 trait，不关心自己是否运行在任务队列里。
#[async_trait]
pub trait JobContext: Send + Sync {
    fn cancellation(&self) -> &CancellationToken;

    async fn report_progress(&self, percent: f64, message: &str);

    fn is_cancelled(&self) -> bool {
        self.cancellation().is_cancelled()
    }
}

/// 不在任务队列中运行时使用的上下文：进度直接丢弃
#[derive(Debug, Clone, Default)]
pub struct Detached {
    cancel: CancellationToken,
}

impl Detached {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用外部提供的取消信号
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl JobContext for Detached {
    fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn report_progress(&self, _percent: f64, _message: &str) {}
}
