//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量调度和生命周期管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `job_queue` - 后台任务队列
//! - 提交任务后立即返回任务 ID
//! - 控制同时运行的任务数量（Semaphore）
//! - 任务状态、进度、取消、过期清理、关闭
//!
//! ### `job` - 任务模型
//! - 任务状态机与快照
//! - 对外返回的提交 / 查询 / 取消 / 统计结构
//! - `JobContext`：任务执行期间的取消信号与进度上报
//!
//! ### `analysis` - 分析编排器
//! - 把所有帖子交给有界并发执行器
//! - 汇总每个帖子的分析结果和元数据
//!
//! ## 层次关系
//!
//! ```text
//! job_queue (处理一个个任务)
//!     ↓
//! analysis (处理 Vec<Post>)
//!     ↓
//! workflow::PostFlow (处理单个 Post)
//!     ↓
//! services (能力层：forest_builder / analyzer)
//!     ↓
//! infrastructure (基础设施：FanOutExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：job_queue 管生命周期，analysis 管一次分析
//! 2. **互不感知**：job_queue 只接收一个闭包，不知道闭包在做什么
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod analysis;
pub mod job;
pub mod job_queue;

// 重新导出主要类型
pub use analysis::AnalysisOrchestrator;
pub use job::{
    CancelResponse, Detached, ErrorDetail, Job, JobContext, JobStatus, JobStatusResponse,
    QueueStats, SubmitResponse,
};
pub use job_queue::{JobHandle, JobQueue};
