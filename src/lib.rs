//! # Comment Insight
//!
//! 把带有嵌套评论的帖子交给 AI 分析，并以后台任务的方式返回汇总结果
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 与业务无关的并发工具
//! - `FanOutExecutor` - 有界并发执行一批工作项，收集每一项的成败
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个帖子
//! - `forest_builder` - 扁平评论 → 评论树、按层截断、统计
//! - `Analyzer` - 分析能力接口
//! - `LlmAnalyzer` - 基于 OpenAI 兼容接口的分析实现
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个帖子"的完整处理流程
//! - `PostCtx` - 上下文封装（post_id + post_index）
//! - `PostFlow` - 流程编排（截断 → 分析）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/analysis` - 一次完整分析：并发分析所有帖子并汇总
//! - `orchestrator/job_queue` - 后台任务队列：并发上限、状态、取消、过期清理
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{run_bounded, FanOutExecutor, ItemFailure, Outcome};
pub use models::{AggregatedResponse, AnalysisContext, CommentNode, CommentRecord, Post, RawPost};
pub use orchestrator::{AnalysisOrchestrator, JobQueue, JobStatus};
pub use services::{build_forest, Analyzer, LlmAnalyzer};
pub use workflow::{PostCtx, PostFlow};
