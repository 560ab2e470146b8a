//! 分析编排器 - 编排层
//!
//! ## 职责
//!
//! 把一次请求里的所有帖子交给有界并发执行器逐帖分析，再把结果汇总成一份响应。
//!
//! ## 核心功能
//!
//! 1. **并发控制**：帖子级分析调用共用一个执行器，上限与任务队列的上限相互独立
//! 2. **部分失败**：单个帖子分析失败只记一条错误，不影响其他帖子
//! 3. **取消**：每个帖子开始前检查取消信号
//! 4. **汇总**：拼接所有分析结果，计算帖子数、评论数、调用数、讨论串指标、平均质量
//! 5. **进度**：每完成一个帖子上报一次进度（10% → 95%）

use crate::config::Config;
use crate::error::{AnalysisError, AppResult};
use crate::infrastructure::{FanOutExecutor, ItemFailure, Outcome};
use crate::models::{
    AggregatedResponse, AnalysisContext, AnalysisMetadata, Post, RawPost,
};
use crate::orchestrator::job::JobContext;
use crate::services::{forest_builder, Analyzer};
use crate::utils::logging::{log_analysis_complete, log_analysis_start};
use crate::workflow::{PostCtx, PostFlow, PostReport};
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// 分析编排器
///
/// 同一个编排器被多个任务共享时，帖子级并发上限对所有任务共同生效。
pub struct AnalysisOrchestrator {
    flow: PostFlow,
    executor: FanOutExecutor,
    model_name: String,
}

impl AnalysisOrchestrator {
    pub fn new(analyzer: Arc<dyn Analyzer>, config: &Config) -> Self {
        Self::with_limits(
            analyzer,
            config.max_concurrent_analysis_calls,
            config.max_comments_per_post,
        )
    }

    pub fn with_limits(
        analyzer: Arc<dyn Analyzer>,
        max_concurrent_calls: usize,
        max_comments_per_post: usize,
    ) -> Self {
        let model_name = analyzer.model_name().to_string();
        Self {
            flow: PostFlow::new(analyzer, max_comments_per_post),
            executor: FanOutExecutor::new(max_concurrent_calls),
            model_name,
        }
    }

    /// 先为每个帖子建评论树，再运行完整分析
    pub async fn run_from_raw(
        &self,
        posts: Vec<RawPost>,
        context: &AnalysisContext,
        job: &dyn JobContext,
    ) -> AppResult<AggregatedResponse> {
        let posts = posts.into_iter().map(Post::from_raw).collect();
        self.run_full_analysis(posts, context, job).await
    }

    /// 分析所有帖子并汇总
    ///
    /// 单个帖子失败不会让整体失败；只有收到取消信号时返回
    /// [`AnalysisError::Cancelled`]。
    pub async fn run_full_analysis(
        &self,
        posts: Vec<Post>,
        context: &AnalysisContext,
        job: &dyn JobContext,
    ) -> AppResult<AggregatedResponse> {
        let total = posts.len();
        log_analysis_start(total, self.executor.limit());
        job.report_progress(10.0, "Starting analysis...").await;

        let flow = &self.flow;
        let finished = AtomicUsize::new(0);
        let finished = &finished;
        let started = Instant::now();

        let items: Vec<(usize, &Post)> = posts.iter().enumerate().collect();
        let outcomes = self
            .executor
            .run_with_cancel(items, job.cancellation(), |(index, post)| async move {
                let ctx = PostCtx::new(post.id.clone(), index + 1, total);
                let result = flow.run(post, &ctx, context).await;

                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                job.report_progress(
                    10.0 + 85.0 * done as f64 / total as f64,
                    &format!("Analyzed {}/{} posts", done, total),
                )
                .await;
                result
            })
            .await;

        // 墙钟时间，各帖耗时相互重叠，不能逐帖相加
        let processing_time_seconds = started.elapsed().as_secs_f64();

        if job.is_cancelled() {
            warn!("🚫 分析被取消，已完成 {}/{} 个帖子", finished.load(Ordering::SeqCst), total);
            return Err(AnalysisError::Cancelled.into());
        }

        job.report_progress(95.0, "Aggregating results...").await;
        let response = aggregate(
            &posts,
            outcomes,
            context,
            &self.model_name,
            processing_time_seconds,
        );
        log_analysis_complete(&response.metadata);
        Ok(response)
    }
}

/// 讨论串统计，基于建树后未截断的评论
#[derive(Debug, Default)]
struct ThreadStats {
    comments_found: usize,
    max_depth: usize,
    depths: Vec<usize>,
}

impl ThreadStats {
    fn collect(posts: &[Post]) -> Self {
        let mut stats = Self::default();
        for post in posts {
            let count = forest_builder::count_comments(&post.comments);
            if count == 0 {
                continue;
            }
            let depth = forest_builder::max_depth(&post.comments);
            stats.comments_found += count;
            stats.max_depth = stats.max_depth.max(depth);
            stats.depths.push(depth);
        }
        stats
    }

    fn average_depth(&self) -> Option<f64> {
        if self.depths.is_empty() {
            return None;
        }
        Some(self.depths.iter().sum::<usize>() as f64 / self.depths.len() as f64)
    }
}

fn aggregate(
    posts: &[Post],
    outcomes: Vec<Outcome<PostReport, anyhow::Error>>,
    context: &AnalysisContext,
    model_name: &str,
    processing_time_seconds: f64,
) -> AggregatedResponse {
    let mut comment_analyses = Vec::new();
    let mut insights = Vec::new();
    let mut errors = Vec::new();
    let mut irrelevant_posts = 0;
    let mut failed_posts = 0;
    let mut api_calls_made = 0;

    for (post, outcome) in posts.iter().zip(outcomes) {
        match outcome.into_result() {
            Ok(report) => {
                api_calls_made += report.api_calls;
                if report.outcome.relevant_count() == 0 {
                    irrelevant_posts += 1;
                }
                comment_analyses.extend(report.outcome.comment_analyses);
                insights.extend(report.outcome.insights);
                errors.extend(report.outcome.errors);
            }
            Err(failure) => {
                failed_posts += 1;
                irrelevant_posts += 1;
                if !post.comments.is_empty() && !matches!(failure, ItemFailure::Cancelled) {
                    api_calls_made += 1;
                }
                let message = match failure {
                    ItemFailure::Error(e) => format!("{:#}", e),
                    other => format!("[帖子 ID#{}] {}", post.id, other),
                };
                warn!("❌ {}", message);
                errors.push(message);
            }
        }
    }

    let threads = ThreadStats::collect(posts);
    let qualities: Vec<f64> = comment_analyses
        .iter()
        .filter_map(|analysis| analysis.conversation_quality)
        .collect();
    let average_conversation_quality = if qualities.is_empty() {
        None
    } else {
        Some(qualities.iter().sum::<f64>() / qualities.len() as f64)
    };

    info!(
        "汇总完成: 相关评论 {} 条, 洞察 {} 条, 错误 {} 条",
        comment_analyses.len(),
        insights.len(),
        errors.len()
    );

    let metadata = AnalysisMetadata {
        total_posts_analyzed: posts.len(),
        total_comments_found: threads.comments_found,
        relevant_comments_extracted: comment_analyses.len(),
        irrelevant_posts,
        failed_posts,
        analysis_timestamp: Utc::now(),
        processing_time_seconds,
        model_used: model_name.to_string(),
        api_calls_made,
        collection_method: context.collection_method.clone(),
        max_thread_depth: (threads.max_depth > 0).then_some(threads.max_depth),
        total_threaded_comments: (threads.comments_found > 0).then_some(threads.comments_found),
        average_thread_depth: threads.average_depth(),
        conversation_threads_analyzed: (!threads.depths.is_empty()).then_some(threads.depths.len()),
        thread_insights_generated: (!insights.is_empty()).then_some(insights.len()),
        average_conversation_quality,
    };

    AggregatedResponse {
        comment_analyses,
        insights,
        errors,
        metadata,
    }
}
