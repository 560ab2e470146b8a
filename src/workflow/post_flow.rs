//! 帖子处理流程 - 流程层
//!
//! 核心职责：定义"一个帖子"的完整处理流程
//!
//! 流程顺序：
//! 1. 没有评论 → 直接返回空结果，不调用分析能力
//! 2. 按层截断评论树到上限
//! 3. 调用分析能力

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{AnalysisContext, AnalysisOutcome, Post};
use crate::services::{forest_builder, Analyzer};
use crate::utils::truncate_text;
use crate::workflow::post_ctx::PostCtx;

/// 单个帖子的处理结果
#[derive(Debug, Clone, Default)]
pub struct PostReport {
    pub outcome: AnalysisOutcome,
    /// 本帖实际发出的分析调用次数
    pub api_calls: usize,
}

/// 帖子处理流程
///
/// - 只处理单个帖子
/// - 不持有并发资源（信号量在执行器里）
/// - 只依赖分析能力（services）
pub struct PostFlow {
    analyzer: Arc<dyn Analyzer>,
    max_comments_per_post: usize,
}

impl PostFlow {
    /// 创建新的帖子处理流程
    pub fn new(analyzer: Arc<dyn Analyzer>, max_comments_per_post: usize) -> Self {
        Self {
            analyzer,
            max_comments_per_post,
        }
    }

    pub async fn run(
        &self,
        post: &Post,
        ctx: &PostCtx,
        context: &AnalysisContext,
    ) -> Result<PostReport> {
        info!("{} 开始分析: {}", ctx, truncate_text(&post.title, 40));

        if post.comments.is_empty() {
            info!("{} 没有评论，跳过分析调用", ctx);
            return Ok(PostReport::default());
        }

        let total = post.comment_count();
        let capped = Post {
            comments: forest_builder::cap_forest(&post.comments, self.max_comments_per_post),
            ..post.clone()
        };
        if total > self.max_comments_per_post {
            info!(
                "{} 评论 {} 条，截断为 {} 条",
                ctx,
                total,
                capped.comment_count()
            );
        }

        let outcome = self
            .analyzer
            .analyze(&capped, context)
            .await
            .with_context(|| format!("{} 分析调用失败", ctx))?;

        debug!(
            "{} 完成: 相关评论 {} 条, 质量 {:.2}",
            ctx,
            outcome.relevant_count(),
            outcome.quality_score
        );

        Ok(PostReport {
            outcome,
            api_calls: 1,
        })
    }
}
