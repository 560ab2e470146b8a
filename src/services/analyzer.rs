//! 帖子分析能力接口 - 业务能力层
//!
//! 编排层只依赖这个 trait；具体由 LLM 还是测试替身完成分析，编排层不关心。

use crate::models::{AnalysisContext, AnalysisOutcome, Post};
use anyhow::Result;
use async_trait::async_trait;

/// 单个帖子的分析能力
///
/// 实现可能因超时、鉴权、返回格式错误而失败，
/// 调用方会把失败当作该帖子的失败结果，而不是整批失败。
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// 分析一个帖子及其评论树
    async fn analyze(&self, post: &Post, context: &AnalysisContext) -> Result<AnalysisOutcome>;

    /// 使用的模型名称，写入汇总元数据
    fn model_name(&self) -> &str;
}
