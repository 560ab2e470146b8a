use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单条相关评论的分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAnalysis {
    pub post_id: String,
    /// 原帖链接，便于人工核对
    pub post_url: String,
    #[serde(default)]
    pub comment_id: Option<String>,
    pub quote: String,
    /// positive / negative / neutral
    pub sentiment: String,
    pub theme: String,
    /// high / medium / low / none
    pub purchase_intent: String,
    pub date: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// 所在讨论串的质量评分 [0, 1]
    #[serde(default)]
    pub conversation_quality: Option<f64>,
    /// 评论在讨论串中的位置
    #[serde(flatten)]
    pub thread: ThreadContext,
}

/// 相关评论在讨论串中的上下文，由分析能力给出，可能缺失
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_depth: Option<u32>,
    /// 在兄弟评论中的位置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_position: Option<u32>,
    /// 直接回复数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_count: Option<u32>,
    /// 这条评论在回应什么
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_context: Option<String>,
    /// 引出这条评论的讨论脉络
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_context: Option<String>,
}

fn default_source() -> String {
    "reddit".to_string()
}

/// 调用方提供的分析要求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// 筛选标准 / 系统提示词
    pub system_prompt: String,
    /// 引用原文的最大长度
    pub max_quote_length: usize,
    /// 数据来源方式，例如 subreddit / search
    pub collection_method: String,
}

impl AnalysisContext {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_quote_length: 200,
            collection_method: "subreddit".to_string(),
        }
    }

    pub fn with_max_quote_length(mut self, max_quote_length: usize) -> Self {
        self.max_quote_length = max_quote_length;
        self
    }

    pub fn with_collection_method(mut self, method: impl Into<String>) -> Self {
        self.collection_method = method.into();
        self
    }
}

/// 单个帖子的分析产出（由外部分析能力返回）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub comment_analyses: Vec<CommentAnalysis>,
    pub insights: Vec<String>,
    /// [0, 1]
    pub quality_score: f64,
    pub errors: Vec<String>,
}

impl AnalysisOutcome {
    /// 相关评论数
    pub fn relevant_count(&self) -> usize {
        self.comment_analyses.len()
    }
}

/// 汇总元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub total_posts_analyzed: usize,
    pub total_comments_found: usize,
    pub relevant_comments_extracted: usize,
    pub irrelevant_posts: usize,
    /// 分析调用整体失败的帖子数
    pub failed_posts: usize,
    pub analysis_timestamp: DateTime<Utc>,
    /// 整个 fan-out 的墙钟时间，不是各帖耗时之和
    pub processing_time_seconds: f64,
    pub model_used: String,
    pub api_calls_made: usize,
    pub collection_method: String,
    pub max_thread_depth: Option<usize>,
    pub total_threaded_comments: Option<usize>,
    pub average_thread_depth: Option<f64>,
    pub conversation_threads_analyzed: Option<usize>,
    pub thread_insights_generated: Option<usize>,
    pub average_conversation_quality: Option<f64>,
}

/// 一次完整分析的汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub comment_analyses: Vec<CommentAnalysis>,
    pub insights: Vec<String>,
    pub errors: Vec<String>,
    pub metadata: AnalysisMetadata,
}
