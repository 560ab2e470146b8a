//! LLM 分析服务 - 业务能力层
//!
//! 只负责"让 LLM 分析一个帖子"这一能力，不关心并发和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, LlmError};
use crate::models::{AnalysisContext, AnalysisOutcome, CommentAnalysis, Post, ThreadContext};
use crate::services::analyzer::Analyzer;
use crate::services::forest_builder;
use crate::utils::truncate_text;

const SYSTEM_MESSAGE: &str = "You are an expert Reddit comment analyzer. Analyze posts and comments \
according to user criteria and return structured results as a single JSON object.";

/// LLM 返回的单条相关评论
#[derive(Debug, Deserialize)]
struct LlmRelevantComment {
    #[serde(default)]
    comment_id: Option<String>,
    text: String,
    #[serde(default = "neutral")]
    sentiment: String,
    #[serde(default)]
    theme: String,
    #[serde(default = "none")]
    purchase_intent: String,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    conversation_quality: Option<f64>,
    #[serde(flatten)]
    thread: ThreadContext,
}

fn neutral() -> String {
    "neutral".to_string()
}

fn none() -> String {
    "none".to_string()
}

/// LLM 返回的整体分析结果
#[derive(Debug, Deserialize)]
struct LlmAnalysisPayload {
    #[serde(default)]
    relevant_comments: Vec<LlmRelevantComment>,
    #[serde(default)]
    thread_insights: Vec<String>,
    #[serde(default)]
    conversation_quality: f64,
}

/// LLM 分析服务
///
/// 职责：
/// - 调用 LLM API 对单个帖子的评论树做筛选与分析
/// - 把模型输出转换为 `AnalysisOutcome`
/// - 不关心并发上限、任务状态
pub struct LlmAnalyzer {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmAnalyzer {
    /// 创建新的 LLM 分析服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(&self, user_message: &str, system_message: Option<&str>) -> Result<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.1)
            .max_tokens(4000u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })
            .map_err(AppError::from)?;

        Ok(content.trim().to_string())
    }

    /// 构建分析提示词
    fn build_analysis_prompt(post: &Post, context: &AnalysisContext) -> Result<String> {
        let post_json = serde_json::to_string_pretty(post)?;
        Ok(format!(
            r#"Analyze this Reddit post and its comments based on the following criteria:

FILTERING CRITERIA: {criteria}

POST DATA ({comments} comments, {depth} levels deep):
{post_json}

ANALYSIS INSTRUCTIONS:
1. Read the post title and content to understand the discussion topic
2. Analyze the COMPLETE comment thread structure including parent-child relationships
3. Apply the filtering criteria to identify relevant comments
4. Ignore comments whose body is "[deleted]"
5. If no comments match the criteria, return an empty relevant_comments list

Return ONLY a JSON object of this shape:
{{"relevant_comments": [{{"comment_id": "...", "text": "...", "sentiment": "positive|negative|neutral",
  "theme": "...", "purchase_intent": "high|medium|low|none", "confidence_score": 0.0,
  "conversation_quality": 0.0, "parent_comment_id": "...", "thread_depth": 0,
  "thread_position": 0, "children_count": 0, "conversation_context": "...",
  "thread_context": "..."}}],
 "thread_insights": ["..."],
 "conversation_quality": 0.0}}"#,
            criteria = context.system_prompt,
            comments = post.comment_count(),
            depth = forest_builder::max_depth(&post.comments),
        ))
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, post: &Post, context: &AnalysisContext) -> Result<AnalysisOutcome> {
        let prompt = Self::build_analysis_prompt(post, context)?;
        let response = self.send_to_llm(&prompt, Some(SYSTEM_MESSAGE)).await?;
        let payload = parse_analysis_response(&response)?;
        Ok(into_outcome(payload, post, context))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// 从 LLM 响应中提取 JSON 对象（兼容 ```json 代码块和裸 JSON）
fn parse_analysis_response(response: &str) -> Result<LlmAnalysisPayload> {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    let fenced =
        FENCED.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("静态正则"));

    let candidate = match fenced.captures(response).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => match (response.find('{'), response.rfind('}')) {
            (Some(start), Some(end)) if start < end => &response[start..=end],
            _ => {
                return Err(LlmError::MalformedResponse {
                    reason: format!("响应中没有 JSON 对象: {}", truncate_text(response, 80)),
                }
                .into())
            }
        },
    };

    serde_json::from_str(candidate).map_err(|e| {
        LlmError::MalformedResponse {
            reason: e.to_string(),
        }
        .into()
    })
}

/// 把模型输出转换为分析结果
fn into_outcome(payload: LlmAnalysisPayload, post: &Post, context: &AnalysisContext) -> AnalysisOutcome {
    let post_url = post.post_url();
    let quality = payload.conversation_quality.clamp(0.0, 1.0);

    let comment_analyses = payload
        .relevant_comments
        .into_iter()
        .filter(|c| !c.text.trim().is_empty())
        .map(|c| CommentAnalysis {
            post_id: post.id.clone(),
            post_url: post_url.clone(),
            comment_id: c.comment_id,
            quote: truncate_text(c.text.trim(), context.max_quote_length),
            sentiment: c.sentiment,
            theme: c.theme,
            purchase_intent: c.purchase_intent,
            date: Utc::now(),
            source: "reddit".to_string(),
            confidence_score: c.confidence_score.map(|s| s.clamp(0.0, 1.0)),
            conversation_quality: Some(c.conversation_quality.unwrap_or(quality).clamp(0.0, 1.0)),
            thread: trim_thread_context(c.thread),
        })
        .collect();

    AnalysisOutcome {
        comment_analyses,
        insights: payload.thread_insights,
        quality_score: quality,
        errors: Vec::new(),
    }
}

/// 讨论串描述截断到固定长度，空白描述视为缺失
fn trim_thread_context(thread: ThreadContext) -> ThreadContext {
    let trim = |text: Option<String>, max_len: usize| {
        text.map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| truncate_text(&t, max_len))
    };
    ThreadContext {
        parent_comment_id: trim(thread.parent_comment_id, usize::MAX),
        conversation_context: trim(thread.conversation_context, 200),
        thread_context: trim(thread.thread_context, 300),
        ..thread
    }
}
