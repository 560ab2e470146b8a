//! 日志工具模块
//!
//! 提供日志初始化和输出的辅助函数

use crate::config::Config;
use crate::models::AnalysisMetadata;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 日志
///
/// `RUST_LOG` 优先；否则按 `verbose` 选择 debug / info。
/// 重复调用（例如多个测试）不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 评论分析服务启动");
    info!("📊 最大并发任务数: {}", config.max_concurrent_jobs);
    info!("🤖 最大并发分析调用数: {}", config.max_concurrent_analysis_calls);
    info!("✂️ 每帖评论上限: {}", config.max_comments_per_post);
    info!("🧠 模型: {}", config.llm_model_name);
    info!("{}", "=".repeat(60));
}

/// 记录一次分析开始
///
/// # 参数
/// - `total_posts`: 帖子总数
/// - `max_concurrent`: 帖子级并发上限
pub fn log_analysis_start(total_posts: usize, max_concurrent: usize) {
    info!("\n{}", "─".repeat(60));
    info!("📦 开始分析 {} 个帖子", total_posts);
    info!("📋 帖子级并发上限: {}", max_concurrent);
    info!("{}", "─".repeat(60));
}

/// 打印一次分析的汇总统计
pub fn log_analysis_complete(metadata: &AnalysisMetadata) {
    info!("\n{}", "=".repeat(60));
    info!("📊 分析完成统计");
    info!(
        "完成时间: {}",
        metadata.analysis_timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📄 帖子: {}", metadata.total_posts_analyzed);
    info!("💬 评论: {}", metadata.total_comments_found);
    info!("✅ 相关评论: {}", metadata.relevant_comments_extracted);
    info!("➖ 无关帖子: {}", metadata.irrelevant_posts);
    info!("❌ 失败帖子: {}", metadata.failed_posts);
    info!("🔁 API 调用: {}", metadata.api_calls_made);
    info!("⏱️ 耗时: {:.2}s", metadata.processing_time_seconds);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
