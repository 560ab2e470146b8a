use anyhow::{bail, Context, Result};
use comment_insight::config::Config;
use comment_insight::models::{load_posts_from_file, AnalysisContext};
use comment_insight::orchestrator::{
    AnalysisOrchestrator, CancelResponse, JobQueue, JobStatus, JobStatusResponse, SubmitResponse,
};
use comment_insight::services::{Analyzer, LlmAnalyzer};
use comment_insight::utils::logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("用法: comment-insight <posts.json>")?;
    let posts = load_posts_from_file(&path).await?;
    info!("✓ 读取到 {} 个帖子", posts.len());

    let analyzer: Arc<dyn Analyzer> = Arc::new(LlmAnalyzer::new(&config));
    let orchestrator = Arc::new(AnalysisOrchestrator::new(analyzer, &config));
    let context = AnalysisContext::new(config.system_prompt.clone())
        .with_max_quote_length(config.max_quote_length);

    let queue: JobQueue = JobQueue::from_config(&config);
    let job_id = queue
        .submit(move |handle| async move {
            let response = orchestrator.run_from_raw(posts, &context, &handle).await?;
            Ok(response)
        })
        .await?;
    println!(
        "{}",
        serde_json::to_string(&SubmitResponse {
            job_id: job_id.clone(),
            status: JobStatus::Pending,
        })?
    );

    // 轮询任务状态，Ctrl-C 取消任务
    let mut last_progress = -1.0;
    let job = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("收到 Ctrl-C，取消任务 {}", job_id);
                let success = queue.cancel(&job_id).await;
                println!("{}", serde_json::to_string(&CancelResponse { success })?);
            }
            _ = tokio::time::sleep(config.status_poll_interval()) => {}
        }

        let job = queue
            .get_status(&job_id)
            .await
            .with_context(|| format!("任务 {} 不存在", job_id))?;
        if job.progress != last_progress {
            info!("⏳ {:.0}% {}", job.progress, job.progress_message);
            last_progress = job.progress;
        }
        if job.status.is_terminal() {
            break job;
        }
    };

    let status = job.status;
    println!(
        "{}",
        serde_json::to_string_pretty(&JobStatusResponse::from(job))?
    );
    println!("{}", serde_json::to_string(&queue.stats().await)?);

    queue.shutdown().await;

    if status != JobStatus::Completed {
        bail!("任务以 {} 状态结束", status);
    }
    Ok(())
}
