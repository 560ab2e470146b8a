use crate::error::{AppError, AppResult, ConfigError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 默认配置文件路径
const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时运行的分析任务数量（任务队列信号量大小）
    pub max_concurrent_jobs: usize,
    /// 同时进行的帖子级 LLM 调用数量
    pub max_concurrent_analysis_calls: usize,
    /// 每个帖子最多送去分析的评论数
    pub max_comments_per_post: usize,
    /// 已结束任务结果的保留时长（小时）
    pub result_ttl_hours: u64,
    /// 过期清理的间隔（秒）
    pub cleanup_interval_secs: u64,
    /// 命令行轮询任务状态的间隔（毫秒）
    pub status_poll_interval_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 筛选评论使用的分析要求
    pub system_prompt: String,
    /// 引用评论原文的最大长度
    pub max_quote_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            max_concurrent_analysis_calls: 5,
            max_comments_per_post: 50,
            result_ttl_hours: 24,
            cleanup_interval_secs: 3600,
            status_poll_interval_ms: 500,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            system_prompt: "You are an expert social media analyst specializing in Reddit comment analysis. \
                            Identify insightful comments, sentiment patterns and meaningful themes."
                .to_string(),
            max_quote_length: 200,
        }
    }
}

impl Config {
    /// 按 默认值 → 配置文件 → 环境变量 的顺序加载配置
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("COMMENT_INSIGHT_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let base = if Path::new(&path).exists() {
            Self::from_toml_file(Path::new(&path))?
        } else {
            Self::default()
        };

        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> AppResult<Self> {
        let config = Self::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取配置，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, origin: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|source| {
            AppError::Config(ConfigError::TomlParseFailed {
                path: origin.to_string(),
                source,
            })
        })
    }

    fn with_env_overrides(mut self) -> AppResult<Self> {
        override_parsed(&mut self.max_concurrent_jobs, "MAX_CONCURRENT_JOBS")?;
        override_parsed(
            &mut self.max_concurrent_analysis_calls,
            "MAX_CONCURRENT_ANALYSIS_CALLS",
        )?;
        override_parsed(&mut self.max_comments_per_post, "MAX_COMMENTS_PER_POST")?;
        override_parsed(&mut self.result_ttl_hours, "RESULT_TTL_HOURS")?;
        override_parsed(&mut self.cleanup_interval_secs, "CLEANUP_INTERVAL_SECS")?;
        override_parsed(&mut self.status_poll_interval_ms, "STATUS_POLL_INTERVAL_MS")?;
        override_parsed(&mut self.verbose_logging, "VERBOSE_LOGGING")?;
        override_parsed(&mut self.max_quote_length, "MAX_QUOTE_LENGTH")?;
        override_string(&mut self.llm_api_key, "LLM_API_KEY");
        override_string(&mut self.llm_api_base_url, "LLM_API_BASE_URL");
        override_string(&mut self.llm_model_name, "LLM_MODEL_NAME");
        override_string(&mut self.system_prompt, "ANALYSIS_SYSTEM_PROMPT");
        Ok(self)
    }

    /// 校验配置值
    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(AppError::invalid_config("max_concurrent_jobs", "必须大于 0"));
        }
        if self.max_concurrent_analysis_calls == 0 {
            return Err(AppError::invalid_config(
                "max_concurrent_analysis_calls",
                "必须大于 0",
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(AppError::invalid_config("cleanup_interval_secs", "必须大于 0"));
        }
        Ok(())
    }

    /// 结果保留时长
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_hours.saturating_mul(3600))
    }

    /// 过期清理间隔
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// 状态轮询间隔
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, var_name: &str) -> AppResult<()> {
    if let Ok(value) = std::env::var(var_name) {
        *target = value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.clone(),
            expected_type: std::any::type_name::<T>().to_string(),
        })?;
    }
    Ok(())
}

fn override_string(target: &mut String, var_name: &str) {
    if let Ok(value) = std::env::var(var_name) {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            "max_concurrent_jobs = 7\nllm_model_name = \"gpt-4.1\"\n",
            "inline",
        )
        .unwrap();

        assert_eq!(config.max_concurrent_jobs, 7);
        assert_eq!(config.llm_model_name, "gpt-4.1");
        assert_eq!(config.max_comments_per_post, 50);
        assert_eq!(config.result_ttl_hours, 24);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = Config::from_toml_str("max_concurrent_jobs = \"many\"", "inline").unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::TomlParseFailed { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_ceilings() {
        let config = Config {
            max_concurrent_analysis_calls: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.result_ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let config = Config {
            result_ttl_hours: u64::MAX,
            ..Config::default()
        };
        assert_eq!(config.result_ttl(), Duration::from_secs(u64::MAX));
    }
}
