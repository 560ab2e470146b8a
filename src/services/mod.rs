pub mod analyzer;
pub mod forest_builder;
pub mod llm_analyzer;

pub use analyzer::Analyzer;
pub use forest_builder::{build_forest, cap_forest, count_comments, max_depth};
pub use llm_analyzer::LlmAnalyzer;
