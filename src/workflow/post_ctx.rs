//! 帖子处理上下文
//!
//! 封装"我正在处理这批里的第几个帖子"这一信息

use std::fmt::Display;

/// 帖子处理上下文
#[derive(Debug, Clone)]
pub struct PostCtx {
    /// 帖子ID
    pub post_id: String,

    /// 帖子在本次分析中的序号（从1开始，仅用于日志显示）
    pub post_index: usize,

    /// 本次分析的帖子总数
    pub total_posts: usize,
}

impl PostCtx {
    /// 创建新的帖子上下文
    pub fn new(post_id: String, post_index: usize, total_posts: usize) -> Self {
        Self {
            post_id,
            post_index,
            total_posts,
        }
    }
}

impl Display for PostCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[帖子 {}/{} ID#{}]",
            self.post_index, self.total_posts, self.post_id
        )
    }
}
