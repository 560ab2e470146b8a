use crate::models::comment::{CommentNode, CommentRecord};
use crate::services::forest_builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 上游提供的帖子，评论仍为扁平记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "selftext")]
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

/// 建树之后的帖子
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub score: i64,
    pub subreddit: String,
    pub permalink: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<CommentNode>,
}

impl Post {
    /// 将扁平评论重建为评论树
    pub fn from_raw(raw: RawPost) -> Self {
        let comments = forest_builder::build_forest(raw.comments);
        Self {
            id: raw.id,
            title: raw.title,
            content: raw.content,
            author: raw.author,
            score: raw.score,
            subreddit: raw.subreddit,
            permalink: raw.permalink,
            url: raw.url,
            created_at: raw.created_at,
            comments,
        }
    }

    /// 帖子链接，优先使用 permalink
    pub fn post_url(&self) -> String {
        if self.permalink.starts_with("http") {
            self.permalink.clone()
        } else if !self.permalink.is_empty() {
            format!("https://reddit.com{}", self.permalink)
        } else {
            let subreddit = if self.subreddit.is_empty() {
                "unknown"
            } else {
                &self.subreddit
            };
            format!("https://reddit.com/r/{}/comments/{}/", subreddit, self.id)
        }
    }

    /// 评论总数（含所有回复）
    pub fn comment_count(&self) -> usize {
        forest_builder::count_comments(&self.comments)
    }
}
