use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已删除 / 被移除评论的正文标记
pub const DELETED_MARKER: &str = "[deleted]";

/// 上游可能直接给出的删除正文
const REMOVED_BODIES: [&str; 2] = ["[deleted]", "[removed]"];

/// 扁平评论记录（上游输入）
///
/// `depth` 只是参考值，可能与真实的父链不一致，建树时不会信任它。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "parentId")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub depth: u32,
    #[serde(default = "Utc::now", alias = "createdAt", alias = "date")]
    pub created_at: DateTime<Utc>,
    /// 上游显式标记的移除状态
    #[serde(default, alias = "isRemoved")]
    pub removed: bool,
}

impl CommentRecord {
    /// 创建一条顶层评论记录
    pub fn new(id: impl Into<String>, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            author: author.into(),
            body: body.into(),
            score: 0,
            depth: 0,
            created_at: Utc::now(),
            removed: false,
        }
    }

    /// 设置父评论
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// 是否为已删除 / 被移除的评论
    pub fn is_deleted(&self) -> bool {
        self.removed || self.body.trim().is_empty() || REMOVED_BODIES.contains(&self.body.trim())
    }
}

/// 嵌套评论节点（建树输出）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    /// 结构深度，顶层评论为 0
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// 由扁平记录创建一个没有子节点的节点；删除的评论正文替换为 [`DELETED_MARKER`]
    pub fn from_record(record: CommentRecord) -> Self {
        let deleted = record.is_deleted();
        Self {
            body: if deleted {
                DELETED_MARKER.to_string()
            } else {
                record.body
            },
            removed: deleted,
            id: record.id,
            parent_id: record.parent_id,
            author: record.author,
            score: record.score,
            depth: record.depth,
            created_at: record.created_at,
            children: Vec::new(),
        }
    }
}
