use crate::models::comment::CommentRecord;
use crate::models::post::RawPost;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;

/// 从 JSON 文件加载帖子列表（评论为扁平记录）
pub async fn load_posts_from_file(json_file_path: &Path) -> Result<Vec<RawPost>> {
    let content = fs::read_to_string(json_file_path)
        .await
        .with_context(|| format!("无法读取JSON文件: {}", json_file_path.display()))?;

    let posts: Vec<RawPost> = serde_json::from_str(&content)
        .with_context(|| format!("无法解析JSON文件: {}", json_file_path.display()))?;

    let comment_total: usize = posts.iter().map(|p| p.comments.len()).sum();
    tracing::info!(
        "成功加载 {} 个帖子，共 {} 条评论记录",
        posts.len(),
        comment_total
    );

    Ok(posts)
}

/// 将上游 `data.commentForest.trees` 结构转换为扁平评论记录
///
/// 结构不合法的条目（node 为空的"更多评论"占位、缺少 id）会被跳过并记录警告，
/// 本函数不会失败。
pub fn records_from_comment_forest(api_response: &Value) -> Vec<CommentRecord> {
    let Some(trees) = api_response
        .pointer("/data/commentForest/trees")
        .and_then(Value::as_array)
    else {
        tracing::warn!("响应中没有 commentForest.trees，返回空评论列表");
        return Vec::new();
    };

    let mut records = Vec::with_capacity(trees.len());
    for (index, tree) in trees.iter().enumerate() {
        let Some(node) = tree.get("node").filter(|n| n.is_object()) else {
            tracing::debug!("第 {} 个节点为空（更多评论占位），跳过", index);
            continue;
        };

        let Some(id) = node
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
        else {
            tracing::warn!("第 {} 个节点缺少有效 id，跳过", index);
            continue;
        };

        let body = node.get("content").map(extract_comment_content).unwrap_or_default();

        let author = node
            .pointer("/authorInfo/name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty() && *name != "[deleted]" && *name != "[removed]")
            .unwrap_or("unknown");

        let created_at = node
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|raw| parse_created_at(raw, id))
            .unwrap_or_else(Utc::now);

        records.push(CommentRecord {
            id: id.to_string(),
            parent_id: tree
                .get("parentId")
                .and_then(Value::as_str)
                .map(str::to_string),
            author: author.to_string(),
            body,
            score: node.get("score").and_then(Value::as_f64).unwrap_or(0.0) as i64,
            depth: tree.get("depth").and_then(Value::as_u64).unwrap_or(0) as u32,
            created_at,
            removed: node.get("isRemoved").and_then(Value::as_bool).unwrap_or(false),
        });
    }

    tracing::debug!("共 {} 个节点，成功转换 {} 条评论", trees.len(), records.len());
    records
}

/// 按 markdown > preview > html 的优先级提取评论正文
fn extract_comment_content(content: &Value) -> String {
    for format_name in ["markdown", "preview", "html"] {
        let Some(text) = content.get(format_name).and_then(Value::as_str) else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        if format_name == "html" {
            return strip_html(text);
        }
        return text.trim().to_string();
    }
    String::new()
}

fn strip_html(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("静态正则"));

    tag.replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn parse_created_at(raw: &str, comment_id: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.replace("+0000", "+00:00");
    match DateTime::parse_from_rfc3339(&normalized) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!("评论 {} 日期解析失败: {}", comment_id, e);
            None
        }
    }
}
