//! 评论树构建 - 业务能力层
//!
//! 把扁平的评论记录（id + 可选 parent_id）重建为嵌套评论树，
//! 并提供按数量截断评论树、统计评论树规模的工具函数。
//!
//! ## 保证
//!
//! - 每条有效记录在输出中恰好出现一次（作为根，或作为唯一父节点的子节点）
//! - 父评论缺失 / 指向自身 / 处于父链环中的记录成为根，不会丢失
//! - 兄弟节点和根节点的顺序与输入顺序一致，相同输入得到相同输出
//! - 已删除的评论仍作为节点保留，正文替换为删除标记，避免其回复脱离树

use crate::models::comment::{CommentNode, CommentRecord};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// 父链遍历状态
#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    OnPath,
    Done,
}

/// 扁平评论记录 → 嵌套评论树
pub fn build_forest(records: Vec<CommentRecord>) -> Vec<CommentNode> {
    if records.is_empty() {
        return Vec::new();
    }

    // 第一遍：按 id 建索引，丢弃缺少 id 和重复 id 的记录
    let mut nodes: Vec<CommentRecord> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for record in records {
        if record.id.trim().is_empty() {
            warn!("评论记录缺少 id，已丢弃 (作者: {})", record.author);
            continue;
        }
        if index.contains_key(&record.id) {
            warn!("评论 id {} 重复，保留第一条", record.id);
            continue;
        }
        index.insert(record.id.clone(), nodes.len());
        nodes.push(record);
    }

    // 第二遍：只按直接 parent_id 解析父节点
    let mut parent: Vec<Option<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(i, record)| {
            record
                .parent_id
                .as_deref()
                .and_then(|pid| index.get(pid).copied())
                .filter(|&p| p != i)
        })
        .collect();

    break_cycles(&mut parent, &nodes);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    // 先序遍历得到结构深度；逆先序组装节点，保证子节点先于父节点完成
    let mut depth = vec![0u32; nodes.len()];
    let mut preorder = Vec::with_capacity(nodes.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        preorder.push(i);
        for &c in children[i].iter().rev() {
            depth[c] = depth[i] + 1;
            stack.push(c);
        }
    }

    let mut slots: Vec<Option<CommentNode>> = nodes
        .into_iter()
        .map(|record| Some(CommentNode::from_record(record)))
        .collect();

    for &i in preorder.iter().rev() {
        let kids: Vec<CommentNode> = children[i]
            .iter()
            .filter_map(|&c| slots[c].take())
            .collect();
        if let Some(node) = slots[i].as_mut() {
            node.depth = depth[i];
            node.children = kids;
        }
    }

    let forest: Vec<CommentNode> = roots.iter().filter_map(|&r| slots[r].take()).collect();
    debug!("评论树构建完成: {} 个根评论", forest.len());
    forest
}

/// 把处于父链环中的记录全部提升为根
fn break_cycles(parent: &mut [Option<usize>], nodes: &[CommentRecord]) {
    let mut state = vec![Visit::Unvisited; parent.len()];

    for start in 0..parent.len() {
        if state[start] != Visit::Unvisited {
            continue;
        }

        let mut path = Vec::new();
        let mut current = start;
        loop {
            match state[current] {
                Visit::Unvisited => {
                    state[current] = Visit::OnPath;
                    path.push(current);
                    match parent[current] {
                        Some(p) => current = p,
                        None => break,
                    }
                }
                Visit::OnPath => {
                    let cycle_start = path.iter().position(|&n| n == current).unwrap_or(0);
                    for &member in &path[cycle_start..] {
                        warn!("评论 {} 的父链形成环，作为根评论处理", nodes[member].id);
                        parent[member] = None;
                    }
                    break;
                }
                Visit::Done => break,
            }
        }

        for n in path {
            state[n] = Visit::Done;
        }
    }
}

/// 按层（广度优先）截断评论树，最多保留 `max_comments` 条
///
/// 按发现顺序逐层保留评论；父评论未被保留时，其子评论一定不会被保留。
pub fn cap_forest(forest: &[CommentNode], max_comments: usize) -> Vec<CommentNode> {
    if count_comments(forest) <= max_comments {
        return forest.to_vec();
    }

    let mut kept: HashSet<&str> = HashSet::with_capacity(max_comments);
    let mut queue: VecDeque<&CommentNode> = forest.iter().collect();
    while let Some(node) = queue.pop_front() {
        if kept.len() >= max_comments {
            break;
        }
        kept.insert(node.id.as_str());
        queue.extend(node.children.iter());
    }

    retain_kept(forest, &kept)
}

fn retain_kept(nodes: &[CommentNode], kept: &HashSet<&str>) -> Vec<CommentNode> {
    nodes
        .iter()
        .filter(|node| kept.contains(node.id.as_str()))
        .map(|node| CommentNode {
            children: retain_kept(&node.children, kept),
            ..shallow(node)
        })
        .collect()
}

fn shallow(node: &CommentNode) -> CommentNode {
    CommentNode {
        id: node.id.clone(),
        parent_id: node.parent_id.clone(),
        author: node.author.clone(),
        body: node.body.clone(),
        score: node.score,
        depth: node.depth,
        created_at: node.created_at,
        removed: node.removed,
        children: Vec::new(),
    }
}

/// 评论总数（含所有回复）
pub fn count_comments(forest: &[CommentNode]) -> usize {
    forest
        .iter()
        .map(|node| 1 + count_comments(&node.children))
        .sum()
}

/// 评论树的层数，空树为 0，只有顶层评论为 1
pub fn max_depth(forest: &[CommentNode]) -> usize {
    forest
        .iter()
        .map(|node| 1 + max_depth(&node.children))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment::DELETED_MARKER;

    fn record(id: &str, parent: Option<&str>) -> CommentRecord {
        let r = CommentRecord::new(id, "user", format!("comment {id}"));
        match parent {
            Some(parent) => r.with_parent(parent),
            None => r,
        }
    }

    fn collect_ids(forest: &[CommentNode], out: &mut Vec<String>) {
        for node in forest {
            out.push(node.id.clone());
            collect_ids(&node.children, out);
        }
    }

    fn all_ids(forest: &[CommentNode]) -> Vec<String> {
        let mut ids = Vec::new();
        collect_ids(forest, &mut ids);
        ids.sort();
        ids
    }

    #[test]
    fn test_empty_input() {
        assert!(build_forest(Vec::new()).is_empty());
    }

    #[test]
    fn test_single_chain_of_ten() {
        let mut records = vec![record("c1", None)];
        for i in 2..=10 {
            let mut r = record(&format!("c{i}"), Some(&format!("c{}", i - 1)));
            r.depth = 99; // 参考深度不可信
            records.push(r);
        }

        let forest = build_forest(records);
        assert_eq!(forest.len(), 1);
        assert_eq!(max_depth(&forest), 10);

        let mut level = &forest;
        for expected_depth in 0..10u32 {
            assert_eq!(level.len(), 1, "每层只有一个节点");
            assert_eq!(level[0].id, format!("c{}", expected_depth + 1));
            assert_eq!(level[0].depth, expected_depth);
            level = &level[0].children;
        }
        assert!(level.is_empty());
    }

    #[test]
    fn test_orphan_becomes_root() {
        let forest = build_forest(vec![
            record("a", None),
            record("b", Some("missing")),
            record("c", Some("a")),
        ]);
        let roots: Vec<&str> = forest.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, vec!["a", "b"]);
        assert_eq!(forest[0].children[0].id, "c");
    }

    #[test]
    fn test_self_parent_becomes_root() {
        let forest = build_forest(vec![record("a", Some("a")), record("b", Some("a"))]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id, "a");
        assert_eq!(forest[0].children[0].id, "b");
    }

    #[test]
    fn test_mutual_cycle_is_broken() {
        let forest = build_forest(vec![
            record("x", Some("y")),
            record("y", Some("x")),
            record("z", Some("y")),
            record("w", Some("v")),
            record("v", Some("u")),
            record("u", Some("w")),
        ]);

        assert_eq!(
            all_ids(&forest),
            vec!["u", "v", "w", "x", "y", "z"],
            "环中的记录不能丢失"
        );
        let roots: Vec<&str> = forest.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, vec!["x", "y", "w", "v", "u"]);
        assert_eq!(forest[1].children[0].id, "z");
    }

    #[test]
    fn test_every_record_appears_once() {
        let records = vec![
            record("1", None),
            record("2", Some("1")),
            record("3", Some("2")),
            record("4", Some("9")),
            record("5", Some("5")),
            record("6", Some("1")),
            record("7", Some("6")),
            record("8", Some("4")),
        ];
        let forest = build_forest(records);
        assert_eq!(count_comments(&forest), 8);
        assert_eq!(all_ids(&forest), vec!["1", "2", "3", "4", "5", "6", "7", "8"]);
    }

    #[test]
    fn test_missing_and_duplicate_ids_dropped() {
        let forest = build_forest(vec![
            record("", None),
            record("a", None),
            CommentRecord::new("a", "other", "duplicate"),
        ]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].body, "comment a");
    }

    #[test]
    fn test_deleted_comment_keeps_children() {
        let mut removed = record("a", None);
        removed.removed = true;
        let mut blank = record("b", Some("a"));
        blank.body = "[removed]".to_string();

        let forest = build_forest(vec![removed, blank, record("c", Some("b"))]);
        assert_eq!(forest[0].body, DELETED_MARKER);
        assert!(forest[0].removed);
        assert_eq!(forest[0].children[0].body, DELETED_MARKER);
        assert_eq!(forest[0].children[0].children[0].id, "c");
    }

    #[test]
    fn test_deterministic_sibling_order() {
        let records = vec![
            record("r1", None),
            record("k3", Some("r1")),
            record("r2", None),
            record("k1", Some("r1")),
            record("k2", Some("r1")),
        ];
        let first = build_forest(records.clone());
        let second = build_forest(records);
        assert_eq!(first, second);

        let kids: Vec<&str> = first[0].children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(kids, vec!["k3", "k1", "k2"]);
        assert_eq!(first[1].id, "r2");
    }

    #[test]
    fn test_cap_forest_is_breadth_first() {
        // r1 ─ a ─ a1
        //    └ b
        // r2 ─ c
        let forest = build_forest(vec![
            record("r1", None),
            record("a", Some("r1")),
            record("a1", Some("a")),
            record("b", Some("r1")),
            record("r2", None),
            record("c", Some("r2")),
        ]);

        let capped = cap_forest(&forest, 4);
        assert_eq!(count_comments(&capped), 4);
        assert_eq!(all_ids(&capped), vec!["a", "b", "r1", "r2"]);

        let capped = cap_forest(&forest, 1);
        assert_eq!(all_ids(&capped), vec!["r1"]);
        assert!(capped[0].children.is_empty());

        assert!(cap_forest(&forest, 0).is_empty());
        assert_eq!(cap_forest(&forest, 100), forest);
    }

    #[test]
    fn test_cap_forest_never_orphans() {
        let mut records = vec![record("c1", None)];
        for i in 2..=20 {
            records.push(record(&format!("c{i}"), Some(&format!("c{}", i - 1))));
        }
        let forest = build_forest(records);
        let capped = cap_forest(&forest, 5);
        assert_eq!(capped.len(), 1);
        assert_eq!(max_depth(&capped), 5);
    }
}
