//! Arena-backed comment trees and chain scoring.

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommentId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub author: String,
    /// Cleaned body text.
    pub body: String,
    pub score: i64,
    pub gilded: i64,
    pub replies: Vec<CommentId>,
}

impl Comment {
    pub fn new(id: impl Into<String>, author: impl Into<String>, body: impl Into<String>, score: i64) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            body: body.into(),
            score,
            gilded: 0,
            replies: Vec::new(),
        }
    }
}

/// All comments of one post. Replies are owned by their parent through ids,
/// and a child is always inserted after its parent.
#[derive(Debug, Clone, Default)]
pub struct CommentForest {
    nodes: Vec<Comment>,
    roots: Vec<CommentId>,
}

impl CommentForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `comment` as a top-level comment or as the last reply of `parent`.
    pub fn push(&mut self, parent: Option<CommentId>, mut comment: Comment) -> CommentId {
        comment.replies.clear();
        let id = CommentId(self.nodes.len());
        self.nodes.push(comment);
        match parent {
            Some(p) => self.nodes[p.0].replies.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: CommentId) -> &Comment {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[CommentId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Own score plus the score of every descendant, via an explicit
    /// post-order walk so deep threads cannot overflow the stack.
    pub fn chain_score(&self, id: CommentId) -> i64 {
        let mut stack = vec![(id, false)];
        let mut totals: Vec<i64> = Vec::new();
        while let Some((node, expanded)) = stack.pop() {
            let comment = self.get(node);
            if expanded {
                let children = comment.replies.len();
                let from_children: i64 = totals.drain(totals.len() - children..).sum();
                totals.push(comment.score + from_children);
            } else {
                stack.push((node, true));
                for &reply in comment.replies.iter().rev() {
                    stack.push((reply, false));
                }
            }
        }
        totals.pop().unwrap_or(0)
    }

    /// Top-level comments whose chain score exceeds `threshold`, in order,
    /// stopping at the first one whose body no longer fits `char_budget`.
    /// Removed comments have an empty body and are never selected.
    pub fn select(&self, threshold: i64, char_budget: Option<usize>) -> Vec<CommentId> {
        info!("There are {} top-level comments", self.roots.len());
        let filtered: Vec<CommentId> = self
            .roots
            .iter()
            .copied()
            .filter(|&id| {
                let score = self.chain_score(id);
                debug!(
                    "Comment from {} has {} score, chain score {}",
                    self.get(id).author,
                    self.get(id).score,
                    score
                );
                score > threshold && !self.get(id).body.is_empty()
            })
            .collect();
        info!("After score filtering there are {} comments left", filtered.len());

        let Some(mut remaining) = char_budget else {
            return filtered;
        };
        let mut selected = Vec::new();
        for id in filtered {
            let len = self.get(id).body.len();
            if len > remaining {
                break;
            }
            remaining -= len;
            selected.push(id);
        }
        info!("Limiting to {} comments", selected.len());
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root(10) -> [a(5) -> [c(1), d(2)], b(-3)]; other(200)
    fn three_level_forest() -> (CommentForest, CommentId, CommentId) {
        let mut forest = CommentForest::new();
        let root = forest.push(None, Comment::new("r", "alice", "root body", 10));
        let a = forest.push(Some(root), Comment::new("a", "bob", "a", 5));
        forest.push(Some(a), Comment::new("c", "carol", "c", 1));
        forest.push(Some(a), Comment::new("d", "dave", "d", 2));
        forest.push(Some(root), Comment::new("b", "erin", "b", -3));
        let other = forest.push(None, Comment::new("o", "frank", "other body", 200));
        (forest, root, other)
    }

    #[test]
    fn chain_score_sums_all_descendants() {
        let (forest, root, other) = three_level_forest();
        assert_eq!(forest.chain_score(root), 10 + 5 + 1 + 2 - 3);
        assert_eq!(forest.chain_score(other), 200);
        assert_eq!(forest.len(), 6);
    }

    #[test]
    fn chain_score_equals_own_plus_children() {
        let (forest, root, _) = three_level_forest();
        let comment = forest.get(root);
        let children: i64 = comment.replies.iter().map(|&c| forest.chain_score(c)).sum();
        assert_eq!(forest.chain_score(root), comment.score + children);
    }

    #[test]
    fn deep_thread_does_not_recurse() {
        let mut forest = CommentForest::new();
        let mut parent = forest.push(None, Comment::new("0", "x", "", 1));
        let root = parent;
        for i in 1..100_000 {
            parent = forest.push(Some(parent), Comment::new(i.to_string(), "x", "", 1));
        }
        assert_eq!(forest.chain_score(root), 100_000);
    }

    #[test]
    fn select_filters_by_threshold() {
        let (forest, _, other) = three_level_forest();
        assert_eq!(forest.select(100, None), vec![other]);
        assert_eq!(forest.select(10, None).len(), 2);
    }

    #[test]
    fn removed_comment_counts_but_is_not_selected() {
        let mut forest = CommentForest::new();
        let removed = forest.push(None, Comment::new("gone", "x", "", 90));
        forest.push(Some(removed), Comment::new("kept", "y", "reply", 50));
        assert_eq!(forest.chain_score(removed), 140);
        assert!(forest.select(100, None).is_empty());
    }

    #[test]
    fn select_stops_at_first_overflowing_body() {
        let mut forest = CommentForest::new();
        let a = forest.push(None, Comment::new("a", "x", "x".repeat(40), 500));
        forest.push(None, Comment::new("b", "x", "x".repeat(80), 500));
        forest.push(None, Comment::new("c", "x", "x".repeat(10), 500));
        // b does not fit the remaining 60 chars, so c is not considered either.
        assert_eq!(forest.select(100, Some(100)), vec![a]);
    }
}
