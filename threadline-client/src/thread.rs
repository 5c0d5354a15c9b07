use std::collections::HashMap;

use crate::api::{Comment, CommentId};

/// A comment along with the replies attached to it
#[derive(Debug)]
pub struct ThreadNode {
    comment: Comment,
    replies: Vec<ThreadNode>,
}

impl ThreadNode {
    pub fn comment(&self) -> &Comment {
        &self.comment
    }

    /// Direct replies, in the order of the flat input
    pub fn replies(&self) -> &[ThreadNode] {
        &self.replies
    }

    /// This node and all its descendants, depth-first, with depths relative to this node
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(0, self)],
        }
    }

    /// Number of comments in this subtree, this one included
    pub fn len(&self) -> usize {
        self.walk().count()
    }
}

// Replies are dropped from a heap-allocated stack, so that a very deep chain of
// replies does not overflow the call stack
impl Drop for ThreadNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

impl PartialEq for ThreadNode {
    fn eq(&self, other: &ThreadNode) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.comment != b.comment || a.replies.len() != b.replies.len() {
                return false;
            }
            pending.extend(a.replies.iter().zip(b.replies.iter()));
        }
        true
    }
}

impl Eq for ThreadNode {}

/// Pre-order traversal yielding `(depth, node)`
pub struct Walk<'a> {
    stack: Vec<(usize, &'a ThreadNode)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a ThreadNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.replies.iter().rev().map(|r| (depth + 1, r)));
        Some((depth, node))
    }
}

/// Parent reference that could not be honored while building a thread
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MalformedReference {
    /// The declared parent is not part of the comments that were loaded
    Orphan {
        comment: CommentId,
        missing_parent: CommentId,
    },
    /// Following parents from this comment loops back to it
    Cycle {
        comment: CommentId,
        parent: CommentId,
    },
}

impl MalformedReference {
    pub fn comment(&self) -> CommentId {
        match self {
            MalformedReference::Orphan { comment, .. } => *comment,
            MalformedReference::Cycle { comment, .. } => *comment,
        }
    }
}

/// The nested discussion of one article
#[derive(Debug, Eq, PartialEq)]
pub struct Thread {
    roots: Vec<ThreadNode>,
    malformed: Vec<MalformedReference>,
    len: usize,
}

impl Thread {
    pub fn empty() -> Thread {
        Thread {
            roots: Vec::new(),
            malformed: Vec::new(),
            len: 0,
        }
    }

    pub fn roots(&self) -> &[ThreadNode] {
        &self.roots
    }

    /// Comments that were promoted to the root level because of their parent reference
    pub fn malformed(&self) -> &[MalformedReference] {
        &self.malformed
    }

    /// Total number of comments, replies included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.roots.iter().rev().map(|r| (0, r)).collect(),
        }
    }

    pub fn find(&self, id: &CommentId) -> Option<&ThreadNode> {
        self.walk().map(|(_, n)| n).find(|n| n.comment.id == *id)
    }

    /// Depth of the deepest reply, 0 for a thread without replies
    pub fn max_depth(&self) -> usize {
        self.walk().map(|(d, _)| d).max().unwrap_or(0)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Visit {
    Pending,
    OnPath,
    Done,
}

/// Nest flat comments below their parents.
///
/// Every input comment ends up exactly once in the result. Relative order is
/// kept at every level, so callers sort the flat list beforehand. Comments
/// whose parent cannot be found, and the comment closing a reference loop,
/// become roots.
pub fn build_tree(flat: Vec<Comment>) -> Thread {
    let len = flat.len();

    // First occurrence of an id owns it
    let mut index = HashMap::with_capacity(len);
    for (i, c) in flat.iter().enumerate() {
        index.entry(c.id).or_insert(i);
    }

    let mut malformed = Vec::new();
    let mut parent: Vec<Option<usize>> = flat
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let declared = c.parent_comment_id?;
            match index.get(&declared) {
                Some(&p) if p != i => Some(p),
                Some(_) => {
                    malformed.push(MalformedReference::Cycle {
                        comment: c.id,
                        parent: declared,
                    });
                    None
                }
                None => {
                    malformed.push(MalformedReference::Orphan {
                        comment: c.id,
                        missing_parent: declared,
                    });
                    None
                }
            }
        })
        .collect();

    // Break reference loops at their earliest member
    let mut visit = vec![Visit::Pending; len];
    let mut path: Vec<usize> = Vec::new();
    for start in 0..len {
        let mut cur = Some(start);
        while let Some(c) = cur {
            match visit[c] {
                Visit::Done => break,
                Visit::OnPath => {
                    let loop_start = path.iter().position(|&p| p == c).unwrap_or(0);
                    if let Some(&breaker) = path[loop_start..].iter().min() {
                        if let Some(p) = parent[breaker].take() {
                            malformed.push(MalformedReference::Cycle {
                                comment: flat[breaker].id,
                                parent: flat[p].id,
                            });
                        }
                    }
                    break;
                }
                Visit::Pending => {
                    visit[c] = Visit::OnPath;
                    path.push(c);
                    cur = parent[c];
                }
            }
        }
        for p in path.drain(..) {
            visit[p] = Visit::Done;
        }
    }

    let mut children = vec![Vec::new(); len];
    let mut roots = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    // Assemble nodes children-first: reversed pre-order sees every node after its replies
    let mut pre_order = Vec::with_capacity(len);
    let mut stack = roots.iter().rev().copied().collect::<Vec<_>>();
    while let Some(i) = stack.pop() {
        pre_order.push(i);
        stack.extend(children[i].iter().rev());
    }
    let mut comments = flat.into_iter().map(Some).collect::<Vec<_>>();
    let mut built: Vec<Option<ThreadNode>> = (0..len).map(|_| None).collect();
    for &i in pre_order.iter().rev() {
        if let Some(comment) = comments[i].take() {
            let replies = children[i]
                .iter()
                .filter_map(|c| built[*c].take())
                .collect();
            built[i] = Some(ThreadNode { comment, replies });
        }
    }
    let roots = roots
        .into_iter()
        .filter_map(|r| built[r].take())
        .collect::<Vec<_>>();

    for m in malformed.iter() {
        tracing::warn!(reference = ?m, "promoted comment with malformed parent reference to root");
    }

    Thread {
        roots,
        malformed,
        len,
    }
}
