use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{BlogError, Result};
use crate::messages::{record_notice, Notice};
use crate::pager::Pager;
use crate::store::Store;

/// Text shown in place of a parent that cannot be found.
pub const MISSING_PARENT: &str = "parent comment not found";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Comment {
    pub id: u64,
    pub post_id: u64,
    pub author: String,
    pub email: String,
    pub website: String,
    pub content: String,
    pub approved: bool,
    /// 0 for a top-level comment.
    pub parent_id: u64,
    pub created_at: NaiveDateTime,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id != 0
    }

    fn sort_key(&self) -> Reverse<(NaiveDateTime, u64)> {
        Reverse((self.created_at, self.id))
    }
}

/// A comment as submitted by a visitor.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CommentDraft {
    pub post_id: u64,
    #[validate(length(min = 1, message = "name is required"))]
    pub author: String,
    #[validate(email(message = "email format not valid"))]
    pub email: String,
    #[validate(url(message = "website URL format not valid"))]
    pub website: Option<String>,
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,
    #[serde(default)]
    pub parent_id: u64,
}

impl CommentDraft {
    fn normalized(mut self) -> Self {
        self.author = self.author.trim().to_string();
        self.email = self.email.trim().to_string();
        self.content = self.content.trim().to_string();
        self.website = self
            .website
            .map(|site| site.trim().to_string())
            .filter(|site| !site.is_empty());
        self
    }
}

/// One entry of a rendered thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommentNode {
    Comment {
        comment: Comment,
        children: Vec<CommentNode>,
    },
    /// Stands in for a parent that is missing, deleted or unapproved.
    Placeholder {
        parent_id: u64,
        message: &'static str,
        children: Vec<CommentNode>,
    },
}

impl CommentNode {
    pub fn children(&self) -> &[CommentNode] {
        match self {
            CommentNode::Comment { children, .. } | CommentNode::Placeholder { children, .. } => {
                children
            }
        }
    }

    pub fn comment(&self) -> Option<&Comment> {
        match self {
            CommentNode::Comment { comment, .. } => Some(comment),
            CommentNode::Placeholder { .. } => None,
        }
    }
}

/// Replies nested deeper than this are shown as siblings at this depth.
pub const MAX_NESTING: usize = 32;

/// A structural problem found while assembling a thread. None of these
/// fail the fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ThreadIssue {
    DanglingParent { comment_id: u64, parent_id: u64 },
    /// The comment is part of a parent loop and is dropped.
    Cycle { comment_id: u64 },
    /// The comment descends from a loop and is dropped with it.
    UnderCycle { comment_id: u64 },
    /// Replies below this comment were flattened into its children.
    DepthLimited { comment_id: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentThread {
    pub roots: Vec<CommentNode>,
    pub issues: Vec<ThreadIssue>,
}

/// Loads the approved comments of a post and nests them by parent.
pub fn build_thread<S: Store + ?Sized>(store: &mut S, post_id: u64) -> Result<CommentThread> {
    let roots = store.top_level_comments(post_id)?;
    let replies = store.replies_for_post(post_id)?;
    let thread = assemble_thread(roots, replies);
    for issue in &thread.issues {
        tracing::warn!("comment thread of post {}: {:?}", post_id, issue);
    }
    Ok(thread)
}

/// Where a reply ends up once its parent links are followed upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Attached,
    Orphan { top: u64, parent_id: u64 },
    InCycle,
    UnderCycle,
}

struct Assembler {
    index: HashMap<u64, Comment>,
    root_ids: HashSet<u64>,
    fates: HashMap<u64, Fate>,
    children_of: HashMap<u64, Vec<u64>>,
    issues: Vec<ThreadIssue>,
}

impl Assembler {
    /// Walks parent links up from the reply `id`, settling the fate of
    /// every comment on the way.
    fn classify(&mut self, id: u64) {
        let mut path: Vec<u64> = Vec::new();
        let mut on_path: HashMap<u64, usize> = HashMap::new();
        let mut current = id;
        let fate = loop {
            if self.root_ids.contains(&current) {
                break Fate::Attached;
            }
            if let Some(known) = self.fates.get(&current) {
                break match known {
                    Fate::InCycle | Fate::UnderCycle => Fate::UnderCycle,
                    other => *other,
                };
            }
            if let Some(&start) = on_path.get(&current) {
                for member in path.drain(start..) {
                    self.fates.insert(member, Fate::InCycle);
                }
                break Fate::UnderCycle;
            }
            let Some(comment) = self.index.get(&current) else {
                match path.last() {
                    Some(&top) => break Fate::Orphan { top, parent_id: current },
                    None => return,
                }
            };
            on_path.insert(current, path.len());
            path.push(current);
            current = comment.parent_id;
        };
        for member in path {
            self.fates.insert(member, fate);
        }
    }

    /// Builds the subtree of every top comment without recursion. Nodes
    /// past [`MAX_NESTING`] hang off their deepest allowed ancestor.
    fn grow(&mut self, tops: &[u64]) -> HashMap<u64, CommentNode> {
        let mut order: Vec<(u64, Option<u64>)> = Vec::new();
        // (id, display parent, depth below its top)
        let mut stack: Vec<(u64, Option<u64>, usize)> =
            tops.iter().rev().map(|&top| (top, None, 0)).collect();
        let mut limited: HashSet<u64> = HashSet::new();
        while let Some((id, anchor, depth)) = stack.pop() {
            order.push((id, anchor));
            let Some(child_ids) = self.children_of.get(&id) else {
                continue;
            };
            let child_anchor = if depth < MAX_NESTING {
                id
            } else {
                let deepest = anchor.unwrap_or(id);
                if limited.insert(deepest) {
                    self.issues.push(ThreadIssue::DepthLimited { comment_id: deepest });
                }
                deepest
            };
            for &child in child_ids.iter().rev() {
                stack.push((child, Some(child_anchor), depth + 1));
            }
        }

        let mut built: HashMap<u64, Vec<CommentNode>> = HashMap::new();
        let mut finished = HashMap::with_capacity(tops.len());
        for (id, anchor) in order.into_iter().rev() {
            let Some(comment) = self.index.get(&id).cloned() else {
                continue;
            };
            let mut children = built.remove(&id).unwrap_or_default();
            children.sort_by_key(|node| node.comment().map(Comment::sort_key));
            let node = CommentNode::Comment { comment, children };
            match anchor {
                Some(parent) => built.entry(parent).or_default().push(node),
                None => {
                    finished.insert(id, node);
                }
            }
        }
        finished
    }
}

/// Nests `replies` under `roots`.
///
/// Siblings are ordered newest first. Replies whose parent is absent hang
/// off a placeholder after the real roots; replies whose ancestry loops are
/// dropped. Both are reported in [`CommentThread::issues`].
pub fn assemble_thread(mut roots: Vec<Comment>, replies: Vec<Comment>) -> CommentThread {
    roots.sort_by_key(Comment::sort_key);
    roots.dedup_by_key(|root| root.id);

    let mut asm = Assembler {
        index: HashMap::with_capacity(roots.len() + replies.len()),
        root_ids: roots.iter().map(|root| root.id).collect(),
        fates: HashMap::new(),
        children_of: HashMap::new(),
        issues: Vec::new(),
    };
    for root in &roots {
        asm.index.insert(root.id, root.clone());
    }

    let mut replies: Vec<Comment> = replies
        .into_iter()
        .filter(|reply| !asm.root_ids.contains(&reply.id))
        .collect();
    replies.sort_by_key(Comment::sort_key);
    replies.dedup_by_key(|reply| reply.id);
    for reply in &replies {
        asm.index.insert(reply.id, reply.clone());
    }
    for reply in &replies {
        asm.classify(reply.id);
    }

    let mut orphan_tops: Vec<u64> = Vec::new();
    let mut groups: Vec<(u64, Vec<u64>)> = Vec::new();
    for reply in &replies {
        let Some(fate) = asm.fates.get(&reply.id).copied() else {
            continue;
        };
        match fate {
            Fate::Attached => {}
            Fate::Orphan { top, parent_id } if top == reply.id => {
                asm.issues.push(ThreadIssue::DanglingParent {
                    comment_id: top,
                    parent_id,
                });
                orphan_tops.push(top);
                match groups.iter_mut().find(|(id, _)| *id == parent_id) {
                    Some((_, group)) => group.push(top),
                    None => groups.push((parent_id, vec![top])),
                }
            }
            Fate::Orphan { .. } => {}
            Fate::InCycle => asm.issues.push(ThreadIssue::Cycle {
                comment_id: reply.id,
            }),
            Fate::UnderCycle => asm.issues.push(ThreadIssue::UnderCycle {
                comment_id: reply.id,
            }),
        }
        if matches!(fate, Fate::Attached | Fate::Orphan { .. }) {
            asm.children_of
                .entry(reply.parent_id)
                .or_default()
                .push(reply.id);
        }
    }

    let mut tops: Vec<u64> = roots.iter().map(|root| root.id).collect();
    tops.extend(&orphan_tops);
    let mut finished = asm.grow(&tops);

    let mut nodes: Vec<CommentNode> = roots
        .iter()
        .filter_map(|root| finished.remove(&root.id))
        .collect();
    for (parent_id, members) in groups {
        let children = members
            .iter()
            .filter_map(|top| finished.remove(top))
            .collect();
        nodes.push(CommentNode::Placeholder {
            parent_id,
            message: MISSING_PARENT,
            children,
        });
    }

    CommentThread {
        roots: nodes,
        issues: asm.issues,
    }
}

/// The quoted parent shown next to a reply in flat listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParentQuote {
    TopLevel,
    Found { author: String, content: String },
    Missing { parent_id: u64 },
}

impl ParentQuote {
    pub fn render(&self) -> String {
        match self {
            ParentQuote::TopLevel => String::new(),
            ParentQuote::Found { author, content } => format!("> @{author}\n\n> {content}\n"),
            ParentQuote::Missing { .. } => format!("> {MISSING_PARENT}."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentListing {
    pub comment: Comment,
    pub parent: ParentQuote,
}

fn parent_quote<S: Store + ?Sized>(store: &mut S, comment: &Comment) -> Result<ParentQuote> {
    if !comment.is_reply() {
        return Ok(ParentQuote::TopLevel);
    }
    Ok(match store.comment_by_id(comment.parent_id)? {
        Some(parent) => ParentQuote::Found {
            author: parent.author,
            content: parent.content,
        },
        None => {
            tracing::warn!(
                "comment {} references missing parent {}",
                comment.id,
                comment.parent_id
            );
            ParentQuote::Missing {
                parent_id: comment.parent_id,
            }
        }
    })
}

/// One page of all comments, newest first, each with its quoted parent.
pub fn list_comments<S: Store + ?Sized>(
    store: &mut S,
    page: u64,
    page_size: u64,
    only_approved: bool,
) -> Result<(Vec<CommentListing>, Pager)> {
    if page == 0 || page_size == 0 {
        return Err(BlogError::InvalidPage { page, page_size });
    }
    let total = store.count_comments(only_approved)?;
    let pager = Pager::new(page, page_size, total);
    if !pager.is_valid {
        return Err(BlogError::PageNotFound { page });
    }

    let comments = store.list_comments(only_approved, pager.page_size, pager.offset)?;
    let mut listings = Vec::with_capacity(comments.len());
    for comment in comments {
        let parent = parent_quote(store, &comment)?;
        listings.push(CommentListing { comment, parent });
    }
    Ok((listings, pager))
}

/// Validates and stores a visitor comment, leaving an admin notice.
pub fn submit_comment<S: Store + ?Sized>(
    store: &mut S,
    draft: CommentDraft,
    approved: bool,
) -> Result<Comment> {
    let draft = draft.normalized();
    draft.validate()?;

    let post = store.post_by_id(draft.post_id)?.ok_or(BlogError::NotFound {
        entity: "post",
        id: draft.post_id,
    })?;
    if !post.allow_comment {
        return Err(BlogError::Validation(format!(
            "comments are closed on post {}",
            draft.post_id
        )));
    }

    let mut comment = Comment {
        id: 0,
        post_id: draft.post_id,
        author: draft.author,
        email: draft.email,
        website: draft.website.unwrap_or_default(),
        content: draft.content,
        approved,
        parent_id: draft.parent_id,
        created_at: Utc::now().naive_utc(),
    };
    comment.id = store.insert_comment(&comment)?;

    let parent = if comment.is_reply() {
        store.comment_by_id(comment.parent_id)?
    } else {
        None
    };
    let notice = match parent {
        Some(parent) => Notice::Reply {
            author: comment.author.clone(),
            parent_author: parent.author,
            post_title: post.title,
            content: comment.content.clone(),
        },
        None => Notice::Comment {
            author: comment.author.clone(),
            post_title: post.title,
            content: comment.content.clone(),
        },
    };
    record_notice(store, &notice)?;

    tracing::info!("comment {} stored on post {}", comment.id, comment.post_id);
    Ok(comment)
}

pub fn set_comment_approved<S: Store + ?Sized>(store: &mut S, id: u64, approved: bool) -> Result<()> {
    if !store.set_comment_approved(id, approved)? {
        return Err(BlogError::NotFound { entity: "comment", id });
    }
    Ok(())
}

/// Deletes one comment. Its replies stay and render under a placeholder.
pub fn delete_comment<S: Store + ?Sized>(store: &mut S, id: u64) -> Result<()> {
    if !store.delete_comment(id)? {
        return Err(BlogError::NotFound { entity: "comment", id });
    }
    Ok(())
}
