//! The in-process document: every rendered comment, every comment-list
//! container, vote widgets, the answer list and the page-level affordances
//! (reply form, thread modal, notifications, navigation).
//!
//! The document is the single source of truth for the controllers; there is
//! no separate mirror to keep consistent with it. It is shared between
//! controllers as [`SharedDocument`] and locked only for synchronous
//! sections, never across an await point.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::PageConfig;
use crate::error::{ClientError, Result};
use crate::models::{Author, CommentId, VoteState, VoteTarget};
use crate::notify::NotificationSurface;
use crate::render::{self, CommentFragment, DELETED_PLACEHOLDER};

/// Shared document handle: one per page view.
pub type SharedDocument = Arc<Mutex<Document>>;

/// Create a new, empty shared document.
pub fn new_shared_document() -> SharedDocument {
    Arc::new(Mutex::new(Document::default()))
}

/// Lock the document, mapping a poisoned lock to an error.
pub fn lock(doc: &SharedDocument) -> Result<MutexGuard<'_, Document>> {
    doc.lock().map_err(|_| ClientError::not_found("document (lock poisoned)"))
}

/// A comment-list container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerId {
    /// Top-level comment list of a question.
    Question(u64),
    /// Top-level comment list of an answer.
    Answer(u64),
    /// Direct replies of a comment.
    Replies(CommentId),
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerId::Question(id) => write!(f, "question-{id}-comments"),
            ContainerId::Answer(id) => write!(f, "answer-{id}-comments"),
            ContainerId::Replies(id) => write!(f, "replies-{id}"),
        }
    }
}

/// An ordered list of comments plus the trailing load-more affordance.
#[derive(Debug, Clone, Default)]
pub struct Container {
    pub items: Vec<CommentId>,
    pub collapsed: bool,
    /// `Some(n)` while `n` more direct children can be fetched.
    pub load_more: Option<u64>,
}

/// One rendered comment.
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub id: CommentId,
    pub parent: Option<CommentId>,
    pub container: ContainerId,
    pub level: u32,
    pub author: Option<Author>,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    pub can_delete: bool,
    pub accepted: bool,
    pub continue_thread: bool,
}

/// Up/down controls and the displayed score of one voteable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteWidget {
    pub state: VoteState,
    pub score: i64,
}

/// An answer entry in the answer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEntry {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub accepted: bool,
}

/// Modal showing a lazily fetched subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadModal {
    Loading { root: CommentId },
    Loaded { root: CommentId, fragments: Vec<CommentFragment> },
    Failed { root: CommentId, message: String },
}

/// Pending change of browser location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Redirect(String),
    Reload,
}

/// Where a new fragment goes inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Append,
    Prepend,
}

#[derive(Debug, Default)]
pub struct Document {
    nodes: HashMap<CommentId, CommentNode>,
    containers: HashMap<ContainerId, Container>,
    votes: HashMap<VoteTarget, VoteWidget>,
    answers: Vec<AnswerEntry>,
    /// Comment whose reply form is open; at most one application-wide.
    pub reply_form: Option<CommentId>,
    pub modal: Option<ThreadModal>,
    pub navigation: Option<Navigation>,
    pub notifications: NotificationSurface,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    // -- queries ------------------------------------------------------------

    pub fn contains(&self, id: CommentId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: CommentId) -> Option<&CommentNode> {
        self.nodes.get(&id)
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers.get(&id)
    }

    pub fn comment_count(&self) -> usize {
        self.nodes.len()
    }

    /// Highest comment id currently rendered, 0 when empty.
    pub fn max_comment_id(&self) -> CommentId {
        self.nodes.keys().copied().max().unwrap_or(0)
    }

    /// Ids in a container, in display order.
    pub fn items(&self, id: ContainerId) -> Vec<CommentId> {
        self.containers.get(&id).map(|c| c.items.clone()).unwrap_or_default()
    }

    /// Number of comments anywhere beneath a container.
    pub fn descendant_count(&self, id: ContainerId) -> usize {
        self.items(id)
            .into_iter()
            .map(|c| 1 + self.descendant_count(ContainerId::Replies(c)))
            .sum()
    }

    pub fn vote(&self, target: VoteTarget) -> Option<VoteWidget> {
        self.votes.get(&target).copied()
    }

    pub fn score(&self, target: VoteTarget) -> i64 {
        self.votes.get(&target).map(|w| w.score).unwrap_or(0)
    }

    pub fn answers(&self) -> &[AnswerEntry] {
        &self.answers
    }

    // -- mutation -----------------------------------------------------------

    /// Gate an action on authentication; anonymous viewers are sent to the
    /// login page and nothing else changes.
    pub fn require_auth(&mut self, page: &PageConfig) -> Result<()> {
        page.require_auth().inspect_err(|e| {
            if let ClientError::AuthRequired { redirect } = e {
                self.navigation = Some(Navigation::Redirect(redirect.clone()));
            }
        })
    }

    /// Register a vote widget (initial page render).
    pub fn add_vote_widget(&mut self, target: VoteTarget, widget: VoteWidget) {
        self.votes.insert(target, widget);
    }

    pub(crate) fn vote_mut(&mut self, target: VoteTarget) -> Option<&mut VoteWidget> {
        self.votes.get_mut(&target)
    }

    pub fn add_answer(&mut self, entry: AnswerEntry, score: i64) {
        self.votes.entry(VoteTarget::Answer(entry.id)).or_insert(VoteWidget { state: VoteState::None, score });
        self.answers.retain(|a| a.id != entry.id);
        self.answers.push(entry);
    }

    pub(crate) fn answers_mut(&mut self) -> &mut Vec<AnswerEntry> {
        &mut self.answers
    }

    pub(crate) fn container_mut(&mut self, id: ContainerId) -> &mut Container {
        self.containers.entry(id).or_default()
    }

    pub(crate) fn node_mut(&mut self, id: CommentId) -> Option<&mut CommentNode> {
        self.nodes.get_mut(&id)
    }

    /// Insert a rendered fragment (and its subtree) into `container`.
    ///
    /// Ids already present are skipped together with their subtrees' known
    /// parts; new descendants of a known id are still merged. Returns the ids
    /// that were newly inserted, which is the scope new behaviour has to be
    /// attached to.
    pub fn insert_fragment(
        &mut self,
        fragment: CommentFragment,
        container: ContainerId,
        position: Position,
    ) -> Vec<CommentId> {
        let mut inserted = Vec::new();
        self.insert_rec(fragment, container, position, &mut inserted);
        inserted
    }

    fn insert_rec(
        &mut self,
        fragment: CommentFragment,
        container: ContainerId,
        position: Position,
        inserted: &mut Vec<CommentId>,
    ) {
        let id = fragment.id;
        let replies_container = ContainerId::Replies(id);

        if !self.nodes.contains_key(&id) {
            let node = CommentNode {
                id,
                parent: match container {
                    ContainerId::Replies(p) => Some(p),
                    _ => None,
                },
                container,
                level: fragment.level,
                author: fragment.author,
                body_html: fragment.body_html,
                created_at: fragment.created_at,
                deleted: fragment.deleted,
                can_delete: fragment.can_delete,
                accepted: fragment.accepted,
                continue_thread: fragment.continue_thread,
            };
            self.nodes.insert(id, node);
            self.votes
                .entry(VoteTarget::Comment(id))
                .or_insert(VoteWidget { state: fragment.vote, score: fragment.score });

            let list = self.container_mut(container);
            match position {
                Position::Append => list.items.push(id),
                Position::Prepend => list.items.insert(0, id),
            }
            if fragment.remaining_replies > 0 {
                let replies = self.container_mut(replies_container);
                replies.load_more = Some(fragment.remaining_replies);
                replies.collapsed = fragment.collapsed;
            }
            inserted.push(id);
        }

        for reply in fragment.replies {
            self.insert_rec(reply, replies_container, Position::Append, inserted);
        }
    }

    /// Soft-delete a comment in place: placeholder body, no author link, no
    /// delete affordance. Position and replies are kept. Never reversed.
    pub(crate) fn mark_deleted(&mut self, id: CommentId) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or_else(|| ClientError::not_found(format!("comment-{id}")))?;
        node.deleted = true;
        node.author = None;
        node.can_delete = false;
        node.body_html = DELETED_PLACEHOLDER.to_string();
        Ok(())
    }

    // -- rendering back out -------------------------------------------------

    /// Current state of a comment and its subtree as a fragment.
    pub fn fragment(&self, id: CommentId, now: DateTime<Utc>) -> Option<CommentFragment> {
        let node = self.nodes.get(&id)?;
        let widget = self.vote(VoteTarget::Comment(id)).unwrap_or_default();
        let replies_container = self.containers.get(&ContainerId::Replies(id));
        let replies = self
            .items(ContainerId::Replies(id))
            .into_iter()
            .filter_map(|child| self.fragment(child, now))
            .collect();
        Some(CommentFragment {
            id,
            parent_id: node.parent,
            level: node.level,
            author: node.author.clone(),
            body_html: node.body_html.clone(),
            score: widget.score,
            vote: widget.state,
            created_at: node.created_at,
            relative_time: render::relative_time_since(node.created_at, now),
            deleted: node.deleted,
            can_delete: node.can_delete,
            accepted: node.accepted,
            collapsed: replies_container.is_some_and(|c| c.collapsed),
            remaining_replies: replies_container.and_then(|c| c.load_more).unwrap_or(0),
            continue_thread: node.continue_thread,
            replies,
        })
    }

    /// Markup of a whole container.
    pub fn container_html(&self, id: ContainerId, now: DateTime<Utc>) -> String {
        let collapsed = self.containers.get(&id).is_some_and(|c| c.collapsed);
        let mut out = format!(
            r#"<div id="{id}" class="comments-list{}">"#,
            if collapsed { " collapsed" } else { "" }
        );
        for child in self.items(id) {
            if let Some(f) = self.fragment(child, now) {
                out.push_str(&render::to_html(&f));
            }
        }
        out.push_str("</div>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Comment;
    use crate::render::{render, RenderContext};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn comment(id: CommentId, replies: Vec<Comment>) -> Comment {
        Comment {
            id,
            html_content: format!("<p>{id}</p>"),
            author: Some(Author { username: format!("u{id}"), profile_image: None, is_ai: false }),
            score: id as i64,
            created_at: now(),
            parent_comment_id: None,
            replies,
            is_deleted: false,
            is_accepted: false,
            can_delete: true,
            user_vote: 0,
            remaining_replies: 0,
        }
    }

    fn frag(c: &Comment) -> CommentFragment {
        render(c, 0, &RenderContext::at(now()))
    }

    #[test]
    fn insert_flattens_tree_into_containers() {
        let mut doc = Document::new();
        let tree = comment(1, vec![comment(2, vec![comment(3, vec![])])]);
        let inserted = doc.insert_fragment(frag(&tree), ContainerId::Question(9), Position::Append);
        assert_eq!(inserted, vec![1, 2, 3]);
        assert_eq!(doc.items(ContainerId::Question(9)), vec![1]);
        assert_eq!(doc.items(ContainerId::Replies(1)), vec![2]);
        assert_eq!(doc.items(ContainerId::Replies(2)), vec![3]);
        assert_eq!(doc.node(3).unwrap().level, 2);
        assert_eq!(doc.node(3).unwrap().parent, Some(2));
        assert_eq!(doc.score(VoteTarget::Comment(3)), 3);
        assert_eq!(doc.max_comment_id(), 3);
        assert_eq!(doc.descendant_count(ContainerId::Question(9)), 3);
    }

    #[test]
    fn reinsert_is_a_no_op() {
        let mut doc = Document::new();
        let c = comment(1, vec![]);
        doc.insert_fragment(frag(&c), ContainerId::Question(9), Position::Append);
        let again = doc.insert_fragment(frag(&c), ContainerId::Question(9), Position::Append);
        assert!(again.is_empty());
        assert_eq!(doc.items(ContainerId::Question(9)), vec![1]);
    }

    #[test]
    fn prepend_puts_fragment_first() {
        let mut doc = Document::new();
        doc.insert_fragment(frag(&comment(1, vec![])), ContainerId::Question(9), Position::Append);
        doc.insert_fragment(frag(&comment(2, vec![])), ContainerId::Question(9), Position::Prepend);
        assert_eq!(doc.items(ContainerId::Question(9)), vec![2, 1]);
    }

    #[test]
    fn mark_deleted_keeps_position_and_replies() {
        let mut doc = Document::new();
        let tree = comment(1, vec![comment(2, vec![])]);
        doc.insert_fragment(frag(&tree), ContainerId::Question(9), Position::Append);
        doc.mark_deleted(1).unwrap();
        let node = doc.node(1).unwrap();
        assert!(node.deleted && node.author.is_none() && !node.can_delete);
        assert_eq!(doc.items(ContainerId::Replies(1)), vec![2]);
        let html = doc.container_html(ContainerId::Question(9), now());
        assert!(html.contains(DELETED_PLACEHOLDER));
        assert!(html.contains("comment-2"));
    }

    #[test]
    fn mark_deleted_unknown_is_not_found() {
        let mut doc = Document::new();
        assert!(matches!(doc.mark_deleted(77), Err(ClientError::NotFound { .. })));
    }

    #[test]
    fn fragment_round_trips_load_more_state() {
        let mut doc = Document::new();
        let mut c = comment(4, vec![]);
        c.remaining_replies = 2;
        doc.insert_fragment(frag(&c), ContainerId::Answer(1), Position::Append);
        let f = doc.fragment(4, now()).unwrap();
        assert_eq!(f.remaining_replies, 2);
        assert_eq!(doc.container(ContainerId::Replies(4)).unwrap().load_more, Some(2));
    }

    #[test]
    fn container_ids_display_as_element_ids() {
        assert_eq!(ContainerId::Question(3).to_string(), "question-3-comments");
        assert_eq!(ContainerId::Replies(8).to_string(), "replies-8");
    }
}
