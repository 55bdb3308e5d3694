//! Comment tree controller: expand/collapse, reply forms, deletion, sorting,
//! reply pagination and thread continuation over the rendered document.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::PageConfig;
use crate::document::{lock, ContainerId, Navigation, Position, SharedDocument, ThreadModal};
use crate::error::{ClientError, Result};
use crate::models::{CommentId, VoteTarget};
use crate::notify::NotificationKind;
use crate::render::{self, RenderContext};

/// Ordering applied to already-fetched top-level siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Score, highest first.
    Votes,
    /// Creation time, most recent first.
    Newest,
    /// Creation time, oldest first.
    Oldest,
    /// Absolute score, nearest zero first.
    Controversial,
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortKey::Votes => write!(f, "votes"),
            SortKey::Newest => write!(f, "newest"),
            SortKey::Oldest => write!(f, "oldest"),
            SortKey::Controversial => write!(f, "controversial"),
        }
    }
}

/// What a sort needs to know about one sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortEntry {
    pub id: u64,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    /// Pinned entries (the accepted answer) always come first.
    pub pinned: bool,
}

/// Stable sort of `entries` by `key`; equal keys keep their current order.
pub fn sort_entries(entries: &mut [SortEntry], key: SortKey) {
    entries.sort_by(|a, b| {
        b.pinned.cmp(&a.pinned).then_with(|| match key {
            SortKey::Votes => b.score.cmp(&a.score),
            SortKey::Newest => b.created_at.cmp(&a.created_at),
            SortKey::Oldest => a.created_at.cmp(&b.created_at),
            SortKey::Controversial => a.score.unsigned_abs().cmp(&b.score.unsigned_abs()),
        })
    });
}

/// Label of the toggle-all control for a collapsed list of `count` comments.
pub fn collapsed_label(count: usize) -> String {
    if count > 3 {
        format!("Show all {count} comments")
    } else {
        format!("{count} comment{}", if count == 1 { "" } else { "s" })
    }
}

pub const EXPANDED_LABEL: &str = "Hide comments";

/// Result of one load-more round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreOutcome {
    pub inserted: Vec<CommentId>,
    /// `None` once the affordance has been removed.
    pub remaining: Option<u64>,
}

pub struct ThreadController {
    page: PageConfig,
    api: ApiClient,
    doc: SharedDocument,
    max_depth: Option<u32>,
}

impl ThreadController {
    pub fn new(page: PageConfig, api: ApiClient, doc: SharedDocument) -> Self {
        Self { page, api, doc, max_depth: None }
    }

    /// Cap inline nesting; deeper replies become "continue this thread".
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    fn render_ctx(&self) -> RenderContext {
        let ctx = RenderContext::at(Utc::now());
        match self.max_depth {
            Some(d) => ctx.with_max_depth(d),
            None => ctx,
        }
    }

    // -- expand / collapse ----------------------------------------------------

    /// Flip a whole comment list. Returns the new toggle label.
    pub fn toggle_all(&self, container: ContainerId) -> Result<String> {
        let mut doc = lock(&self.doc)?;
        let count = doc.descendant_count(container);
        let list = doc.container_mut(container);
        list.collapsed = !list.collapsed;
        Ok(if list.collapsed { collapsed_label(count) } else { EXPANDED_LABEL.to_string() })
    }

    /// Flip one comment's reply subtree. Returns true when now collapsed.
    pub fn toggle_replies(&self, id: CommentId) -> Result<bool> {
        let mut doc = lock(&self.doc)?;
        if !doc.contains(id) {
            debug!(comment_id = id, "toggle target missing");
            return Err(ClientError::not_found(format!("comment-{id}")));
        }
        let replies = doc.container_mut(ContainerId::Replies(id));
        replies.collapsed = !replies.collapsed;
        Ok(replies.collapsed)
    }

    // -- reply form -----------------------------------------------------------

    /// Open the reply form under `id`, closing any other open form first.
    /// Returns the previously open form, if any.
    pub fn open_reply_form(&self, id: CommentId) -> Result<Option<CommentId>> {
        let mut doc = lock(&self.doc)?;
        doc.require_auth(&self.page)?;
        if !doc.contains(id) {
            return Err(ClientError::not_found(format!("comment-{id}")));
        }
        Ok(doc.reply_form.replace(id).filter(|prev| *prev != id))
    }

    pub fn cancel_reply(&self) -> Result<()> {
        lock(&self.doc)?.reply_form = None;
        Ok(())
    }

    // -- deletion -------------------------------------------------------------

    /// Soft-delete a comment after `confirm` agrees.
    pub async fn delete_comment(&self, id: CommentId, confirm: impl FnOnce(&str) -> bool) -> Result<()> {
        {
            let mut doc = lock(&self.doc)?;
            doc.require_auth(&self.page)?;
            match doc.node(id) {
                Some(node) if node.deleted || !node.can_delete => {
                    return Err(ClientError::not_found(format!("delete affordance of comment-{id}")));
                }
                Some(_) => {}
                None => return Err(ClientError::not_found(format!("comment-{id}"))),
            }
        }
        if !confirm("Are you sure you want to delete this comment?") {
            return Err(ClientError::Cancelled);
        }

        let outcome = self.api.delete_comment(id).await;
        let mut doc = lock(&self.doc)?;
        match outcome {
            Ok(ack) => {
                doc.mark_deleted(id)?;
                info!(comment_id = id, "comment deleted");
                doc.notifications
                    .notify(NotificationKind::Success, ack.message.unwrap_or_else(|| "Comment deleted".into()));
                Ok(())
            }
            Err(e) => {
                warn!(comment_id = id, error = %e, "delete failed");
                doc.notifications.report_error(&e, "Failed to delete comment");
                Err(e)
            }
        }
    }

    // -- sorting --------------------------------------------------------------

    /// Re-order the top-level siblings of `container`. Nested replies keep
    /// their order. Returns the new order.
    pub fn sort(&self, container: ContainerId, key: SortKey) -> Result<Vec<CommentId>> {
        let mut doc = lock(&self.doc)?;
        let mut entries: Vec<SortEntry> = doc
            .items(container)
            .into_iter()
            .filter_map(|id| {
                let node = doc.node(id)?;
                Some(SortEntry {
                    id,
                    score: doc.score(VoteTarget::Comment(id)),
                    created_at: node.created_at,
                    pinned: false,
                })
            })
            .collect();
        sort_entries(&mut entries, key);
        let order: Vec<CommentId> = entries.iter().map(|e| e.id).collect();
        doc.container_mut(container).items = order.clone();
        Ok(order)
    }

    /// Re-order the answer list; the accepted answer stays first.
    pub fn sort_answers(&self, key: SortKey) -> Result<Vec<u64>> {
        let mut doc = lock(&self.doc)?;
        let mut entries: Vec<SortEntry> = doc
            .answers()
            .iter()
            .map(|a| SortEntry {
                id: a.id,
                score: doc.score(VoteTarget::Answer(a.id)),
                created_at: a.created_at,
                pinned: a.accepted,
            })
            .collect();
        sort_entries(&mut entries, key);
        let order: Vec<u64> = entries.iter().map(|e| e.id).collect();
        doc.answers_mut().sort_by_key(|a| order.iter().position(|id| *id == a.id));
        Ok(order)
    }

    // -- pagination -----------------------------------------------------------

    /// Fetch the next batch of direct replies under `parent` and insert them
    /// before the load-more affordance, in arrival order.
    pub async fn load_more(&self, parent: CommentId) -> Result<LoadMoreOutcome> {
        let (skip, level) = {
            let doc = lock(&self.doc)?;
            let node = doc.node(parent).ok_or_else(|| ClientError::not_found(format!("comment-{parent}")))?;
            (doc.items(ContainerId::Replies(parent)).len(), node.level + 1)
        };

        let page = match self.api.children(parent, skip).await {
            Ok(page) => page,
            Err(e) => {
                warn!(parent, error = %e, "loading replies failed");
                lock(&self.doc)?.notifications.report_error(&e, "Failed to load more replies");
                return Err(e);
            }
        };

        let ctx = self.render_ctx();
        let mut doc = lock(&self.doc)?;
        let mut inserted = Vec::new();
        for comment in &page.comments {
            let fragment = render::render(comment, level, &ctx);
            inserted.extend(doc.insert_fragment(fragment, ContainerId::Replies(parent), Position::Append));
        }
        let remaining = (page.total_remaining > 0).then_some(page.total_remaining);
        doc.container_mut(ContainerId::Replies(parent)).load_more = remaining;
        debug!(parent, inserted = inserted.len(), ?remaining, "replies loaded");
        Ok(LoadMoreOutcome { inserted, remaining })
    }

    // -- thread continuation --------------------------------------------------

    /// Open the thread modal for `root` and fill it from the server.
    pub async fn continue_thread(&self, root: CommentId) -> Result<()> {
        lock(&self.doc)?.modal = Some(ThreadModal::Loading { root });

        let outcome = self.api.thread(root).await;
        let ctx = self.render_ctx();
        let mut doc = lock(&self.doc)?;
        match outcome {
            Ok(comments) => {
                let fragments = comments.iter().map(|c| render::render(c, 0, &ctx)).collect();
                doc.modal = Some(ThreadModal::Loaded { root, fragments });
                Ok(())
            }
            Err(e) => {
                let message = e.user_message("Failed to load thread");
                doc.modal = Some(ThreadModal::Failed { root, message });
                doc.notifications.report_error(&e, "Failed to load thread");
                Err(e)
            }
        }
    }

    pub fn close_modal(&self) -> Result<()> {
        lock(&self.doc)?.modal = None;
        Ok(())
    }

    // -- answers --------------------------------------------------------------

    /// Accept a top-level comment as the answer; any earlier acceptance in
    /// the same list is cleared.
    pub async fn accept_answer(&self, id: CommentId) -> Result<()> {
        let container = {
            let mut doc = lock(&self.doc)?;
            doc.require_auth(&self.page)?;
            let (parent, container) = doc
                .node(id)
                .map(|n| (n.parent, n.container))
                .ok_or_else(|| ClientError::not_found(format!("comment-{id}")))?;
            if parent.is_some() {
                let e = ClientError::Rejected { message: Some("Only answers can be accepted".into()) };
                doc.notifications.report_error(&e, "Only answers can be accepted");
                return Err(e);
            }
            container
        };

        let outcome = self.api.accept_comment(id).await;
        let mut doc = lock(&self.doc)?;
        match outcome {
            Ok(_) => {
                for sibling in doc.items(container) {
                    if let Some(n) = doc.node_mut(sibling) {
                        n.accepted = sibling == id;
                    }
                }
                doc.notifications.notify(NotificationKind::Success, "Answer accepted");
                Ok(())
            }
            Err(e) => {
                doc.notifications.report_error(&e, "Failed to accept answer");
                Err(e)
            }
        }
    }

    /// Mark the current question answered or not; reloads the page on success.
    pub async fn set_answered(&self, answered: bool) -> Result<()> {
        let question_id = {
            let mut doc = lock(&self.doc)?;
            doc.require_auth(&self.page)?;
            self.page.question_id.ok_or_else(|| ClientError::not_found("question id"))?
        };
        let outcome = self.api.set_answered(question_id, answered).await;
        let mut doc = lock(&self.doc)?;
        match outcome {
            Ok(ack) => {
                let fallback = if answered { "Question marked as answered" } else { "Question unmarked as answered" };
                doc.notifications.notify(NotificationKind::Success, ack.message.unwrap_or_else(|| fallback.into()));
                doc.navigation = Some(Navigation::Reload);
                Ok(())
            }
            Err(e) => {
                doc.notifications.report_error(&e, "Failed to update question status");
                Err(e)
            }
        }
    }
}
