//! Comment tree rendering.
//!
//! [`render`] turns a [`Comment`] record into a [`CommentFragment`], the typed
//! equivalent of a detached DOM fragment, recursing through `replies`.
//! [`to_html`] serializes a fragment to markup. Relative times are computed
//! against an injected `now` so output is deterministic under test.

use chrono::{DateTime, Utc};

use crate::models::{Author, Comment, CommentId, VoteState};

/// Placeholder body of a soft-deleted comment.
pub const DELETED_PLACEHOLDER: &str = "<em>[This content has been deleted]</em>";

/// Identicon service used when an author has no profile image.
pub const AVATAR_FALLBACK_BASE: &str = "https://api.dicebear.com/6.x/identicon/svg?seed=";

/// Unit table for [`relative_time`], largest first.
const TIME_UNITS: &[(i64, &str)] = &[
    (31_536_000, "year"),
    (2_592_000, "month"),
    (86_400, "day"),
    (3_600, "hour"),
    (60, "minute"),
];

/// Coarsest-unit relative time for an elapsed duration in seconds.
///
/// Months are 30 days. Anything under a minute (including negative skew) is
/// "just now".
pub fn relative_time(elapsed_secs: i64) -> String {
    for &(secs, unit) in TIME_UNITS {
        let count = elapsed_secs / secs;
        if count >= 1 {
            let plural = if count == 1 { "" } else { "s" };
            return format!("{count} {unit}{plural} ago");
        }
    }
    "just now".to_string()
}

/// Relative time between `then` and `now`.
pub fn relative_time_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    relative_time((now - then).num_seconds())
}

/// Profile image, or the identicon derived from the username.
pub fn avatar_url(author: &Author) -> String {
    match author.profile_image.as_deref() {
        Some(img) if !img.is_empty() => img.to_string(),
        _ => {
            let seed: String = url::form_urlencoded::byte_serialize(author.username.as_bytes()).collect();
            format!("{AVATAR_FALLBACK_BASE}{seed}")
        }
    }
}

/// Profile link for a username, encoded as a single path segment.
pub fn profile_path(username: &str) -> String {
    let segment: String = url::form_urlencoded::byte_serialize(username.as_bytes()).collect();
    format!("/users/{}", segment.replace('+', "%20"))
}

/// Escape author-controlled text for HTML output.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Ambient inputs to rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub now: DateTime<Utc>,
    /// Nesting level at which replies stop being rendered inline and a
    /// "continue this thread" affordance is emitted instead.
    pub max_depth: Option<u32>,
}

impl RenderContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now, max_depth: None }
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

/// A rendered comment and its rendered replies.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentFragment {
    pub id: CommentId,
    pub parent_id: Option<CommentId>,
    pub level: u32,
    pub author: Option<Author>,
    pub body_html: String,
    pub score: i64,
    pub vote: VoteState,
    pub created_at: DateTime<Utc>,
    pub relative_time: String,
    pub deleted: bool,
    pub can_delete: bool,
    pub accepted: bool,
    pub collapsed: bool,
    /// Direct replies still on the server; drives the load-more affordance.
    pub remaining_replies: u64,
    /// Replies were cut at `max_depth`; offer a thread continuation instead.
    pub continue_thread: bool,
    pub replies: Vec<CommentFragment>,
}

impl CommentFragment {
    /// Ids of this fragment and every descendant, depth first.
    pub fn ids(&self) -> Vec<CommentId> {
        let mut out = vec![self.id];
        for r in &self.replies {
            out.extend(r.ids());
        }
        out
    }
}

/// Render `comment` at nesting `level`.
pub fn render(comment: &Comment, level: u32, ctx: &RenderContext) -> CommentFragment {
    let cut = ctx.max_depth.is_some_and(|max| level >= max) && !comment.replies.is_empty();
    let replies = if cut {
        Vec::new()
    } else {
        comment.replies.iter().map(|r| render(r, level + 1, ctx)).collect()
    };

    let (author, body_html, can_delete) = if comment.is_deleted {
        (None, DELETED_PLACEHOLDER.to_string(), false)
    } else {
        (comment.author.clone(), comment.html_content.clone(), comment.can_delete)
    };

    CommentFragment {
        id: comment.id,
        parent_id: comment.parent_comment_id,
        level,
        author,
        body_html,
        score: comment.score,
        vote: VoteState::from_wire(comment.user_vote),
        created_at: comment.created_at,
        relative_time: relative_time_since(comment.created_at, ctx.now),
        deleted: comment.is_deleted,
        can_delete,
        accepted: comment.is_accepted,
        collapsed: false,
        remaining_replies: if cut { 0 } else { comment.remaining_replies },
        continue_thread: cut,
        replies,
    }
}

/// Label of the load-more affordance.
pub fn load_more_label(remaining: u64) -> String {
    if remaining == 1 {
        "Load 1 more reply".to_string()
    } else {
        format!("Load {remaining} more replies")
    }
}

/// Serialize a fragment to markup.
pub fn to_html(fragment: &CommentFragment) -> String {
    let mut out = String::new();
    write_comment(&mut out, fragment);
    out
}

fn write_comment(out: &mut String, f: &CommentFragment) {
    let mut classes = vec!["comment"];
    if f.deleted {
        classes.push("deleted");
    }
    if f.accepted {
        classes.push("accepted");
    }
    if f.author.as_ref().is_some_and(|a| a.is_ai) {
        classes.push("ai-comment");
    }
    out.push_str(&format!(
        r#"<div id="comment-{id}" class="{classes}" data-comment-id="{id}" data-level="{level}" data-score="{score}" data-created="{created}" style="margin-left: {indent}px">"#,
        id = f.id,
        classes = classes.join(" "),
        level = f.level,
        score = f.score,
        created = f.created_at.to_rfc3339(),
        indent = f.level * 20,
    ));

    write_vote_buttons(out, f);
    out.push_str(&format!(r#"<div class="comment-text">{}</div>"#, f.body_html));

    out.push_str(r#"<div class="comment-meta">"#);
    if let Some(author) = &f.author {
        let name = escape_html(&author.username);
        out.push_str(&format!(
            r#"<img src="{}" alt="{name}" class="user-image"><a href="{}" class="comment-author">{name}</a>"#,
            escape_html(&avatar_url(author)),
            profile_path(&author.username),
        ));
        if author.is_ai {
            out.push_str(r#"<span class="ai-badge">AI</span>"#);
        }
    }
    out.push_str(&format!(
        r#"<span class="comment-time" title="{}">{}</span></div>"#,
        f.created_at.to_rfc3339(),
        f.relative_time
    ));

    out.push_str(r#"<div class="comment-actions">"#);
    out.push_str(&format!(r##"<a href="#" class="reply-link" data-comment-id="{}">Reply</a>"##, f.id));
    if f.can_delete && !f.deleted {
        out.push_str(&format!(r##"<a href="#" class="delete-comment" data-comment-id="{}">Delete</a>"##, f.id));
    }
    if !f.replies.is_empty() {
        let (icon, label) = toggle_glyph(f.collapsed);
        out.push_str(&format!(
            r##"<a href="#" class="toggle-replies" data-comment-id="{}" aria-label="{label}">{icon}</a>"##,
            f.id
        ));
    }
    out.push_str("</div>");

    if !f.replies.is_empty() || f.remaining_replies > 0 {
        let hidden = if f.collapsed { " collapsed" } else { "" };
        out.push_str(&format!(r#"<div class="comment-replies{hidden}" id="replies-{}">"#, f.id));
        for reply in &f.replies {
            write_comment(out, reply);
        }
        if f.remaining_replies > 0 {
            out.push_str(&format!(
                r##"<a href="#" class="load-more-replies" data-parent-id="{}" data-remaining="{}">{}</a>"##,
                f.id,
                f.remaining_replies,
                load_more_label(f.remaining_replies)
            ));
        }
        out.push_str("</div>");
    }
    if f.continue_thread {
        out.push_str(&format!(
            r##"<a href="#" class="continue-thread" data-comment-id="{}">Continue this thread</a>"##,
            f.id
        ));
    }
    out.push_str("</div>");
}

fn write_vote_buttons(out: &mut String, f: &CommentFragment) {
    let up = if f.vote == VoteState::Up { " upvoted" } else { "" };
    let down = if f.vote == VoteState::Down { " downvoted" } else { "" };
    out.push_str(&format!(
        concat!(
            r#"<div class="vote-buttons">"#,
            r#"<button class="vote-button{up}" data-vote-type="up" data-comment-id="{id}">&#9650;</button>"#,
            r#"<span class="vote-count">{score}</span>"#,
            r#"<button class="vote-button{down}" data-vote-type="down" data-comment-id="{id}">&#9660;</button>"#,
            "</div>"
        ),
        up = up,
        down = down,
        id = f.id,
        score = f.score,
    ));
}

/// Icon and accessible label of the per-comment collapse toggle.
pub fn toggle_glyph(collapsed: bool) -> (&'static str, &'static str) {
    if collapsed {
        ("[+]", "Expand replies")
    } else {
        ("[&minus;]", "Collapse replies")
    }
}
