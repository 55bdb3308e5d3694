//! Tests for the comment tree controller against a fake discussion server:
//! collapse state, reply forms, deletion, sorting, pagination, thread
//! continuation and answer acceptance.

use chrono::{TimeZone, Utc};
use discussion_client::document::{lock, AnswerEntry, Navigation, ThreadModal};
use discussion_client::models::Author;
use discussion_client::render::{self, RenderContext, DELETED_PLACEHOLDER};
use discussion_client::sync::merge_comments;
use discussion_client::*;
use mockito::{Matcher, Server};

const ROOT: ContainerId = ContainerId::Question(1);

fn comment(id: CommentId, parent: Option<CommentId>, score: i64) -> Comment {
    Comment {
        id,
        html_content: format!("<p>comment {id}</p>"),
        author: Some(Author { username: format!("user{id}"), profile_image: None, is_ai: false }),
        score,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, id as u32 % 60, 0).unwrap(),
        parent_comment_id: parent,
        replies: vec![],
        is_deleted: false,
        is_accepted: false,
        can_delete: true,
        user_vote: 0,
        remaining_replies: 0,
    }
}

fn page_for(url: &str, authed: bool) -> (ClientConfig, Page) {
    let cfg = ClientConfig::new(url).with_page(PageConfig {
        is_authenticated: authed,
        csrf_token: "tok".into(),
        question_id: Some(1),
        current_location: "/questions/1".into(),
        ..Default::default()
    });
    let page = Page::new(&cfg);
    (cfg, page)
}

fn seed(page: &Page, comments: &[Comment]) {
    let mut doc = lock(&page.doc).unwrap();
    merge_comments(&mut doc, ROOT, comments, false, &RenderContext::default());
}

// ---------------------------------------------------------------------------
// Expand / collapse
// ---------------------------------------------------------------------------

#[test]
fn test_toggle_all_labels_count_every_descendant() {
    let (_, page) = page_for("http://127.0.0.1:1", true);
    seed(
        &page,
        &[comment(1, None, 0), comment(2, Some(1), 0), comment(3, Some(2), 0), comment(4, None, 0), comment(5, Some(4), 0)],
    );
    assert_eq!(page.thread.toggle_all(ROOT).unwrap(), "Show all 5 comments");
    assert!(lock(&page.doc).unwrap().container(ROOT).unwrap().collapsed);
    assert_eq!(page.thread.toggle_all(ROOT).unwrap(), "Hide comments");
}

#[test]
fn test_toggle_all_small_thread_uses_plain_count() {
    let (_, page) = page_for("http://127.0.0.1:1", true);
    seed(&page, &[comment(1, None, 0)]);
    assert_eq!(page.thread.toggle_all(ROOT).unwrap(), "1 comment");
}

#[test]
fn test_per_comment_collapse_is_independent() {
    let (_, page) = page_for("http://127.0.0.1:1", true);
    seed(&page, &[comment(1, None, 0), comment(2, Some(1), 0), comment(3, None, 0), comment(4, Some(3), 0)]);
    assert!(page.thread.toggle_replies(1).unwrap());

    let doc = lock(&page.doc).unwrap();
    assert!(doc.container(ContainerId::Replies(1)).unwrap().collapsed);
    assert!(!doc.container(ContainerId::Replies(3)).unwrap().collapsed);
    assert!(!doc.container(ROOT).unwrap().collapsed);
    let html = render::to_html(&doc.fragment(1, Utc::now()).unwrap());
    assert!(html.contains("[+]"));
}

#[test]
fn test_toggle_missing_comment_is_silent() {
    let (_, page) = page_for("http://127.0.0.1:1", true);
    let err = page.thread.toggle_replies(42).unwrap_err();
    assert!(err.is_silent());
}

// ---------------------------------------------------------------------------
// Reply form
// ---------------------------------------------------------------------------

#[test]
fn test_only_one_reply_form_open() {
    let (_, page) = page_for("http://127.0.0.1:1", true);
    seed(&page, &[comment(1, None, 0), comment(2, None, 0)]);
    assert_eq!(page.thread.open_reply_form(1).unwrap(), None);
    assert_eq!(page.thread.open_reply_form(2).unwrap(), Some(1));
    assert_eq!(lock(&page.doc).unwrap().reply_form, Some(2));
    page.thread.cancel_reply().unwrap();
    assert_eq!(lock(&page.doc).unwrap().reply_form, None);
}

#[test]
fn test_reply_requires_login() {
    let (_, page) = page_for("http://127.0.0.1:1", false);
    seed(&page, &[comment(1, None, 0)]);
    assert!(matches!(page.thread.open_reply_form(1), Err(ClientError::AuthRequired { .. })));
    let doc = lock(&page.doc).unwrap();
    assert_eq!(doc.reply_form, None);
    assert_eq!(doc.navigation, Some(Navigation::Redirect("/auth/login?next=%2Fquestions%2F1".into())));
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_delete_is_one_way() {
    let mut server = Server::new_async().await;
    let m = server
        .mock("POST", "/api/comments/1/delete")
        .match_header("x-csrftoken", "tok")
        .with_body(r#"{"success": true, "message": "Comment deleted successfully"}"#)
        .expect(1)
        .create_async()
        .await;
    let (_, page) = page_for(&server.url(), true);
    seed(&page, &[comment(1, None, 2), comment(2, Some(1), 0), comment(3, None, 1)]);

    page.thread.delete_comment(1, |_| true).await.unwrap();
    {
        let doc = lock(&page.doc).unwrap();
        let node = doc.node(1).unwrap();
        assert!(node.deleted);
        assert!(node.author.is_none());
        assert!(!node.can_delete);
        assert_eq!(node.body_html, DELETED_PLACEHOLDER);
        assert_eq!(doc.items(ROOT), vec![1, 3]);
        assert_eq!(doc.items(ContainerId::Replies(1)), vec![2]);
        assert_eq!(doc.notifications.latest().unwrap().message, "Comment deleted successfully");
    }

    // Unrelated re-renders of siblings do not bring anything back.
    page.thread.sort(ROOT, SortKey::Votes).unwrap();
    seed(&page, &[comment(4, None, 0), comment(1, None, 2)]);
    {
        let doc = lock(&page.doc).unwrap();
        let f = doc.fragment(1, Utc::now()).unwrap();
        assert!(f.author.is_none());
        assert!(!f.can_delete);
        let html = render::to_html(&f);
        assert!(!html.contains(r#"class="delete-comment" data-comment-id="1""#));
        assert!(!html.contains(r#"href="/users/user1""#));
    }

    let again = page.thread.delete_comment(1, |_| true).await.unwrap_err();
    assert!(again.is_silent());
    m.assert_async().await;
}

#[test]
fn test_delete_requires_login() {
    let (_, page) = page_for("http://127.0.0.1:1", false);
    seed(&page, &[comment(1, None, 0)]);
    let err = tokio_test::assert_err!(tokio_test::block_on(page.thread.delete_comment(1, |_| true)));
    assert!(matches!(err, ClientError::AuthRequired { .. }));
    let doc = lock(&page.doc).unwrap();
    assert!(!doc.node(1).unwrap().deleted);
    assert!(doc.notifications.latest().is_none());
}

#[tokio::test]
async fn test_declined_confirmation_sends_nothing() {
    let mut server = Server::new_async().await;
    let m = server.mock("POST", "/api/comments/1/delete").expect(0).create_async().await;
    let (_, page) = page_for(&server.url(), true);
    seed(&page, &[comment(1, None, 0)]);

    let mut asked = String::new();
    let err = page
        .thread
        .delete_comment(1, |prompt| {
            asked = prompt.to_string();
            false
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(asked, "Are you sure you want to delete this comment?");
    assert!(!lock(&page.doc).unwrap().node(1).unwrap().deleted);
    m.assert_async().await;
}

#[tokio::test]
async fn test_failed_delete_leaves_comment_intact() {
    let mut server = Server::new_async().await;
    server.mock("POST", "/api/comments/1/delete").with_status(500).create_async().await;
    let (_, page) = page_for(&server.url(), true);
    seed(&page, &[comment(1, None, 0)]);

    assert!(page.thread.delete_comment(1, |_| true).await.is_err());
    let doc = lock(&page.doc).unwrap();
    let node = doc.node(1).unwrap();
    assert!(!node.deleted);
    assert!(node.can_delete);
    assert_eq!(node.author.as_ref().unwrap().username, "user1");
    let n = doc.notifications.latest().unwrap();
    assert_eq!(n.kind, NotificationKind::Error);
    assert_eq!(n.message, "Failed to delete comment");
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[test]
fn test_sort_by_votes_is_stable_and_leaves_replies_alone() {
    let (_, page) = page_for("http://127.0.0.1:1", true);
    seed(
        &page,
        &[
            comment(1, None, 3),
            comment(2, None, 1),
            comment(3, None, 3),
            comment(4, None, -2),
            comment(6, Some(1), -5),
            comment(5, Some(1), 9),
        ],
    );
    assert_eq!(page.thread.sort(ROOT, SortKey::Votes).unwrap(), vec![1, 3, 2, 4]);
    assert_eq!(lock(&page.doc).unwrap().items(ContainerId::Replies(1)), vec![6, 5]);

    assert_eq!(page.thread.sort(ROOT, SortKey::Controversial).unwrap(), vec![2, 4, 1, 3]);
    assert_eq!(page.thread.sort(ROOT, SortKey::Oldest).unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(page.thread.sort(ROOT, SortKey::Newest).unwrap(), vec![4, 3, 2, 1]);
}

#[test]
fn test_answer_sort_keeps_accepted_first() {
    let (_, page) = page_for("http://127.0.0.1:1", true);
    {
        let mut doc = lock(&page.doc).unwrap();
        let at = |m| Utc.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap();
        doc.add_answer(AnswerEntry { id: 10, created_at: at(1), accepted: false }, 7);
        doc.add_answer(AnswerEntry { id: 11, created_at: at(2), accepted: true }, -1);
        doc.add_answer(AnswerEntry { id: 12, created_at: at(3), accepted: false }, 4);
    }
    assert_eq!(page.thread.sort_answers(SortKey::Votes).unwrap(), vec![11, 10, 12]);
    assert_eq!(page.thread.sort_answers(SortKey::Newest).unwrap(), vec![11, 12, 10]);
    let ids: Vec<u64> = lock(&page.doc).unwrap().answers().iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![11, 12, 10]);
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_load_more_until_exhausted() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/api/comments/children/1?skip=1")
        .with_body(
            serde_json::json!({
                "success": true,
                "comments": [
                    {"id": 3, "html_content": "<p>3</p>", "created_at": "2024-01-01T00:03:00", "parent_comment_id": 1},
                    {"id": 4, "html_content": "<p>4</p>", "created_at": "2024-01-01T00:04:00", "parent_comment_id": 1}
                ],
                "total_remaining": 1
            })
            .to_string(),
        )
        .create_async()
        .await;
    let second = server
        .mock("GET", "/api/comments/children/1?skip=3")
        .with_body(
            serde_json::json!({
                "success": true,
                "comments": [
                    {"id": 5, "html_content": "<p>5</p>", "created_at": "2024-01-01T00:05:00", "parent_comment_id": 1}
                ],
                "total_remaining": 0
            })
            .to_string(),
        )
        .create_async()
        .await;
    let (_, page) = page_for(&server.url(), true);
    let mut parent = comment(1, None, 0);
    parent.replies = vec![comment(2, Some(1), 0)];
    parent.remaining_replies = 3;
    seed(&page, &[parent]);
    assert_eq!(lock(&page.doc).unwrap().container(ContainerId::Replies(1)).unwrap().load_more, Some(3));

    let out = page.thread.load_more(1).await.unwrap();
    assert_eq!(out.inserted, vec![3, 4]);
    assert_eq!(out.remaining, Some(1));
    {
        let doc = lock(&page.doc).unwrap();
        let replies = doc.container(ContainerId::Replies(1)).unwrap();
        assert_eq!(replies.items, vec![2, 3, 4]);
        assert_eq!(replies.load_more, Some(1));
        assert_eq!(doc.node(4).unwrap().level, 1);
    }

    let out = page.thread.load_more(1).await.unwrap();
    assert_eq!(out.inserted, vec![5]);
    assert_eq!(out.remaining, None);
    let doc = lock(&page.doc).unwrap();
    assert_eq!(doc.container(ContainerId::Replies(1)).unwrap().load_more, None);
    let html = render::to_html(&doc.fragment(1, Utc::now()).unwrap());
    assert!(!html.contains("load-more-replies"));
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_load_more_failure_keeps_affordance() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/api/comments/children/1\?skip=0$".into()))
        .with_status(503)
        .create_async()
        .await;
    let (_, page) = page_for(&server.url(), true);
    let mut parent = comment(1, None, 0);
    parent.remaining_replies = 2;
    seed(&page, &[parent]);

    assert!(page.thread.load_more(1).await.is_err());
    let doc = lock(&page.doc).unwrap();
    assert_eq!(doc.container(ContainerId::Replies(1)).unwrap().load_more, Some(2));
    assert_eq!(doc.notifications.latest().unwrap().message, "Failed to load more replies");
}

// ---------------------------------------------------------------------------
// Thread continuation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_continue_thread_fills_modal_without_touching_page() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/comments/thread/1")
        .with_body(
            serde_json::json!({
                "success": true,
                "comments": [{
                    "id": 20, "html_content": "<p>deep</p>", "created_at": "2024-01-01T00:00:00",
                    "parent_comment_id": 1,
                    "replies": [{"id": 21, "html_content": "<p>deeper</p>", "created_at": "2024-01-01T00:01:00"}]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let (_, page) = page_for(&server.url(), true);
    seed(&page, &[comment(1, None, 0)]);

    page.thread.continue_thread(1).await.unwrap();
    let doc = lock(&page.doc).unwrap();
    match &doc.modal {
        Some(ThreadModal::Loaded { root, fragments }) => {
            assert_eq!(*root, 1);
            assert_eq!(fragments.len(), 1);
            assert_eq!(fragments[0].ids(), vec![20, 21]);
            assert_eq!(fragments[0].replies[0].level, 1);
        }
        other => panic!("unexpected modal state {other:?}"),
    }
    assert!(!doc.contains(20));
    assert!(doc.items(ContainerId::Replies(1)).is_empty());
}

#[tokio::test]
async fn test_continue_thread_failure_shows_in_modal() {
    let mut server = Server::new_async().await;
    server.mock("GET", "/api/comments/thread/1").with_status(500).create_async().await;
    let (_, page) = page_for(&server.url(), true);

    assert!(page.thread.continue_thread(1).await.is_err());
    let doc = lock(&page.doc).unwrap();
    assert_eq!(
        doc.modal,
        Some(ThreadModal::Failed { root: 1, message: "Failed to load thread".into() })
    );
    drop(doc);
    page.thread.close_modal().unwrap();
    assert!(lock(&page.doc).unwrap().modal.is_none());
}

// ---------------------------------------------------------------------------
// Answers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_accept_moves_acceptance() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/comments/2/accept")
        .with_body(r#"{"success": true}"#)
        .create_async()
        .await;
    let (_, page) = page_for(&server.url(), true);
    let mut first = comment(1, None, 0);
    first.is_accepted = true;
    seed(&page, &[first, comment(2, None, 0), comment(3, Some(2), 0)]);

    page.thread.accept_answer(2).await.unwrap();
    {
        let doc = lock(&page.doc).unwrap();
        assert!(!doc.node(1).unwrap().accepted);
        assert!(doc.node(2).unwrap().accepted);
    }

    let err = page.thread.accept_answer(3).await.unwrap_err();
    assert_eq!(err.user_message(""), "Only answers can be accepted");
}

#[tokio::test]
async fn test_mark_answered_reloads() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/questions/1/mark_answered")
        .with_body(r#"{"success": true, "message": "Question marked as answered"}"#)
        .create_async()
        .await;
    let (_, page) = page_for(&server.url(), true);
    page.thread.set_answered(true).await.unwrap();
    let doc = lock(&page.doc).unwrap();
    assert_eq!(doc.navigation, Some(Navigation::Reload));
    assert_eq!(doc.notifications.latest().unwrap().message, "Question marked as answered");
}
