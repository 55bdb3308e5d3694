//! Realtime sync: a long-lived push connection per question that merges newly
//! arrived comments into the document.
//!
//! Each connection attempt is parameterised by the highest comment id
//! currently in the document, recomputed at every reconnect, so the server's
//! id-based replay is the only gap filling there is. On a transport error the
//! connection is dropped and reopened after a fixed delay, forever, until the
//! owning [`SyncHandle`] is closed or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::document::{lock, ContainerId, Document, Position, SharedDocument};
use crate::error::{ClientError, Result};
use crate::models::{Comment, CommentId, StreamPayload};
use crate::preferences::PreferenceStore;
use crate::render::{self, RenderContext};
use crate::sse::{decode_payload, SseDecoder};

/// Consecutive failures after which reconnect logging escalates to `error`.
const FAILURE_ESCALATION: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    ErrorBackoff,
    Closed,
}

/// What happened to one pushed comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Duplicate,
    /// AI-authored comment on a closed question.
    DroppedClosed,
    /// Reply whose parent is not in the document.
    Orphaned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Every id newly added to the document, nested replies included.
    pub inserted: Vec<CommentId>,
    pub duplicates: usize,
    pub dropped_closed: usize,
    pub orphaned: usize,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
    }
}

/// Copy of `comment` without AI-authored replies anywhere in its subtree.
fn without_ai_replies(comment: &Comment) -> Comment {
    let mut kept = comment.clone();
    kept.replies = comment
        .replies
        .iter()
        .filter(|r| !r.is_ai_authored())
        .map(without_ai_replies)
        .collect();
    kept
}

/// Merge one comment. Replies go under their parent at the parent's level
/// plus one; comments without a parent go to `root` at level 0.
pub fn merge_comment(
    doc: &mut Document,
    root: ContainerId,
    comment: &Comment,
    closed: bool,
    position: Position,
    ctx: &RenderContext,
    inserted: &mut Vec<CommentId>,
) -> MergeOutcome {
    if doc.contains(comment.id) {
        debug!(comment_id = comment.id, "duplicate comment skipped");
        return MergeOutcome::Duplicate;
    }
    if closed && comment.is_ai_authored() {
        debug!(comment_id = comment.id, "question closed, dropping AI comment");
        return MergeOutcome::DroppedClosed;
    }
    let filtered;
    let comment = if closed {
        filtered = without_ai_replies(comment);
        &filtered
    } else {
        comment
    };

    let (container, level) = match comment.parent_comment_id {
        Some(parent) => match doc.node(parent) {
            Some(node) => (ContainerId::Replies(parent), node.level + 1),
            None => {
                warn!(comment_id = comment.id, parent, "parent not rendered, dropping reply");
                return MergeOutcome::Orphaned;
            }
        },
        None => (root, 0),
    };

    let fragment = render::render(comment, level, ctx);
    inserted.extend(doc.insert_fragment(fragment, container, position));
    MergeOutcome::Inserted
}

/// Merge a pushed batch in arrival order.
pub fn merge_comments(
    doc: &mut Document,
    root: ContainerId,
    comments: &[Comment],
    closed: bool,
    ctx: &RenderContext,
) -> MergeReport {
    let mut report = MergeReport::default();
    for comment in comments {
        match merge_comment(doc, root, comment, closed, Position::Append, ctx, &mut report.inserted) {
            MergeOutcome::Inserted => {}
            MergeOutcome::Duplicate => report.duplicates += 1,
            MergeOutcome::DroppedClosed => report.dropped_closed += 1,
            MergeOutcome::Orphaned => report.orphaned += 1,
        }
    }
    report
}

/// Audible cue for newly merged comments.
pub trait SoundPlayer: Send + Sync {
    fn play(&self);
}

/// Rings the terminal bell.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self) {
        use std::io::Write;
        let mut out = std::io::stdout();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }
}

pub struct SyncClient {
    config: ClientConfig,
    api: ApiClient,
    doc: SharedDocument,
    preferences: PreferenceStore,
    sound: Option<Arc<dyn SoundPlayer>>,
    updates: Option<mpsc::UnboundedSender<MergeReport>>,
}

impl SyncClient {
    pub fn new(config: ClientConfig, api: ApiClient, doc: SharedDocument) -> Self {
        Self { config, api, doc, preferences: PreferenceStore::in_memory(), sound: None, updates: None }
    }

    /// Play `player` after a merge, if the stored preference allows it.
    pub fn with_sound(mut self, player: Arc<dyn SoundPlayer>, preferences: PreferenceStore) -> Self {
        self.sound = Some(player);
        self.preferences = preferences;
        self
    }

    /// Receive a report for every batch that inserted something.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<MergeReport>) -> Self {
        self.updates = Some(tx);
        self
    }

    /// Spawn the connection loop. Fails if the page is not question-scoped.
    pub fn start(self) -> Result<SyncHandle> {
        let question_id = self
            .config
            .page
            .question_id
            .ok_or_else(|| ClientError::Config("push updates need a question id".into()))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(self.run(question_id, shutdown_rx, state_tx));
        Ok(SyncHandle { shutdown: shutdown_tx, state: state_rx, task })
    }

    async fn run(
        self,
        question_id: u64,
        mut shutdown: watch::Receiver<bool>,
        state: watch::Sender<ConnectionState>,
    ) {
        let mut consecutive_failures: u32 = 0;

        loop {
            let last_id = lock(&self.doc).map(|d| d.max_comment_id()).unwrap_or(0);
            let closed = self.config.page.question_answered;
            state.send_replace(ConnectionState::Connecting);
            debug!(question_id, last_id, closed, "connecting push stream");

            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                r = self.session(question_id, last_id, closed, &state) => r,
            };

            if *state.borrow() == ConnectionState::Open {
                consecutive_failures = 0;
            }
            match outcome {
                Ok(()) => info!(question_id, "push stream ended, reconnecting"),
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    if consecutive_failures >= FAILURE_ESCALATION {
                        error!(error = %e, question_id, consecutive_failures, "push stream failed repeatedly, will retry");
                    } else {
                        warn!(error = %e, question_id, "push stream failed, will retry");
                    }
                }
            }

            state.send_replace(ConnectionState::ErrorBackoff);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        state.send_replace(ConnectionState::Closed);
        info!(question_id, "push stream closed");
    }

    async fn session(
        &self,
        question_id: u64,
        last_id: CommentId,
        closed: bool,
        state: &watch::Sender<ConnectionState>,
    ) -> Result<()> {
        let response = self.api.open_stream(question_id, last_id).await?;
        state.send_replace(ConnectionState::Open);
        info!(question_id, last_id, "push stream open");

        let url = self.api.stream_url(question_id, last_id);
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ClientError::connect(&url, e))?;
            for event in decoder.push(&chunk) {
                match decode_payload(&event.data) {
                    Ok(StreamPayload::Heartbeat { .. }) => debug!(question_id, "heartbeat"),
                    Ok(StreamPayload::Comments { comments }) => self.apply(question_id, &comments, closed)?,
                    Err(e) => warn!(error = %e, "ignoring malformed stream event"),
                }
            }
        }
        Ok(())
    }

    fn apply(&self, question_id: u64, comments: &[Comment], closed: bool) -> Result<()> {
        if comments.is_empty() {
            return Ok(());
        }
        let report = {
            let mut doc = lock(&self.doc)?;
            merge_comments(&mut doc, ContainerId::Question(question_id), comments, closed, &RenderContext::default())
        };
        debug!(
            inserted = report.inserted.len(),
            duplicates = report.duplicates,
            dropped = report.dropped_closed,
            orphaned = report.orphaned,
            "merged pushed comments"
        );
        if report.is_empty() {
            return Ok(());
        }
        if let Some(player) = &self.sound {
            if self.preferences.notification_sound() {
                player.play();
            }
        }
        if let Some(tx) = &self.updates {
            let _ = tx.send(report);
        }
        Ok(())
    }
}

/// Owner of a running sync loop. Dropping it stops the loop as well.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the loop reports `wanted`, or `timeout` elapses.
    pub async fn wait_for(&mut self, wanted: ConnectionState, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.state.wait_for(|s| *s == wanted)).await.is_ok_and(|r| r.is_ok())
    }

    /// Close the connection and wait for the loop to finish.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync task ended abnormally");
        }
    }
}
