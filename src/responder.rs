//! AI responder trigger: asks the server for an AI-generated reply and merges
//! the result into the document like any pushed comment.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::PageConfig;
use crate::document::{lock, ContainerId, Position, SharedDocument};
use crate::error::{ClientError, Result};
use crate::models::{AiRespondRequest, AiResponse, CommentId, ContentType, Personality};
use crate::notify::NotificationKind;
use crate::render::RenderContext;
use crate::sync::{merge_comment, MergeOutcome};

/// What a successful request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutcome {
    /// A structured comment was merged; these ids are new in the document.
    Merged(Vec<CommentId>),
    /// The comment was already present (e.g. delivered by the push stream).
    AlreadyPresent,
    /// The server sent a pre-rendered fragment for the caller to place.
    Fragment(String),
    Empty,
}

pub struct AiResponder {
    page: PageConfig,
    api: ApiClient,
    doc: SharedDocument,
    submit_enabled: AtomicBool,
}

/// Re-enables the submit control when dropped, whatever the outcome.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl AiResponder {
    pub fn new(page: PageConfig, api: ApiClient, doc: SharedDocument) -> Self {
        Self { page, api, doc, submit_enabled: AtomicBool::new(true) }
    }

    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled.load(Ordering::SeqCst)
    }

    pub async fn personalities(&self) -> Result<Vec<Personality>> {
        self.api.personalities().await
    }

    /// Fetch `personality_id` from the personality list, if it exists.
    pub async fn find_personality(&self, personality_id: u64) -> Result<Personality> {
        self.personalities()
            .await?
            .into_iter()
            .find(|p| p.id == personality_id)
            .ok_or_else(|| ClientError::Rejected { message: Some("AI Personality not found".into()) })
    }

    /// Top-level list an unparented response lands in: the question's or the
    /// answer's own comment list. Comment targets hang off the page question.
    fn root_container(&self, content_type: ContentType, content_id: u64) -> Result<ContainerId> {
        match content_type {
            ContentType::Question => Ok(ContainerId::Question(content_id)),
            ContentType::Answer => Ok(ContainerId::Answer(content_id)),
            ContentType::Comment => self
                .page
                .question_id
                .map(ContainerId::Question)
                .ok_or_else(|| ClientError::not_found("question id")),
        }
    }

    pub async fn request_ai_response(
        &self,
        content_type: ContentType,
        content_id: u64,
        personality_id: u64,
    ) -> Result<ResponderOutcome> {
        let root = {
            let mut doc = lock(&self.doc)?;
            doc.require_auth(&self.page)?;
            if self.page.question_answered {
                let e = ClientError::QuestionClosed;
                doc.notifications.notify(NotificationKind::Error, e.user_message(""));
                return Err(e);
            }
            self.root_container(content_type, content_id)?
        };

        if !self.submit_enabled.swap(false, Ordering::SeqCst) {
            debug!(%content_type, content_id, "AI request already in flight");
            return Err(ClientError::Cancelled);
        }
        let _guard = SubmitGuard(&self.submit_enabled);

        let req = AiRespondRequest { content_type, content_id, personality_id };
        info!(%content_type, content_id, personality_id, "requesting AI response");
        let outcome = self.api.ai_respond(&req).await;

        let mut doc = lock(&self.doc)?;
        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, content_id, "AI response failed");
                doc.notifications.report_error(&e, "Failed to generate AI response");
                return Err(e);
            }
        };

        let result = match response {
            Some(AiResponse::Comment(mut comment)) => {
                let position = if content_type == ContentType::Question && comment.parent_comment_id.is_none() {
                    Position::Prepend
                } else {
                    if content_type == ContentType::Comment && comment.parent_comment_id.is_none() {
                        comment.parent_comment_id = Some(content_id);
                    }
                    Position::Append
                };
                let mut inserted = Vec::new();
                let merged = merge_comment(
                    &mut doc,
                    root,
                    &comment,
                    self.page.question_answered,
                    position,
                    &RenderContext::default(),
                    &mut inserted,
                );
                match merged {
                    MergeOutcome::Inserted => ResponderOutcome::Merged(inserted),
                    MergeOutcome::Duplicate => ResponderOutcome::AlreadyPresent,
                    MergeOutcome::DroppedClosed | MergeOutcome::Orphaned => {
                        warn!(comment_id = comment.id, ?merged, "AI response could not be placed");
                        ResponderOutcome::Empty
                    }
                }
            }
            Some(AiResponse::Html(html)) => ResponderOutcome::Fragment(html),
            None => ResponderOutcome::Empty,
        };
        doc.notifications.notify(NotificationKind::Success, "AI response generated successfully!");
        Ok(result)
    }
}
