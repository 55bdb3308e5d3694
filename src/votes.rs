//! Vote controller: up/down toggling for questions, answers and comments.

use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::PageConfig;
use crate::document::{lock, SharedDocument, VoteWidget};
use crate::error::{ClientError, Result};
use crate::models::{VoteDirection, VoteTarget};
use crate::notify::NotificationKind;

pub struct VoteController {
    page: PageConfig,
    api: ApiClient,
    doc: SharedDocument,
}

impl VoteController {
    pub fn new(page: PageConfig, api: ApiClient, doc: SharedDocument) -> Self {
        Self { page, api, doc }
    }

    /// Click the `direction` control of `target`.
    ///
    /// Clicking the active control retracts the vote. Exactly one request is
    /// sent; the widget only changes once the server has accepted it. One
    /// notification is shown per attempt.
    pub async fn cast_vote(&self, target: VoteTarget, direction: VoteDirection) -> Result<VoteWidget> {
        let effective = {
            let mut doc = lock(&self.doc)?;
            doc.require_auth(&self.page)?;
            let widget = doc.vote(target).ok_or_else(|| {
                debug!(?target, "vote widget missing, aborting");
                ClientError::not_found(format!("vote widget for {target:?}"))
            })?;
            widget.state.toggled(direction)
        };

        let outcome = self.api.vote(target, effective).await;

        let mut doc = lock(&self.doc)?;
        match outcome {
            Ok(recorded) => {
                let Some(widget) = doc.vote_mut(target) else {
                    warn!(?target, "vote widget vanished while request was in flight");
                    return Err(ClientError::not_found(format!("vote widget for {target:?}")));
                };
                widget.score += widget.state.delta_to(recorded);
                widget.state = recorded;
                let updated = *widget;
                doc.notifications.notify(NotificationKind::Success, "Vote recorded successfully");
                Ok(updated)
            }
            Err(e) => {
                warn!(?target, error = %e, "vote failed");
                let fallback = match e {
                    ClientError::Rejected { .. } => "Failed to record vote",
                    _ => "An error occurred while voting",
                };
                doc.notifications.report_error(&e, fallback);
                Err(e)
            }
        }
    }
}
