pub mod api;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod models;
pub mod notify;
pub mod preferences;
pub mod preview;
pub mod render;
pub mod responder;
pub mod sse;
pub mod sync;
pub mod thread;
pub mod votes;

pub use api::ApiClient;
pub use config::{ClientConfig, PageConfig};
pub use document::{new_shared_document, ContainerId, Document, SharedDocument};
pub use error::{ClientError, Result};
pub use models::{Comment, CommentId, ContentType, VoteDirection, VoteState, VoteTarget};
pub use notify::{NotificationKind, NotificationSurface};
pub use responder::AiResponder;
pub use sync::{SyncClient, SyncHandle};
pub use thread::{SortKey, ThreadController};
pub use votes::VoteController;

/// Controllers for one page view, all sharing the same document.
pub struct Page {
    pub doc: SharedDocument,
    pub votes: VoteController,
    pub thread: ThreadController,
    pub responder: AiResponder,
}

impl Page {
    pub fn new(config: &ClientConfig) -> Self {
        let doc = new_shared_document();
        let api = ApiClient::new(config);
        Self {
            votes: VoteController::new(config.page.clone(), api.clone(), doc.clone()),
            thread: ThreadController::new(config.page.clone(), api.clone(), doc.clone()),
            responder: AiResponder::new(config.page.clone(), api, doc.clone()),
            doc,
        }
    }

    /// Push-stream client feeding this page's document.
    pub fn sync_client(&self, config: &ClientConfig) -> SyncClient {
        SyncClient::new(config.clone(), ApiClient::new(config), self.doc.clone())
    }
}
