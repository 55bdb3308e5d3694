//! HTTP client for the discussion server's JSON API.
//!
//! Every mutating request carries the CSRF token (`X-CSRFToken`) and the
//! `X-Requested-With: XMLHttpRequest` marker; the session cookie, when
//! configured, is attached to every request.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{
    Ack, AiRespondRequest, AiRespondResponse, AiResponse, ChildrenPage, Comment, CommentId, Personality,
    PersonalityList, ThreadPage, VoteRequest, VoteResponse, VoteState, VoteTarget,
};

/// Thin typed wrapper over the collaborator endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    csrf_token: String,
    session_cookie: Option<String>,
    request_timeout: Duration,
}

/// Error body some endpoints send alongside a non-2xx status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.clone(),
            csrf_token: config.page.csrf_token.clone(),
            session_cookie: config.session_cookie.clone(),
            request_timeout: config.request_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_session(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => req.header("Cookie", cookie),
            None => req,
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let req = self
            .client
            .post(self.url(path))
            .timeout(self.request_timeout)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-CSRFToken", &self.csrf_token);
        self.with_session(req)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.with_session(self.client.get(self.url(path)).timeout(self.request_timeout))
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await.map_err(|e| ClientError::connect(url, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        // A JSON error body counts as a logical rejection with a message.
        let body = resp.bytes().await.unwrap_or_default();
        match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(ErrorBody { error: Some(m), .. }) | Ok(ErrorBody { message: Some(m), .. }) => {
                Err(ClientError::Rejected { message: Some(m) })
            }
            _ => Err(ClientError::Http { status: status.as_u16(), url: url.to_string() }),
        }
    }

    async fn decode<T: DeserializeOwned>(context: &str, resp: Response) -> Result<T> {
        let bytes = resp.bytes().await.map_err(|e| ClientError::decode(context, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::decode(context, e))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: Option<&B>) -> Result<T> {
        let url = self.url(path);
        let mut req = self.post(path);
        if let Some(body) = body {
            req = req.json(body);
        }
        debug!(%url, "POST");
        let resp = self.send(&url, req).await?;
        Self::decode(path, resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self.send(&url, self.get(path)).await?;
        Self::decode(path, resp).await
    }

    fn ack_result(ack: Ack) -> Result<Ack> {
        if ack.success {
            Ok(ack)
        } else {
            Err(ClientError::Rejected { message: ack.error.or(ack.message) })
        }
    }

    // -- endpoints ----------------------------------------------------------

    /// `POST /api/vote`. Returns the vote state the server recorded.
    pub async fn vote(&self, target: VoteTarget, vote: VoteState) -> Result<VoteState> {
        let resp: VoteResponse = self.post_json("/api/vote", Some(&VoteRequest::new(target, vote))).await?;
        if !resp.success {
            return Err(ClientError::Rejected { message: resp.error });
        }
        Ok(resp.vote_type.map(VoteState::from_wire).unwrap_or(vote))
    }

    /// `POST /api/ai/respond`.
    pub async fn ai_respond(&self, req: &AiRespondRequest) -> Result<Option<AiResponse>> {
        let resp: AiRespondResponse = self.post_json("/api/ai/respond", Some(req)).await?;
        if !resp.success {
            return Err(ClientError::Rejected { message: resp.error });
        }
        Ok(resp.response)
    }

    /// `POST /api/comments/{id}/delete`.
    pub async fn delete_comment(&self, id: CommentId) -> Result<Ack> {
        let ack: Ack = self.post_json::<(), _>(&format!("/api/comments/{id}/delete"), None).await?;
        Self::ack_result(ack)
    }

    /// `POST /comments/{id}/accept`.
    pub async fn accept_comment(&self, id: CommentId) -> Result<Ack> {
        let ack: Ack = self.post_json::<(), _>(&format!("/comments/{id}/accept"), None).await?;
        Self::ack_result(ack)
    }

    /// `GET /api/comments/children/{parent}?skip=N`.
    pub async fn children(&self, parent: CommentId, skip: usize) -> Result<ChildrenPage> {
        let page: ChildrenPage = self.get_json(&format!("/api/comments/children/{parent}?skip={skip}")).await?;
        if !page.success {
            return Err(ClientError::Rejected { message: page.error });
        }
        Ok(page)
    }

    /// `GET /api/comments/thread/{parent}`.
    pub async fn thread(&self, parent: CommentId) -> Result<Vec<Comment>> {
        let page: ThreadPage = self.get_json(&format!("/api/comments/thread/{parent}")).await?;
        if !page.success {
            return Err(ClientError::Rejected { message: page.error });
        }
        Ok(page.comments)
    }

    /// `POST /questions/{id}/mark_answered` or `mark_unanswered`.
    pub async fn set_answered(&self, question_id: u64, answered: bool) -> Result<Ack> {
        let action = if answered { "mark_answered" } else { "mark_unanswered" };
        let ack: Ack = self.post_json::<(), _>(&format!("/questions/{question_id}/{action}"), None).await?;
        Self::ack_result(ack)
    }

    /// `GET /api/ai_personalities`.
    pub async fn personalities(&self) -> Result<Vec<Personality>> {
        let list: PersonalityList = self.get_json("/api/ai_personalities").await?;
        Ok(list.personalities)
    }

    /// URL of the push stream for a question.
    pub fn stream_url(&self, question_id: u64, last_comment_id: CommentId) -> String {
        self.url(&format!("/api/questions/{question_id}/stream?last_comment_id={last_comment_id}"))
    }

    /// Open the push stream. The returned response body is the event stream;
    /// it carries no overall timeout.
    pub async fn open_stream(&self, question_id: u64, last_comment_id: CommentId) -> Result<Response> {
        let url = self.stream_url(question_id, last_comment_id);
        let req = self.with_session(self.client.get(&url)).header("Accept", "text/event-stream");
        self.send(&url, req).await
    }
}
