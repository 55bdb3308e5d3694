use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned comment identifier, increasing per question.
pub type CommentId = u64;

// -- Comments ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub is_ai: bool,
}

/// One comment record as the server sends it. `html_content` is already
/// rendered and sanitized server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(alias = "body_html")]
    pub html_content: String,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub score: i64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_accepted: bool,
    /// Whether the viewer may delete this comment.
    #[serde(default)]
    pub can_delete: bool,
    /// The viewer's current vote: -1, 0 or 1.
    #[serde(default)]
    pub user_vote: i8,
    /// Direct replies the server has not sent yet.
    #[serde(default)]
    pub remaining_replies: u64,
}

impl Comment {
    pub fn is_ai_authored(&self) -> bool {
        self.author.as_ref().is_some_and(|a| a.is_ai)
    }
}

/// Accepts RFC 3339 as well as the naive `YYYY-MM-DDTHH:MM:SS[.f]` form
/// (interpreted as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// -- Votes ------------------------------------------------------------------

/// The item a vote applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteTarget {
    Question(u64),
    Answer(u64),
    Comment(CommentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDirection {
    Up,
    Down,
}

/// Tri-state vote held by a vote widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoteState {
    #[default]
    None,
    Up,
    Down,
}

impl VoteState {
    /// Wire encoding used by `/api/vote`.
    pub fn as_wire(self) -> i8 {
        match self {
            VoteState::None => 0,
            VoteState::Up => 1,
            VoteState::Down => -1,
        }
    }

    pub fn from_wire(v: i8) -> Self {
        match v {
            1 => VoteState::Up,
            -1 => VoteState::Down,
            _ => VoteState::None,
        }
    }

    /// Score change when moving from `self` to `next`: ±1 to or from none,
    /// ±2 for a direct flip.
    pub fn delta_to(self, next: VoteState) -> i64 {
        i64::from(next.as_wire()) - i64::from(self.as_wire())
    }

    /// State after clicking `direction`: the active control retracts.
    pub fn toggled(self, direction: VoteDirection) -> VoteState {
        match (self, direction) {
            (VoteState::Up, VoteDirection::Up) | (VoteState::Down, VoteDirection::Down) => VoteState::None,
            (_, VoteDirection::Up) => VoteState::Up,
            (_, VoteDirection::Down) => VoteState::Down,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRequest {
    pub vote_type: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<CommentId>,
}

impl VoteRequest {
    pub fn new(target: VoteTarget, vote: VoteState) -> Self {
        let mut req = VoteRequest { vote_type: vote.as_wire(), question_id: None, answer_id: None, comment_id: None };
        match target {
            VoteTarget::Question(id) => req.question_id = Some(id),
            VoteTarget::Answer(id) => req.answer_id = Some(id),
            VoteTarget::Comment(id) => req.comment_id = Some(id),
        }
        req
    }
}

// -- Response envelopes -----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct VoteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub vote_type: Option<i8>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `{success, message?, error?}` acknowledgement used by delete, accept and
/// the mark-answered endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChildrenPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub total_remaining: u64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub error: Option<String>,
}

// -- AI responder -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Question,
    Answer,
    Comment,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Question => write!(f, "question"),
            ContentType::Answer => write!(f, "answer"),
            ContentType::Comment => write!(f, "comment"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AiRespondRequest {
    pub content_type: ContentType,
    pub content_id: u64,
    pub personality_id: u64,
}

/// `response` is a structured comment at comment-centric call sites and a
/// pre-rendered fragment elsewhere.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AiResponse {
    Comment(Box<Comment>),
    Html(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiRespondResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response: Option<AiResponse>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expertise: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalityList {
    #[serde(default)]
    pub personalities: Vec<Personality>,
}

// -- Push stream ------------------------------------------------------------

/// One event on the question stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StreamPayload {
    Comments { comments: Vec<Comment> },
    Heartbeat { heartbeat: bool },
}
