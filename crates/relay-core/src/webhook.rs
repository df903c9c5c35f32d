//! Inbound webhook payloads and their classification.
//!
//! The tracker sends two families of events the relay reacts to:
//!
//! - `AgentSessionEvent` with action `created` (someone delegated or mentioned
//!   the agent on an issue) or `prompted` (a follow-up message, or a stop
//!   signal, inside an existing session);
//! - `Comment` events on project-update threads, where the agent only reacts
//!   when mentioned or when replied to in a thread it already joined.
//!
//! [`classify`] maps a parsed payload to exactly one [`Classification`].

use crate::error::{RelayError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const SESSION_EVENT_TYPE: &str = "AgentSessionEvent";
pub const COMMENT_EVENT_TYPE: &str = "Comment";
pub const STOP_SIGNAL: &str = "stop";

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// The relay's own identity in the tracker.
    #[serde(default)]
    pub app_user_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub agent_session: Option<AgentSessionData>,
    #[serde(default)]
    pub agent_activity: Option<AgentActivityData>,
    /// Pre-rendered conversation context supplied by the tracker.
    #[serde(default)]
    pub prompt_context: Option<String>,
    #[serde(default)]
    pub previous_comments: Vec<CommentData>,
    /// Entity body for non-session events (`Comment`).
    #[serde(default)]
    pub data: Option<CommentData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionData {
    pub id: String,
    #[serde(default)]
    pub issue: Option<IssueData>,
    #[serde(default)]
    pub comment: Option<CommentData>,
    #[serde(default)]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub creator: Option<UserRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActivityData {
    pub id: String,
    #[serde(default)]
    pub content: Option<ActivityContentData>,
    /// Shallow sibling of `content.body`. Not the user's message: the tracker
    /// fills it with a rendered summary that can differ from what was typed.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityContentData {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueData {
    pub id: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub team: Option<TeamRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentData {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub project_update_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl CommentData {
    fn author_id(&self) -> Option<String> {
        self.user_id
            .clone()
            .or_else(|| self.user.as_ref().map(|u| u.id.clone()))
    }
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| RelayError::MalformedPayload(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Domain view
// ---------------------------------------------------------------------------

/// What a session is about.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Issue {
        id: String,
        identifier: Option<String>,
        title: String,
        description: Option<String>,
        url: Option<String>,
        team_key: Option<String>,
    },
    /// A note on a project-update thread.
    ProjectUpdate { id: String },
}

impl Subject {
    pub fn id(&self) -> &str {
        match self {
            Subject::Issue { id, .. } | Subject::ProjectUpdate { id } => id,
        }
    }

    /// Human label: issue identifier when known, otherwise the raw id.
    pub fn label(&self) -> &str {
        match self {
            Subject::Issue {
                identifier: Some(ident),
                ..
            } => ident,
            other => other.id(),
        }
    }
}

/// One conversation thread in the tracker that the relay responds to.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSession {
    pub id: String,
    pub subject: Subject,
    /// Latest human-authored message.
    pub message: String,
    /// Accumulated context (tracker-rendered or assembled from comments).
    pub context: String,
}

/// Who caused an event and who the relay is, both straight from the payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Actors {
    pub actor_id: Option<String>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEvent {
    pub comment_id: String,
    /// Root comment of the thread; replies are posted under it.
    pub thread_id: String,
    pub project_update_id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    SessionCreated {
        session: AgentSession,
        actors: Actors,
    },
    SessionPrompted {
        session: AgentSession,
        activity_id: String,
        actors: Actors,
    },
    StopSignal {
        session_id: String,
        actors: Actors,
    },
    ThreadMention {
        thread: ThreadEvent,
        actors: Actors,
    },
    ThreadReply {
        thread: ThreadEvent,
        actors: Actors,
    },
    Ignored {
        event_type: String,
        action: String,
    },
}

impl Classification {
    /// Short kebab-case name for logs, debug captures and responses.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::SessionCreated { .. } => "session-created",
            Classification::SessionPrompted { .. } => "session-prompted",
            Classification::StopSignal { .. } => "stop-signal",
            Classification::ThreadMention { .. } => "thread-mention",
            Classification::ThreadReply { .. } => "thread-reply",
            Classification::Ignored { .. } => "ignored",
        }
    }

    pub fn actors(&self) -> Option<&Actors> {
        match self {
            Classification::SessionCreated { actors, .. }
            | Classification::SessionPrompted { actors, .. }
            | Classification::StopSignal { actors, .. }
            | Classification::ThreadMention { actors, .. }
            | Classification::ThreadReply { actors, .. } => Some(actors),
            Classification::Ignored { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Assign a payload to exactly one [`Classification`].
///
/// Returns [`RelayError::MalformedPayload`] when a recognised event lacks the
/// nested data needed to act on it.
pub fn classify(payload: &WebhookPayload, mention_token: &str) -> Result<Classification> {
    match (payload.event_type.as_str(), payload.action.as_str()) {
        (SESSION_EVENT_TYPE, "created") => classify_created(payload),
        (SESSION_EVENT_TYPE, "prompted") => classify_prompted(payload),
        (COMMENT_EVENT_TYPE, "create") => classify_comment(payload, mention_token),
        (event_type, action) => Ok(Classification::Ignored {
            event_type: event_type.to_string(),
            action: action.to_string(),
        }),
    }
}

fn require_session(payload: &WebhookPayload) -> Result<&AgentSessionData> {
    payload
        .agent_session
        .as_ref()
        .ok_or_else(|| RelayError::MalformedPayload("missing agentSession".into()))
}

fn classify_created(payload: &WebhookPayload) -> Result<Classification> {
    let data = require_session(payload)?;
    let message = data
        .comment
        .as_ref()
        .map(|c| c.body.clone())
        .unwrap_or_default();
    let actor_id = data
        .comment
        .as_ref()
        .and_then(CommentData::author_id)
        .or_else(|| data.creator_id.clone())
        .or_else(|| data.creator.as_ref().map(|u| u.id.clone()));

    Ok(Classification::SessionCreated {
        session: AgentSession {
            id: data.id.clone(),
            subject: subject_of(data)?,
            context: context_of(payload, data),
            message,
        },
        actors: Actors {
            actor_id,
            agent_id: payload.app_user_id.clone(),
        },
    })
}

fn classify_prompted(payload: &WebhookPayload) -> Result<Classification> {
    let data = require_session(payload)?;
    let activity = payload
        .agent_activity
        .as_ref()
        .ok_or_else(|| RelayError::MalformedPayload("missing agentActivity".into()))?;
    let actors = Actors {
        actor_id: activity.user_id.clone(),
        agent_id: payload.app_user_id.clone(),
    };

    let is_stop = activity
        .signal
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case(STOP_SIGNAL));
    if is_stop {
        return Ok(Classification::StopSignal {
            session_id: data.id.clone(),
            actors,
        });
    }

    let message = activity
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| {
            RelayError::MalformedPayload("agentActivity.content.body is missing".into())
        })?;

    Ok(Classification::SessionPrompted {
        session: AgentSession {
            id: data.id.clone(),
            subject: subject_of(data)?,
            context: context_of(payload, data),
            message,
        },
        activity_id: activity.id.clone(),
        actors,
    })
}

fn classify_comment(payload: &WebhookPayload, mention_token: &str) -> Result<Classification> {
    let ignored = || {
        Ok(Classification::Ignored {
            event_type: payload.event_type.clone(),
            action: payload.action.clone(),
        })
    };
    let comment = payload
        .data
        .as_ref()
        .ok_or_else(|| RelayError::MalformedPayload("missing comment data".into()))?;
    let Some(project_update_id) = comment.project_update_id.clone() else {
        return ignored();
    };

    let thread = ThreadEvent {
        comment_id: comment.id.clone(),
        thread_id: comment
            .parent_id
            .clone()
            .unwrap_or_else(|| comment.id.clone()),
        project_update_id,
        body: comment.body.clone(),
    };
    let actors = Actors {
        actor_id: comment.author_id(),
        agent_id: payload.app_user_id.clone(),
    };

    if mentions(&comment.body, mention_token) {
        Ok(Classification::ThreadMention { thread, actors })
    } else if comment.parent_id.is_some() {
        Ok(Classification::ThreadReply { thread, actors })
    } else {
        ignored()
    }
}

/// Case-insensitive substring match for the mention token.
pub fn mentions(body: &str, mention_token: &str) -> bool {
    !mention_token.is_empty() && body.to_lowercase().contains(&mention_token.to_lowercase())
}

fn subject_of(data: &AgentSessionData) -> Result<Subject> {
    if let Some(issue) = &data.issue {
        return Ok(Subject::Issue {
            id: issue.id.clone(),
            identifier: issue.identifier.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            url: issue.url.clone(),
            team_key: issue.team.as_ref().and_then(|t| t.key.clone()),
        });
    }
    if let Some(update_id) = data
        .comment
        .as_ref()
        .and_then(|c| c.project_update_id.clone())
    {
        return Ok(Subject::ProjectUpdate { id: update_id });
    }
    Err(RelayError::MalformedPayload(
        "agentSession has neither an issue nor a project update".into(),
    ))
}

fn context_of(payload: &WebhookPayload, data: &AgentSessionData) -> String {
    if let Some(ctx) = payload
        .prompt_context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        return ctx.to_string();
    }

    let mut parts = Vec::new();
    if let Some(desc) = data
        .issue
        .as_ref()
        .and_then(|i| i.description.as_deref())
        .filter(|d| !d.trim().is_empty())
    {
        parts.push(desc.trim().to_string());
    }
    for comment in &payload.previous_comments {
        if !comment.body.trim().is_empty() {
            parts.push(format!("> {}", comment.body.trim()));
        }
    }
    parts.join("\n\n")
}
