//! Outbound calls to the issue tracker's GraphQL API.

use async_trait::async_trait;
use relay_core::activity::ActivityContent;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("tracker request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("tracker returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("tracker query failed: {0}")]
    Graphql(String),

    #[error("tracker response did not include {0}")]
    MissingData(&'static str),

    #[error("{0} was not accepted by the tracker")]
    Rejected(&'static str),
}

/// Where a comment is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentTarget {
    Issue(String),
    /// Reply inside a project-update comment thread.
    Thread {
        project_update_id: String,
        parent_id: String,
    },
}

#[async_trait]
pub trait Tracker: Send + Sync {
    async fn create_activity(
        &self,
        session_id: &str,
        content: &ActivityContent,
        ephemeral: bool,
    ) -> Result<(), TrackerError>;

    async fn create_comment(&self, target: &CommentTarget, body: &str) -> Result<(), TrackerError>;

    /// Links attached to an issue; used to find its repository.
    async fn issue_repository_urls(&self, issue_id: &str) -> Result<Vec<String>, TrackerError>;
}

const CREATE_ACTIVITY: &str = r#"
mutation CreateActivity($input: AgentActivityCreateInput!) {
  agentActivityCreate(input: $input) { success }
}"#;

const CREATE_COMMENT: &str = r#"
mutation CreateComment($input: CommentCreateInput!) {
  commentCreate(input: $input) { success }
}"#;

const ISSUE_LINKS: &str = r#"
query IssueLinks($id: String!) {
  issue(id: $id) {
    attachments { nodes { url } }
  }
}"#;

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

// ---------------------------------------------------------------------------
// GraphqlTracker
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GraphqlTracker {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl fmt::Debug for GraphqlTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphqlTracker")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl GraphqlTracker {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            token: token.into(),
            client,
        })
    }

    async fn execute(&self, query: &str, variables: Value) -> Result<Value, TrackerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TrackerError::Http {
                status: status.as_u16(),
                body: truncate_for_error(&body),
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| TrackerError::Graphql(format!("unparseable response: {e}")))?;
        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TrackerError::Graphql(message));
        }
        envelope.data.ok_or(TrackerError::MissingData("data"))
    }

    async fn mutate(
        &self,
        name: &'static str,
        query: &str,
        input: Value,
    ) -> Result<(), TrackerError> {
        let data = self.execute(query, json!({ "input": input })).await?;
        match data.pointer(&format!("/{name}/success")).and_then(Value::as_bool) {
            Some(true) => Ok(()),
            Some(false) => Err(TrackerError::Rejected(name)),
            None => Err(TrackerError::MissingData(name)),
        }
    }
}

#[async_trait]
impl Tracker for GraphqlTracker {
    async fn create_activity(
        &self,
        session_id: &str,
        content: &ActivityContent,
        ephemeral: bool,
    ) -> Result<(), TrackerError> {
        let input = json!({
            "agentSessionId": session_id,
            "content": content,
            "ephemeral": ephemeral,
        });
        self.mutate("agentActivityCreate", CREATE_ACTIVITY, input)
            .await
    }

    async fn create_comment(&self, target: &CommentTarget, body: &str) -> Result<(), TrackerError> {
        let input = match target {
            CommentTarget::Issue(issue_id) => json!({ "issueId": issue_id, "body": body }),
            CommentTarget::Thread {
                project_update_id,
                parent_id,
            } => json!({
                "projectUpdateId": project_update_id,
                "parentId": parent_id,
                "body": body,
            }),
        };
        self.mutate("commentCreate", CREATE_COMMENT, input).await
    }

    async fn issue_repository_urls(&self, issue_id: &str) -> Result<Vec<String>, TrackerError> {
        let data = self.execute(ISSUE_LINKS, json!({ "id": issue_id })).await?;
        let nodes = data
            .pointer("/issue/attachments/nodes")
            .and_then(Value::as_array)
            .ok_or(TrackerError::MissingData("issue attachments"))?;
        Ok(nodes
            .iter()
            .filter_map(|n| n.get("url").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn tracker(server: &mockito::ServerGuard) -> GraphqlTracker {
        GraphqlTracker::new(server.url(), "lin_oauth_test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn activity_mutation_sends_typed_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer lin_oauth_test")
            .match_body(Matcher::PartialJson(json!({
                "variables": {"input": {
                    "agentSessionId": "sess-1",
                    "content": {"type": "response", "body": "done"},
                    "ephemeral": false
                }}
            })))
            .with_body(r#"{"data":{"agentActivityCreate":{"success":true}}}"#)
            .create_async()
            .await;

        let content = ActivityContent::Response {
            body: "done".into(),
        };
        tracker(&server)
            .create_activity("sess-1", &content, false)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn graphql_errors_are_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"errors":[{"message":"Entity not found"}]}"#)
            .create_async()
            .await;

        let err = tracker(&server)
            .create_comment(&CommentTarget::Issue("i-1".into()), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Graphql(ref m) if m == "Entity not found"));
    }

    #[tokio::test]
    async fn unsuccessful_mutation_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"data":{"commentCreate":{"success":false}}}"#)
            .create_async()
            .await;

        let target = CommentTarget::Thread {
            project_update_id: "pu-1".into(),
            parent_id: "c-1".into(),
        };
        let err = tracker(&server)
            .create_comment(&target, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Rejected("commentCreate")));
    }

    #[tokio::test]
    async fn http_failures_carry_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let err = tracker(&server)
            .issue_repository_urls("i-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn repository_urls_come_from_attachments() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(
                r#"{"data":{"issue":{"attachments":{"nodes":[
                    {"url":"https://github.com/orchard9/relay/pull/3"},
                    {"url":null}
                ]}}}}"#,
            )
            .create_async()
            .await;

        let urls = tracker(&server).issue_repository_urls("i-1").await.unwrap();
        assert_eq!(urls, vec!["https://github.com/orchard9/relay/pull/3"]);
    }

    #[test]
    fn debug_redacts_token() {
        let t = GraphqlTracker::new("http://x", "secret-token", Duration::from_secs(1)).unwrap();
        assert!(!format!("{t:?}").contains("secret-token"));
    }
}
