use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use relay_core::activity::{Activity, NOTHING_TO_STOP, STOP_ACKNOWLEDGEMENT};
use relay_core::guard::{SkipReason, Verdict};
use relay_core::webhook::{classify, Classification, WebhookPayload};
use serde_json::{json, Value};
use std::path::Path;

use crate::emitter::RunTarget;
use crate::error::AppError;
use crate::runner::RunRequest;
use crate::signature::{self, SIGNATURE_HEADER};
use crate::state::AppState;

/// POST /webhook: verify, classify, guard, then hand the run off.
///
/// Responds before any run completes. Signature failures are rejected before
/// the body is parsed.
pub async fn receive(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let claimed = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !signature::verify(&body, claimed, &app.webhook_secret) {
        tracing::warn!(has_signature = claimed.is_some(), "rejected webhook with invalid signature");
        return Err(AppError::unauthorized("invalid signature"));
    }

    let classified = WebhookPayload::parse(&body)
        .and_then(|payload| classify(&payload, &app.mention_token).map(|c| (payload, c)));

    if let Some(dir) = &app.debug_dir {
        let kind = classified.as_ref().map_or("malformed", |(_, c)| c.label());
        capture(dir, &body, kind).await;
    }

    let (payload, classification) = classified.inspect_err(|e| {
        tracing::warn!(error = %e, "rejected malformed webhook");
    })?;
    tracing::info!(
        kind = classification.label(),
        created_at = ?payload.created_at,
        "webhook received"
    );

    Ok(Json(dispatch(&app, classification)))
}

fn dispatch(app: &AppState, classification: Classification) -> Value {
    if let Classification::Ignored { event_type, action } = &classification {
        tracing::debug!(%event_type, %action, "ignoring webhook");
        return json!({ "received": true });
    }
    if let Classification::ThreadReply { thread, .. } = &classification {
        if !app.is_engaged(&thread.thread_id) {
            tracing::debug!(thread = %thread.thread_id, "reply on a thread the agent is not part of");
            return json!({ "received": true });
        }
    }

    if let Verdict::Skip(reason) = app.guard().check(&classification) {
        tracing::warn!(kind = classification.label(), %reason, "skipping webhook");
        return skipped(reason);
    }

    let request = match classification {
        Classification::StopSignal { session_id, .. } => return stop(app, session_id),
        Classification::SessionCreated { session, .. } => RunRequest::Created(session),
        Classification::SessionPrompted { session, .. } => RunRequest::FollowUp(session),
        Classification::ThreadMention { thread, .. } => {
            app.engage_thread(&thread.thread_id);
            RunRequest::Thread(thread)
        }
        Classification::ThreadReply { thread, .. } => {
            app.engage_thread(&thread.thread_id);
            RunRequest::Thread(thread)
        }
        Classification::Ignored { .. } => return json!({ "received": true }),
    };

    app.runner.spawn(request);
    json!({ "received": true })
}

fn skipped(reason: SkipReason) -> Value {
    json!({ "received": true, "skipped": reason })
}

/// Cancel the session's live run, if any, and acknowledge in the background.
fn stop(app: &AppState, session_id: String) -> Value {
    let cancelled = app.runner.cancellations().stop(&session_id);
    tracing::info!(%session_id, cancelled, "stop signal");

    let emitter = app.runner.emitter().clone();
    let activity = if cancelled {
        Activity::Acknowledgement(STOP_ACKNOWLEDGEMENT.into())
    } else {
        Activity::Response(NOTHING_TO_STOP.into())
    };
    tokio::spawn(async move {
        emitter.emit(&RunTarget::Session(session_id), activity).await;
    });

    json!({ "received": true, "action": "stop-acknowledged", "cancelled": cancelled })
}

/// Write the raw body to the debug directory. Best-effort.
async fn capture(dir: &Path, body: &[u8], kind: &str) {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let name = format!(
        "{}-{kind}-{}.json",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        &id[..8]
    );
    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(&name), body).await
    }
    .await;
    if let Err(e) = result {
        tracing::warn!(dir = %dir.display(), error = %e, "could not capture webhook body");
    }
}
