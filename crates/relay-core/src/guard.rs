//! Loop prevention: duplicate suppression and self-trigger suppression.

use crate::registry::SessionRegistry;
use crate::webhook::{Actors, Classification};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Duplicate,
    SelfTrigger,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::SelfTrigger => "self-trigger",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Skip(SkipReason),
}

/// Key under which a run for this event is recorded. Follow-ups are keyed by
/// session and sub-event because one session receives many of them.
/// Stop signals and ignored events have no key.
pub fn dedup_key(classification: &Classification) -> Option<String> {
    match classification {
        Classification::SessionCreated { session, .. } => Some(session.id.clone()),
        Classification::SessionPrompted {
            session,
            activity_id,
            ..
        } => Some(format!("{}:{}", session.id, activity_id)),
        Classification::ThreadMention { thread, .. } | Classification::ThreadReply { thread, .. } => {
            Some(format!("comment:{}", thread.comment_id))
        }
        Classification::StopSignal { .. } | Classification::Ignored { .. } => None,
    }
}

/// True when the triggering actor is the relay's own identity.
pub fn is_self_trigger(actors: &Actors) -> bool {
    match (&actors.actor_id, &actors.agent_id) {
        (Some(actor), Some(agent)) => !actor.is_empty() && actor == agent,
        _ => false,
    }
}

#[derive(Debug)]
pub struct LoopGuard {
    registry: SessionRegistry,
}

impl LoopGuard {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Decide whether `classification` may start a run.
    ///
    /// The identity check runs first so self-triggered events never occupy a
    /// registry slot. On `Proceed` the dedup key has already been recorded.
    pub fn check(&mut self, classification: &Classification) -> Verdict {
        if classification.actors().is_some_and(is_self_trigger) {
            return Verdict::Skip(SkipReason::SelfTrigger);
        }
        match dedup_key(classification) {
            Some(key) if !self.registry.check_and_record(&key) => {
                Verdict::Skip(SkipReason::Duplicate)
            }
            _ => Verdict::Proceed,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::{AgentSession, Subject, ThreadEvent};
    use std::time::Duration;

    fn guard() -> LoopGuard {
        LoopGuard::new(SessionRegistry::new(Duration::from_secs(3600), 100))
    }

    fn session(id: &str) -> AgentSession {
        AgentSession {
            id: id.into(),
            subject: Subject::ProjectUpdate { id: "pu".into() },
            message: String::new(),
            context: String::new(),
        }
    }

    fn actors(actor: &str) -> Actors {
        Actors {
            actor_id: Some(actor.into()),
            agent_id: Some("agent-1".into()),
        }
    }

    fn created(id: &str, actor: &str) -> Classification {
        Classification::SessionCreated {
            session: session(id),
            actors: actors(actor),
        }
    }

    fn prompted(id: &str, activity: &str) -> Classification {
        Classification::SessionPrompted {
            session: session(id),
            activity_id: activity.into(),
            actors: actors("user-1"),
        }
    }

    #[test]
    fn replayed_creation_is_duplicate() {
        let mut g = guard();
        assert_eq!(g.check(&created("s1", "user-1")), Verdict::Proceed);
        assert_eq!(
            g.check(&created("s1", "user-1")),
            Verdict::Skip(SkipReason::Duplicate)
        );
    }

    #[test]
    fn self_trigger_is_skipped_and_not_recorded() {
        let mut g = guard();
        assert_eq!(
            g.check(&created("s1", "agent-1")),
            Verdict::Skip(SkipReason::SelfTrigger)
        );
        assert!(g.registry().is_empty());
        assert_eq!(
            g.check(&created("s1", "agent-1")),
            Verdict::Skip(SkipReason::SelfTrigger)
        );
    }

    #[test]
    fn follow_ups_are_keyed_by_sub_event() {
        let mut g = guard();
        assert_eq!(g.check(&prompted("s1", "a1")), Verdict::Proceed);
        assert_eq!(g.check(&prompted("s1", "a2")), Verdict::Proceed);
        assert_eq!(
            g.check(&prompted("s1", "a1")),
            Verdict::Skip(SkipReason::Duplicate)
        );
    }

    #[test]
    fn stop_signals_are_never_deduplicated() {
        let mut g = guard();
        let stop = Classification::StopSignal {
            session_id: "s1".into(),
            actors: actors("user-1"),
        };
        assert_eq!(g.check(&stop), Verdict::Proceed);
        assert_eq!(g.check(&stop), Verdict::Proceed);
    }

    #[test]
    fn thread_events_are_keyed_by_comment() {
        let thread = ThreadEvent {
            comment_id: "c1".into(),
            thread_id: "c0".into(),
            project_update_id: "pu".into(),
            body: "@agent hi".into(),
        };
        let c = Classification::ThreadMention {
            thread,
            actors: actors("user-1"),
        };
        assert_eq!(dedup_key(&c).as_deref(), Some("comment:c1"));
    }

    #[test]
    fn unknown_identities_are_not_self_triggers() {
        assert!(!is_self_trigger(&Actors::default()));
        assert!(!is_self_trigger(&Actors {
            actor_id: Some("agent-1".into()),
            agent_id: None,
        }));
    }

    #[test]
    fn skip_reasons_render_as_wire_strings() {
        assert_eq!(SkipReason::SelfTrigger.to_string(), "self-trigger");
        assert_eq!(
            serde_json::to_value(SkipReason::Duplicate).unwrap(),
            serde_json::json!("duplicate")
        );
    }
}
