use crate::text::CLARIFICATION_MARKER;
use crate::webhook::{AgentSession, Subject, ThreadEvent};
use crate::workspace::Workspace;
use std::fmt::Write;

/// Appended to the agent's system prompt on every run.
pub fn system_append() -> String {
    format!(
        "You are working on behalf of a user in an issue tracker. Your final \
         message is posted back to them verbatim, so make it a concise summary \
         of what you did. If you cannot proceed without an answer from the \
         user, put {CLARIFICATION_MARKER} on its own line and follow it with \
         your questions."
    )
}

/// Full prompt for a run with no conversation to resume.
pub fn compose(session: &AgentSession, workspace: &Workspace) -> String {
    let mut out = String::new();

    match &session.subject {
        Subject::Issue {
            identifier,
            title,
            url,
            ..
        } => {
            let _ = match identifier {
                Some(ident) => writeln!(out, "# {ident}: {title}"),
                None => writeln!(out, "# {title}"),
            };
            if let Some(url) = url {
                let _ = writeln!(out, "\n{url}");
            }
        }
        Subject::ProjectUpdate { id } => {
            let _ = writeln!(out, "# Project update {id}");
        }
    }

    if !session.context.trim().is_empty() {
        let _ = write!(out, "\n## Context\n\n{}\n", session.context.trim());
    }

    let request = session.message.trim();
    if !request.is_empty() {
        let _ = write!(out, "\n## Request\n\n{request}\n");
    }

    if let Some(instructions) = &workspace.clone_instructions {
        let _ = write!(out, "\n## Workspace\n\n{instructions}\n");
    }

    out
}

/// Prompt for a follow-up when the agent's own conversation already holds
/// the history: just the new message.
pub fn follow_up(message: &str) -> String {
    message.trim().to_string()
}

/// Prompt for a mention or reply on a project-update thread.
pub fn thread(event: &ThreadEvent) -> String {
    format!(
        "# Project update {}\n\nYou were mentioned in a comment thread. Reply to this comment:\n\n{}\n",
        event.project_update_id,
        event.body.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AgentSession {
        AgentSession {
            id: "sess-1".into(),
            subject: Subject::Issue {
                id: "issue-1".into(),
                identifier: Some("ENG-42".into()),
                title: "Login button broken".into(),
                description: None,
                url: None,
                team_key: None,
            },
            message: "@agent fix the bug".into(),
            context: "Clicking login does nothing.".into(),
        }
    }

    #[test]
    fn prompt_contains_title_context_and_request() {
        let prompt = compose(&session(), &Workspace::at("/repos"));
        assert!(prompt.starts_with("# ENG-42: Login button broken\n"));
        assert!(prompt.contains("Clicking login does nothing."));
        assert!(prompt.contains("@agent fix the bug"));
        assert!(!prompt.contains("## Workspace"));
    }

    #[test]
    fn clone_instructions_are_appended() {
        let ws = Workspace {
            dir: "/repos".into(),
            clone_instructions: Some("git clone x".into()),
        };
        let prompt = compose(&session(), &ws);
        assert!(prompt.ends_with("## Workspace\n\ngit clone x\n"));
    }

    #[test]
    fn follow_up_is_only_the_message() {
        assert_eq!(follow_up("  also the docs \n"), "also the docs");
    }

    #[test]
    fn system_append_names_the_marker() {
        assert!(system_append().contains(CLARIFICATION_MARKER));
    }
}
