use crate::output::{print_json, print_table};
use clap::Subcommand;
use relay_core::config::Config;
use relay_core::resume::ResumptionStore;
use serde_json::json;

#[derive(Subcommand)]
pub enum SessionsSubcommand {
    /// List sessions with a resumable agent conversation
    List,

    /// Drop one session's entry; its next follow-up starts fresh
    Forget {
        /// Tracker session id
        session_id: String,
    },

    /// Drop every entry
    Clear,
}

pub fn run(config: &Config, subcmd: SessionsSubcommand, json: bool) -> anyhow::Result<()> {
    let store = ResumptionStore::new(config.resume_path()?);
    match subcmd {
        SessionsSubcommand::List => list(&store, json),
        SessionsSubcommand::Forget { session_id } => forget(&store, &session_id, json),
        SessionsSubcommand::Clear => clear(&store, json),
    }
}

fn list(store: &ResumptionStore, json: bool) -> anyhow::Result<()> {
    let entries = store.list();
    if json {
        let items: Vec<_> = entries
            .iter()
            .map(|(session, conversation)| json!({ "session_id": session, "conversation_id": conversation }))
            .collect();
        return print_json(&items);
    }
    if entries.is_empty() {
        println!("No resumable sessions.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = entries
        .into_iter()
        .map(|(session, conversation)| vec![session, conversation])
        .collect();
    print_table(&["SESSION", "CONVERSATION"], &rows);
    Ok(())
}

fn forget(store: &ResumptionStore, session_id: &str, json: bool) -> anyhow::Result<()> {
    let removed = store.delete(session_id)?;
    if json {
        return print_json(&json!({ "session_id": session_id, "removed": removed }));
    }
    if removed {
        println!("Forgot session {session_id}.");
    } else {
        println!("No entry for session {session_id}.");
    }
    Ok(())
}

fn clear(store: &ResumptionStore, json: bool) -> anyhow::Result<()> {
    let removed = store.clear()?;
    if json {
        return print_json(&json!({ "removed": removed }));
    }
    println!("Removed {removed} session(s).");
    Ok(())
}
