use console::style;
use synclone::sync::{CheckpointStore, RepoStatus, Session, SessionSummary};
use tabled::Tabled;
use uuid::Uuid;

use super::OutputFormat;
use crate::config::Config;

#[derive(Debug, Clone, clap::Subcommand)]
pub(crate) enum SessionAction {
    /// List resumable sessions, newest first
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show one session and its unfinished or failed repositories
    Show {
        id: Uuid,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Delete saved sessions
    Clean {
        /// Session to delete
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<Uuid>,

        /// Delete every saved session
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Clone, Tabled)]
struct SessionRow {
    #[tabled(rename = "Session")]
    id: Uuid,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Organization")]
    organization: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Done")]
    done: String,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Last Checkpoint")]
    last_checkpoint: String,
}

impl From<&SessionSummary> for SessionRow {
    fn from(summary: &SessionSummary) -> Self {
        let counts = summary.counts;
        let finished = counts.completed + counts.failed + counts.skipped;
        let total = if summary.enumeration_complete {
            counts.total().to_string()
        } else {
            format!("{}+", counts.total())
        };
        Self {
            id: summary.id,
            provider: summary.provider.to_string(),
            organization: summary.organization.clone(),
            target: summary.target_dir.display().to_string(),
            done: format!("{finished}/{total}"),
            failed: counts.failed,
            last_checkpoint: summary
                .last_checkpoint_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
struct RepoRow {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Status")]
    status: RepoStatus,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Last Error")]
    error: String,
}

/// Repositories worth showing: anything not completed or skipped.
fn open_repositories(session: &Session) -> Vec<RepoRow> {
    session
        .repositories
        .values()
        .filter(|s| !matches!(s.status, RepoStatus::Completed | RepoStatus::Skipped))
        .map(|s| RepoRow {
            repository: s.full_name.clone(),
            status: s.status,
            attempts: s.attempts,
            error: s
                .last_error
                .as_deref()
                .and_then(|e| e.lines().next())
                .unwrap_or("")
                .to_string(),
        })
        .collect()
}

pub(crate) fn handle_sessions(
    action: SessionAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = CheckpointStore::new(config.sessions_dir()?);
    run(action, &store)
}

fn run(action: SessionAction, store: &CheckpointStore) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::List { output } => {
            let sessions = store.list()?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
                OutputFormat::Table if sessions.is_empty() => {
                    println!("No resumable sessions in {}", store.dir().display());
                }
                OutputFormat::Table => {
                    let rows: Vec<SessionRow> = sessions.iter().map(SessionRow::from).collect();
                    let mut table = tabled::Table::new(rows);
                    table.with(tabled::settings::Style::rounded());
                    println!("{table}");
                }
            }
        }

        SessionAction::Show { id, output } => {
            let session = store.load(id)?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&session)?),
                OutputFormat::Table => print_session(&session),
            }
        }

        SessionAction::Clean { id: Some(id), .. } => {
            store.delete(id)?;
            println!("Deleted session {id}");
        }

        SessionAction::Clean { id: None, .. } => {
            let sessions = store.list()?;
            for summary in &sessions {
                store.delete(summary.id)?;
            }
            println!("Deleted {} session(s)", sessions.len());
        }
    }
    Ok(())
}

fn print_session(session: &Session) {
    let request = &session.request;
    let counts = session.counts();

    println!("{} {}", style("Session").bold(), session.id);
    println!("  provider:     {}", request.provider);
    println!("  organization: {}", request.organization);
    println!("  target:       {}", request.target_dir.display());
    println!(
        "  strategy:     {} (parallelism {})",
        request.strategy, request.parallelism
    );
    println!("  created:      {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "  progress:     {} completed, {} failed, {} skipped, {} pending{}",
        counts.completed,
        counts.failed,
        counts.skipped,
        counts.pending + counts.in_progress,
        if session.enumeration_complete {
            ""
        } else {
            " (listing incomplete)"
        }
    );

    let rows = open_repositories(session);
    if !rows.is_empty() {
        let mut table = tabled::Table::new(rows);
        table.with(tabled::settings::Style::rounded());
        println!("{table}");
    }
    println!();
    println!("Resume with: {}", style(format!("synclone resume {}", session.id)).cyan());
}

#[cfg(test)]
mod tests {
    use synclone::platform::{ProviderKind, RepositoryDescriptor};
    use synclone::sync::SyncRequest;

    use super::*;

    fn descriptor(name: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            provider: ProviderKind::Gitea,
            organization: "acme".into(),
            name: name.into(),
            full_name: format!("acme/{name}"),
            clone_url: format!("https://gitea.test/acme/{name}.git"),
            private: false,
            archived: false,
            default_branch: "main".into(),
            language: None,
            updated_at: None,
        }
    }

    fn sample_session() -> Session {
        let mut session = Session::new(SyncRequest::new(ProviderKind::Gitea, "acme", "/srv/acme"));
        for name in ["api", "web", "docs"] {
            session.register(&descriptor(name));
        }
        session.mark_completed(&descriptor("api"), 10);
        session.mark_failed(&descriptor("web"), "fatal: Authentication failed\nmore".into());
        session
    }

    #[test]
    fn test_open_repositories_lists_unfinished_and_failed() {
        let rows = open_repositories(&sample_session());
        let names: Vec<_> = rows.iter().map(|r| r.repository.as_str()).collect();
        assert_eq!(names, vec!["acme/docs", "acme/web"]);

        let web = rows.iter().find(|r| r.repository == "acme/web").expect("web");
        assert_eq!(web.status, RepoStatus::Failed);
        assert_eq!(web.error, "fatal: Authentication failed");
    }

    #[test]
    fn test_session_row_marks_incomplete_listing() {
        let session = sample_session();
        let dir = tempfile::tempdir().expect("dir");
        let store = CheckpointStore::new(dir.path());
        store.save(&session).expect("save");

        let summaries = store.list().expect("list");
        let row = SessionRow::from(&summaries[0]);
        assert_eq!(row.done, "2/3+");
        assert_eq!(row.failed, 1);
        assert_eq!(row.provider, "gitea");
    }

    #[test]
    fn test_clean_deletes_sessions() {
        let dir = tempfile::tempdir().expect("dir");
        let store = CheckpointStore::new(dir.path());
        let first = sample_session();
        let second = sample_session();
        store.save(&first).expect("save");
        store.save(&second).expect("save");

        run(
            SessionAction::Clean {
                id: Some(first.id),
                all: false,
            },
            &store,
        )
        .expect("clean one");
        assert!(!store.exists(first.id));
        assert!(store.exists(second.id));

        run(SessionAction::Clean { id: None, all: true }, &store).expect("clean all");
        assert!(store.list().expect("list").is_empty());

        assert!(run(
            SessionAction::Clean {
                id: Some(first.id),
                all: false,
            },
            &store
        )
        .is_err());
    }
}
