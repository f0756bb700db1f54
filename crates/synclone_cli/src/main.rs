//! Synclone CLI - resumable bulk clone and update of hosted organizations.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::commands::OutputFormat;
use crate::commands::sessions::SessionAction;
use crate::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "synclone")]
#[command(version)]
#[command(about = "Clone and update every repository of an organization")]
#[command(
    long_about = "Synclone enumerates all repositories of a GitHub organization, GitLab group, \
or Gitea/Gogs organization and clones or updates each one into a local directory. Runs are \
checkpointed, so an interrupted sync can be resumed where it stopped."
)]
#[command(after_long_help = r#"EXAMPLES
    Mirror a GitHub organization:
        $ synclone sync github rust-lang --target ~/src/rust-lang

    Only API services, eight at a time, keeping local commits:
        $ synclone sync gitlab my-company/platform -t ./platform --match '^api-' -j 8 -s pull

    Self-hosted Gitea:
        $ synclone sync gitea infra -t ./infra --host https://git.example.com

    Continue after Ctrl+C or a crash:
        $ synclone sessions list
        $ synclone resume 6f1c...

CONFIGURATION
    Synclone reads configuration from:
      1. ~/.config/synclone/config.toml (or $XDG_CONFIG_HOME/synclone/config.toml)
      2. ./synclone.toml
      3. Environment variables (SYNCLONE_* prefix, e.g., SYNCLONE_GITHUB_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    SYNCLONE_GITHUB_TOKEN     GitHub personal access token
    SYNCLONE_GITLAB_TOKEN     GitLab personal access token
    SYNCLONE_GITLAB_HOST      GitLab host (default: gitlab.com)
    SYNCLONE_GITEA_TOKEN      Gitea/Forgejo personal access token
    SYNCLONE_GITEA_HOST       Gitea/Forgejo host URL
    SYNCLONE_GOGS_TOKEN       Gogs personal access token
    SYNCLONE_GOGS_HOST        Gogs host URL
    SYNCLONE_STATE_DIR        Session checkpoint directory
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone or update all repositories of an organization
    Sync(SyncArgs),
    /// Resume an interrupted session
    Resume {
        /// Session ID (see `synclone sessions list`)
        id: Uuid,

        /// Attempts per repository before it is marked failed
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Report format printed when the run ends
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Inspect and clean up saved sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging only when not attached to a terminal; a TTY gets
    // progress bars instead.
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("synclone=info,synclone_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output)?;
            return Ok(());
        }
        Commands::Sessions { action } => {
            let config = config::Config::load();
            commands::sessions::handle_sessions(action, &config)?;
            return Ok(());
        }
        Commands::Sync(args) => {
            let config = config::Config::load();
            commands::sync::handle_sync(args, &config).await?
        }
        Commands::Resume {
            id,
            max_attempts,
            output,
        } => {
            let config = config::Config::load();
            commands::sync::handle_resume(id, max_attempts, output, &config).await?
        }
    };

    let code = outcome.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resume_and_sessions() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["synclone", "resume", &id.to_string()]).expect("resume");
        assert!(matches!(cli.command, Commands::Resume { id: parsed, .. } if parsed == id));

        let cli = Cli::try_parse_from(["synclone", "sessions", "clean", "--all"]).expect("clean");
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                action: SessionAction::Clean { id: None, all: true }
            }
        ));

        // `clean` needs either an id or --all, not both.
        assert!(Cli::try_parse_from(["synclone", "sessions", "clean"]).is_err());
        assert!(
            Cli::try_parse_from(["synclone", "sessions", "clean", &id.to_string(), "--all"])
                .is_err()
        );
    }

    #[test]
    fn test_sync_requires_target() {
        assert!(Cli::try_parse_from(["synclone", "sync", "github", "acme"]).is_err());
    }
}
