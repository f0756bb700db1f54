use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use synclone::platform::ProviderKind;
use synclone::sync::{
    CheckpointStore, SyncCoordinator, SyncReport, SyncRequest, SyncRun, SystemGit, Visibility,
};
use synclone::{Strategy, SyncError};
use uuid::Uuid;

use super::OutputFormat;
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown;

/// Arguments of `synclone sync`.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SyncArgs {
    /// Hosting provider: github, gitlab, gitea (also forgejo/codeberg) or gogs
    pub provider: ProviderKind,

    /// Organization, group (e.g. "my-company/team") or user to sync
    pub organization: String,

    /// Directory the repositories are cloned into
    #[arg(short, long)]
    pub target: PathBuf,

    /// How existing checkouts are updated: reset, pull or fetch (default from config or reset)
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Concurrent git operations (default from config or 10)
    #[arg(short = 'j', long)]
    pub parallelism: Option<usize>,

    /// Only sync repositories whose name matches this regex
    #[arg(short = 'm', long = "match", value_name = "REGEX")]
    pub name_pattern: Option<String>,

    /// Skip repositories whose name matches this regex
    #[arg(short = 'x', long = "exclude", value_name = "REGEX")]
    pub exclude_pattern: Option<String>,

    /// Which repositories to include: all, public or private
    #[arg(long, default_value_t = Visibility::All)]
    pub visibility: Visibility,

    /// Include archived repositories
    #[arg(long)]
    pub include_archived: bool,

    /// After a complete run, delete local checkouts of repositories the organization no longer lists
    #[arg(long)]
    pub cleanup_orphans: bool,

    /// API host for self-hosted instances (default from config or the public instance)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Attempts per repository before it is marked failed (default from config or 3)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Continue an interrupted session instead of starting a new one
    #[arg(long, value_name = "SESSION_ID")]
    pub resume: Option<Uuid>,

    /// Report format printed when the run ends
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

impl SyncArgs {
    /// Resolve flags and config into a request.
    pub(crate) fn to_request(&self, config: &Config) -> Result<SyncRequest, Box<dyn std::error::Error>> {
        // Sessions are matched by target path, so it must not depend on the
        // working directory.
        let target = std::path::absolute(&self.target)?;

        let mut request = SyncRequest::new(self.provider, self.organization.clone(), target)
            .with_strategy(self.strategy.unwrap_or(config.sync.strategy))
            .with_parallelism(self.parallelism.unwrap_or(config.sync.parallelism))
            .with_visibility(self.visibility);
        if let Some(ref pattern) = self.name_pattern {
            request = request.with_name_pattern(pattern.clone());
        }
        if let Some(ref pattern) = self.exclude_pattern {
            request = request.with_exclude_pattern(pattern.clone());
        }
        if let Some(ref host) = self.host {
            request = request.with_host(host.clone());
        }
        request.include_archived = self.include_archived;
        request.cleanup_orphans = self.cleanup_orphans;
        request.resume_session_id = self.resume;
        Ok(request)
    }
}

/// How a run ended, for the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Success,
    /// Finished, but some repositories failed.
    Failures,
    Cancelled,
}

impl RunOutcome {
    pub(crate) fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failures => 1,
            Self::Cancelled => 130,
        }
    }

    fn of(report: &SyncReport) -> Self {
        if report.cancelled {
            Self::Cancelled
        } else if report.has_failures() {
            Self::Failures
        } else {
            Self::Success
        }
    }
}

fn coordinator(config: &Config, max_attempts: Option<u32>) -> Result<SyncCoordinator, Box<dyn std::error::Error>> {
    let store = CheckpointStore::new(config.sessions_dir()?);
    tracing::debug!(dir = %store.dir().display(), "Using session store");
    Ok(SyncCoordinator::new(
        store,
        Arc::new(config.client_factory()),
        Arc::new(SystemGit::new()),
        config.engine_options(max_attempts),
    ))
}

pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let request = args.to_request(config)?;
    let coordinator = coordinator(config, args.max_attempts)?;

    let run = match coordinator.start(request).await {
        Ok(run) => run,
        Err(e @ SyncError::ActiveSessionExists { .. }) => {
            eprintln!("{} {e}", style("error:").red().bold());
            return Ok(RunOutcome::Failures);
        }
        Err(e) => return Err(e.into()),
    };
    drive(run, args.output).await
}

pub(crate) async fn handle_resume(
    session_id: Uuid,
    max_attempts: Option<u32>,
    output: OutputFormat,
    config: &Config,
) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let coordinator = coordinator(config, max_attempts)?;
    let run = coordinator.resume(session_id).await?;
    drive(run, output).await
}

/// Render events until the run ends, then print the report.
async fn drive(mut run: SyncRun, output: OutputFormat) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    shutdown::install(run.handle.cancel_token());

    let reporter = ProgressReporter::new();
    while let Some(event) = run.events.recv().await {
        reporter.handle(&event);
    }
    reporter.finish();

    let report = run.handle.wait().await?;
    match output {
        OutputFormat::Table => print_summary(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(RunOutcome::of(&report))
}

fn print_summary(report: &SyncReport) {
    println!();
    println!(
        "{} {} completed, {} failed, {} skipped in {:.1}s",
        style("Summary:").bold(),
        style(report.completed).green(),
        if report.failed > 0 {
            style(report.failed).red()
        } else {
            style(report.failed).dim()
        },
        report.skipped,
        report.elapsed.as_secs_f64()
    );

    if !report.failures.is_empty() {
        println!();
        println!("{}", style("Failed repositories:").red().bold());
        for failure in &report.failures {
            let first_line = failure.error.lines().next().unwrap_or(&failure.error);
            println!(
                "  {} {} (after {} attempts)",
                style("✗").red(),
                style(&failure.full_name).bold(),
                failure.attempts
            );
            println!("      {}", style(first_line).dim());
            println!("      hint: {}", failure.hint.remediation());
        }
    }

    if !report.orphans_removed.is_empty() {
        println!();
        println!(
            "{} {} orphaned checkouts",
            style("Removed").yellow().bold(),
            report.orphans_removed.len()
        );
        for path in &report.orphans_removed {
            println!("  {} {}", style("-").dim(), path.display());
        }
    }

    if report.cancelled {
        println!();
        println!(
            "{} {} repositories left. Resume with: {}",
            style("Cancelled.").yellow().bold(),
            report.pending,
            style(format!("synclone resume {}", report.session_id)).cyan()
        );
    }
}
