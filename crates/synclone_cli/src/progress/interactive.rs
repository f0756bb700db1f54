use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use synclone::sync::{ProgressEvent, SkipReason};

use super::format_bytes;

#[derive(Default)]
struct ProgressState {
    /// Repositories that reached a final outcome in this run.
    processed: u64,
    completed: usize,
    failed: usize,
    skipped: usize,
    bytes: u64,
    /// Highest known repository count.
    known: u64,
}

/// Interactive progress reporter using indicatif.
///
/// One spinner follows enumeration, one bar follows repositories.
pub(crate) struct InteractiveReporter {
    multi: MultiProgress,
    list_bar: ProgressBar,
    sync_bar: ProgressBar,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();

        let list_bar = multi.add(ProgressBar::new_spinner());
        list_bar.set_style(Self::spinner_style());
        list_bar.set_prefix(format!("{:10}", "Listing"));
        list_bar.enable_steady_tick(Duration::from_millis(100));

        let sync_bar = multi.add(ProgressBar::new(0));
        sync_bar.set_style(Self::bar_style());
        sync_bar.set_prefix(format!("{:10}", "Syncing"));

        Self {
            multi,
            list_bar,
            sync_bar,
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub(crate) fn handle(&self, event: &ProgressEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            ProgressEvent::Started {
                organization,
                resumed,
                ..
            } => {
                let verb = if *resumed { "Resuming" } else { "Listing" };
                self.list_bar
                    .set_message(format!("{verb} {organization}..."));
            }

            ProgressEvent::PageFetched {
                page,
                total_so_far,
                has_more,
                ..
            } => {
                state.known = state.known.max(*total_so_far as u64);
                self.sync_bar.set_length(state.known.max(state.processed));
                if *has_more {
                    self.list_bar
                        .set_message(format!("Page {page} ({total_so_far} repos)"));
                } else {
                    self.list_bar
                        .finish_with_message(format!("✓ {total_so_far} repos in {page} pages"));
                }
            }

            ProgressEvent::RateLimitWait { host, reset_at } => {
                self.list_bar.set_message(format!(
                    "Rate limited by {host}, waiting until {}",
                    reset_at.format("%H:%M:%S")
                ));
            }

            ProgressEvent::RepoStarted { full_name, attempt } => {
                if *attempt > 1 {
                    self.sync_bar
                        .set_message(format!("↻ {full_name} (attempt {attempt})"));
                } else {
                    self.sync_bar.set_message(format!("→ {full_name}"));
                }
            }

            ProgressEvent::RepoCompleted {
                full_name,
                cloned,
                bytes_transferred,
                ..
            } => {
                state.completed += 1;
                state.bytes += bytes_transferred;
                Self::advance(&self.sync_bar, &mut state);
                let symbol = if *cloned { "✓" } else { "·" };
                self.sync_bar.set_message(format!("{symbol} {full_name}"));
            }

            ProgressEvent::RepoFailed {
                full_name,
                error,
                will_retry,
                ..
            } => {
                if !*will_retry {
                    state.failed += 1;
                    Self::advance(&self.sync_bar, &mut state);
                    let first_line = error.lines().next().unwrap_or(error);
                    self.multi
                        .println(format!("✗ {full_name}: {first_line}"))
                        .ok();
                }
            }

            ProgressEvent::RepoSkipped { reason, .. } => {
                // Work finished in an earlier run moves the bar but is not
                // counted as skipped in this run.
                if matches!(reason, SkipReason::Filtered(_)) {
                    state.skipped += 1;
                }
                Self::advance(&self.sync_bar, &mut state);
            }

            ProgressEvent::OrphanRemoved { path } => {
                self.multi
                    .println(format!("- removed {}", path.display()))
                    .ok();
            }

            ProgressEvent::SessionCompleted { .. } => {
                self.sync_bar.finish_with_message(format!(
                    "✓ {} synced, {} failed, {} skipped ({})",
                    state.completed,
                    state.failed,
                    state.skipped,
                    format_bytes(state.bytes)
                ));
            }

            ProgressEvent::SessionCancelled { .. } => {
                self.sync_bar
                    .abandon_with_message(format!("Cancelled after {} synced", state.completed));
            }

            ProgressEvent::SessionFailed { error } => {
                self.sync_bar.abandon_with_message(format!("✗ {error}"));
            }

            _ => {}
        }
    }

    fn advance(bar: &ProgressBar, state: &mut ProgressState) {
        state.processed += 1;
        if state.processed > state.known {
            state.known = state.processed;
        }
        bar.set_length(state.known);
        bar.set_position(state.processed);
    }

    pub(crate) fn finish(&self) {
        if !self.list_bar.is_finished() {
            self.list_bar.finish();
        }
        if !self.sync_bar.is_finished() {
            self.sync_bar.finish();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
