pub(crate) mod meta;
pub(crate) mod sessions;
pub(crate) mod sync;

use clap::ValueEnum;

/// Output format for reports and listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Table,
    /// JSON on stdout
    Json,
}
