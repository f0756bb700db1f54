//! Configuration file support for synclone.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `SYNCLONE_`, e.g. `SYNCLONE_GITHUB_TOKEN`)
//! 3. Local config file (./synclone.toml)
//! 4. User config file (~/.config/synclone/config.toml)
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use SYNCLONE_GITHUB_TOKEN
//!
//! [gitlab]
//! host = "https://gitlab.example.com"
//! token = "glpat-..."
//!
//! [gitea]
//! host = "https://codeberg.org"
//! token = "..."
//!
//! [gogs]
//! host = "https://gogs.example.com"
//!
//! [sync]
//! parallelism = 10
//! strategy = "reset"
//! max_attempts = 3
//!
//! [state]
//! dir = "/var/lib/synclone/sessions"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use synclone::platform::{HttpClientFactory, ProviderCredentials, ProviderKind};
use synclone::sync::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_OPERATION_TIMEOUT, DEFAULT_PARALLELISM, EngineOptions, Strategy,
};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: ProviderConfig,
    pub gitlab: ProviderConfig,
    /// Gitea and Forgejo instances, including Codeberg.
    pub gitea: ProviderConfig,
    pub gogs: ProviderConfig,
    pub sync: SyncConfig,
    pub state: StateConfig,
}

/// Credentials and host for one provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Personal access token.
    pub token: Option<String>,
    /// API host; the provider's public instance when unset.
    pub host: Option<String>,
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub parallelism: usize,
    pub strategy: Strategy,
    pub max_attempts: u32,
    /// Enumerated repositories buffered ahead of the workers.
    pub channel_capacity: usize,
    /// Upper bound for a single clone or update.
    pub operation_timeout_secs: u64,
    pub checkpoint_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            strategy: Strategy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT.as_secs(),
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL.as_secs(),
        }
    }
}

/// Where session checkpoints live.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// A broken config file is reported and ignored rather than aborting.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local_config = PathBuf::from("synclone.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./synclone.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // SYNCLONE_GITHUB_TOKEN -> github.token
        builder = builder.add_source(
            Environment::with_prefix("SYNCLONE")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::GitHub => &self.github,
            ProviderKind::GitLab => &self.gitlab,
            ProviderKind::Gitea => &self.gitea,
            ProviderKind::Gogs => &self.gogs,
        }
    }

    /// A client factory carrying every configured token and host.
    pub fn client_factory(&self) -> HttpClientFactory {
        ProviderKind::ALL
            .into_iter()
            .fold(HttpClientFactory::new(), |factory, kind| {
                let provider = self.provider(kind);
                factory.with_credentials(
                    kind,
                    ProviderCredentials {
                        token: provider.token.clone(),
                        host: provider.host.clone(),
                    },
                )
            })
    }

    /// Engine tuning from `[sync]`, with an optional attempts override.
    pub fn engine_options(&self, max_attempts: Option<u32>) -> EngineOptions {
        EngineOptions::default()
            .with_max_attempts(max_attempts.unwrap_or(self.sync.max_attempts))
            .with_channel_capacity(self.sync.channel_capacity)
            .with_operation_timeout(Duration::from_secs(self.sync.operation_timeout_secs.max(1)))
            .with_checkpoint_interval(Duration::from_secs(
                self.sync.checkpoint_interval_secs.max(1),
            ))
    }

    /// Checkpoint directory: `[state] dir`, else `<state dir>/sessions`.
    pub fn sessions_dir(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        match self.state.dir {
            Some(ref dir) => Ok(dir.clone()),
            None => Self::default_state_dir()
                .map(|dir| dir.join("sessions"))
                .ok_or_else(|| "could not determine a state directory; set [state] dir".into()),
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "synclone").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// On Linux, `$XDG_STATE_HOME/synclone` or `~/.local/state/synclone`;
    /// elsewhere the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "synclone").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
