//! Paginated enumeration as a bounded, cancellable sequence.
//!
//! ```text
//! ProviderClient ──pages──▶ producer task ──bounded mpsc──▶ dispatcher
//!                               │
//!                               └── registers repos + commits cursor in Session
//! ```
//!
//! The producer blocks on a full channel, so at most `capacity` descriptors
//! are ever buffered regardless of organization size. A page's cursor is only
//! committed after every descriptor of that page was handed to the channel;
//! an interrupted page is fetched again on resume.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::SyncError;
use super::progress::{ProgressEvent, ProgressSender, emit};
use super::types::{SharedSession, lock_session};
use crate::cancel::CancelToken;
use crate::platform::{PlatformError, ProviderClient, RateLimitInfo, RepoPage, RepositoryDescriptor};
use crate::retry::{RetryPolicy, with_retry};

/// What the producer did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Pages fetched and committed in this run.
    pub pages: usize,
    /// Descriptors handed to the channel in this run.
    pub descriptors: usize,
    /// Stopped by cancellation before the last page.
    pub cancelled: bool,
}

/// Receiving side of the enumeration pipeline.
pub struct RepositoryStream {
    rx: mpsc::Receiver<RepositoryDescriptor>,
}

impl RepositoryStream {
    /// Start the producer for `organization`, continuing from the session's
    /// committed cursor.
    ///
    /// The join handle resolves once the provider reports no further page,
    /// on cancellation, or with [`SyncError::Enumeration`] when a page cannot
    /// be fetched within `page_retry`.
    pub fn spawn(
        client: Arc<dyn ProviderClient>,
        organization: String,
        capacity: usize,
        session: SharedSession,
        events: ProgressSender,
        cancel: CancelToken,
        page_retry: RetryPolicy,
    ) -> (Self, JoinHandle<Result<StreamSummary, SyncError>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let producer = Producer {
            client,
            organization,
            session,
            events,
            cancel,
            page_retry,
            tx,
        };
        (Self { rx }, tokio::spawn(producer.run()))
    }

    /// Next descriptor, or `None` once the producer has stopped and the
    /// buffer is drained.
    pub async fn next(&mut self) -> Option<RepositoryDescriptor> {
        self.rx.recv().await
    }

    /// Descriptors buffered but not yet taken by the dispatcher.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.rx.max_capacity()
    }

    /// Stop accepting descriptors; the producer sees a closed channel.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

struct Producer {
    client: Arc<dyn ProviderClient>,
    organization: String,
    session: SharedSession,
    events: ProgressSender,
    cancel: CancelToken,
    page_retry: RetryPolicy,
    tx: mpsc::Sender<RepositoryDescriptor>,
}

enum Delivery {
    Delivered,
    Cancelled,
}

impl Producer {
    #[tracing::instrument(name = "enumerate", skip_all, fields(org = %self.organization))]
    async fn run(self) -> Result<StreamSummary, SyncError> {
        let mut summary = StreamSummary::default();
        let (mut cursor, complete, mut total) = {
            let session = lock_session(&self.session);
            (
                session.stream_cursor.clone(),
                session.enumeration_complete,
                session.repositories.len(),
            )
        };
        if complete {
            tracing::debug!("Enumeration already complete, nothing to fetch");
            return Ok(summary);
        }

        loop {
            let Some(page) = self.fetch_page(cursor.as_deref()).await? else {
                summary.cancelled = true;
                return Ok(summary);
            };
            let RepoPage { repos, next_cursor } = page;
            let count = repos.len();

            {
                let mut session = lock_session(&self.session);
                for repo in &repos {
                    if session.register(repo) {
                        total += 1;
                    }
                }
            }

            for repo in repos {
                if let Delivery::Cancelled = self.deliver(repo).await {
                    summary.cancelled = true;
                    return Ok(summary);
                }
                summary.descriptors += 1;
            }

            {
                let mut session = lock_session(&self.session);
                session.stream_cursor = next_cursor.clone();
                session.enumeration_complete = next_cursor.is_none();
            }
            summary.pages += 1;
            tracing::debug!(page = summary.pages, count, total, "Page committed");
            emit(
                &self.events,
                ProgressEvent::PageFetched {
                    page: summary.pages,
                    count,
                    total_so_far: total,
                    has_more: next_cursor.is_some(),
                },
            );

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(summary),
            }
        }
    }

    async fn deliver(&self, repo: RepositoryDescriptor) -> Delivery {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Delivery::Cancelled,
            sent = self.tx.send(repo) => match sent {
                Ok(()) => Delivery::Delivered,
                // The dispatcher went away; treat like a stop request.
                Err(_) => Delivery::Cancelled,
            },
        }
    }

    /// Fetch the page at `cursor`, waiting out rate limits and retrying
    /// transient failures. `None` means cancelled.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Option<RepoPage>, SyncError> {
        loop {
            let result = with_retry(
                &self.page_retry,
                || self.client.list_repositories(&self.organization, cursor, &self.cancel),
                PlatformError::is_transient,
                |err, delay, attempt| {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Page fetch failed, retrying: {err}"
                    );
                },
            )
            .await;

            match result {
                Ok(page) => return Ok(Some(page)),
                Err(PlatformError::Cancelled) => return Ok(None),
                Err(PlatformError::RateLimited { reset_at }) => {
                    if self.cancel.is_cancelled() {
                        return Ok(None);
                    }
                    self.await_reset(reset_at);
                }
                Err(source) => {
                    if self.cancel.is_cancelled() {
                        return Ok(None);
                    }
                    return Err(SyncError::Enumeration {
                        organization: self.organization.clone(),
                        source,
                    });
                }
            }
        }
    }

    /// Make sure the host limiter is paused until `reset_at`; the next
    /// `acquire` in the client does the actual waiting.
    fn await_reset(&self, reset_at: DateTime<Utc>) {
        let limiter = self.client.rate_limiter();
        if limiter.suspended_for().is_none() {
            limiter.suspend_until_reset(&RateLimitInfo {
                limit: 0,
                remaining: 0,
                reset_at,
                retry_after: None,
            });
        }
        let wait = limiter.suspended_for().unwrap_or(Duration::ZERO);
        tracing::warn!(
            host = %self.client.host(),
            wait_secs = wait.as_secs(),
            "Rate limited, retrying the same page after reset"
        );
        emit(
            &self.events,
            ProgressEvent::RateLimitWait {
                host: self.client.host().to_string(),
                reset_at,
            },
        );
    }
}
