//! Scheduled publication
//!
//! A sweep promotes every scheduled post whose publication instant has been
//! reached. Each post is flipped by a conditional update that re-checks its
//! scheduled status and date, so overlapping sweeps never publish a post
//! twice and a post moved to a later date after selection stays scheduled.
//! `published_at` is never touched: the scheduled date becomes the
//! publication date.

use crate::clock::DynClock;
use crate::db::repositories::PostRepository;
use crate::models::{PostStatus, TransitionActor};
use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// How a sweep ended. Both are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// No scheduled post was due
    NothingDue,
    /// Due posts were found; this many were flipped by this sweep
    Published(u64),
}

/// A post published by a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedPost {
    pub id: i64,
    pub title: String,
}

/// Result of one sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub published_count: u64,
    /// Due posts whose update failed; the next sweep retries them
    pub failed_count: u64,
    pub published: Vec<PublishedPost>,
    pub outcome: SweepOutcome,
}

impl SweepReport {
    /// Console output, one line per published post then a summary
    pub fn lines(&self) -> Vec<String> {
        match self.outcome {
            SweepOutcome::NothingDue => vec!["Aucun article programmé à publier.".to_string()],
            SweepOutcome::Published(count) => self
                .published
                .iter()
                .map(|post| format!("Publié : {}", post.title))
                .chain(std::iter::once(format!(
                    "{} article(s) publié(s) avec succès.",
                    count
                )))
                .collect(),
        }
    }

    pub fn summary(&self) -> String {
        self.lines().join("\n")
    }
}

/// Runs sweeps against the post store
pub struct PublicationService {
    posts: Arc<dyn PostRepository>,
    clock: DynClock,
}

impl PublicationService {
    pub fn new(posts: Arc<dyn PostRepository>, clock: DynClock) -> Self {
        Self { posts, clock }
    }

    /// Publish every due scheduled post.
    ///
    /// Only the selection can fail the sweep. A failing post is logged,
    /// counted and skipped.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let due = self
            .posts
            .list_due_scheduled(now)
            .await
            .context("Failed to select due scheduled posts")?;

        if due.is_empty() {
            tracing::debug!("No scheduled post due");
            return Ok(SweepReport {
                published_count: 0,
                failed_count: 0,
                published: Vec::new(),
                outcome: SweepOutcome::NothingDue,
            });
        }

        let mut published = Vec::new();
        let mut failed_count = 0u64;

        for post in due {
            if !post
                .status
                .can_transition(PostStatus::Published, TransitionActor::Sweeper)
            {
                continue;
            }

            match self.posts.publish_if_scheduled(post.id, now).await {
                Ok(true) => {
                    tracing::info!(post_id = post.id, "Publié : {}", post.title);
                    published.push(PublishedPost {
                        id: post.id,
                        title: post.title,
                    });
                }
                Ok(false) => {
                    tracing::debug!(post_id = post.id, "Post no longer scheduled, skipped");
                }
                Err(e) => {
                    failed_count += 1;
                    tracing::warn!(post_id = post.id, "Failed to publish scheduled post: {:#}", e);
                }
            }
        }

        let published_count = published.len() as u64;
        tracing::info!(
            published = published_count,
            failed = failed_count,
            "{} article(s) publié(s) avec succès.",
            published_count
        );

        Ok(SweepReport {
            published_count,
            failed_count,
            published,
            outcome: SweepOutcome::Published(published_count),
        })
    }
}

/// Interval used when a scheduler is built with a zero period
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a sweep on a fixed interval until shut down
pub struct PublicationScheduler {
    service: Arc<PublicationService>,
    interval: Duration,
}

impl PublicationScheduler {
    /// A zero `interval` is raised to [`MIN_SWEEP_INTERVAL`].
    pub fn new(service: Arc<PublicationService>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            tracing::warn!(
                "Zero sweep interval requested, using {}s",
                MIN_SWEEP_INTERVAL.as_secs()
            );
            MIN_SWEEP_INTERVAL
        } else {
            interval
        };
        Self { service, interval }
    }

    /// Sweep immediately, then once per interval, until `shutdown` resolves.
    /// A failed sweep is logged and the loop carries on.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = self.interval.as_secs(), "Publication scheduler started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Publication scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.service.run_sweep().await {
                        tracing::error!("Scheduled publication sweep failed: {:#}", e);
                    }
                }
            }
        }
    }
}
