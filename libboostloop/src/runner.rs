//! Cycle scheduling
//!
//! The [`Runner`] owns the client, the store and the in-memory [`BotState`],
//! and drives follow back, timeline reposting and periodic unfollow
//! reconciliation on a fixed interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::{Config, Credentials, ErrorPolicy};
use crate::error::{BoostError, Result};
use crate::filter::PostFilter;
use crate::platforms::bluesky::BlueskyClient;
use crate::platforms::SocialClient;
use crate::reciprocate::{follow_back, FollowBackReport};
use crate::reconcile::{seed_following, unfollow, UnfollowReport};
use crate::state::BotState;
use crate::store::{Store, StoreKind};
use crate::timeline::{check_posts, CheckPostsReport};

/// Upper bound on a single sleep so shutdown is noticed promptly
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// What one cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub follow_back: FollowBackReport,
    pub check_posts: CheckPostsReport,
    /// Present on reconciliation cycles only
    pub unfollow: Option<UnfollowReport>,
}

pub struct Runner {
    client: Box<dyn SocialClient>,
    store: Store,
    filter: PostFilter,
    config: Config,
    state: BotState,
}

impl Runner {
    /// Create a runner, restoring tracked ids from the store
    pub fn new(client: Box<dyn SocialClient>, store: Store, config: Config) -> Self {
        let state = BotState::new(
            store.load_set(StoreKind::Following),
            store.load_set(StoreKind::Reposted),
        );
        info!(
            "Loaded {} followed and {} reposted ids from {}",
            state.following.len(),
            state.reposted.len(),
            store.dir().display()
        );
        let filter = PostFilter::with_default_detector(config.filter.clone());

        Self {
            client,
            store,
            filter,
            config,
            state,
        }
    }

    /// Create a runner against the configured Bluesky service
    pub fn from_config(config: Config, credentials: Credentials) -> Result<Self> {
        let client = BlueskyClient::new(&config.service, credentials)?;
        let store = Store::new(config.store_dir()?);
        Ok(Self::new(Box::new(client), store, config))
    }

    /// Replace the post filter
    pub fn with_filter(mut self, filter: PostFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Log in and seed the following set when nothing was stored
    pub async fn start(&mut self) -> Result<()> {
        info!("Authenticating with {}", self.client.name());
        self.client.authenticate().await?;

        let seeded = seed_following(
            self.client.as_ref(),
            &mut self.state,
            self.config.service.page_size,
        )
        .await?;
        if seeded > 0 {
            self.store
                .save_set(StoreKind::Following, &self.state.following)?;
        }
        Ok(())
    }

    /// Run one cycle
    ///
    /// Each stage's bookkeeping is persisted before its error, if any, is
    /// returned.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.state.run_count += 1;
        let cycle = self.state.run_count;
        let page_size = self.config.service.page_size;
        info!("Starting cycle {}", cycle);

        let followed = follow_back(self.client.as_ref(), &mut self.state, page_size).await;
        self.store
            .save_set(StoreKind::Following, &self.state.following)?;
        let followed = followed?;

        let reposted = check_posts(
            self.client.as_ref(),
            &self.filter,
            &mut self.state,
            page_size,
            Utc::now(),
        )
        .await;
        self.store
            .save_set(StoreKind::Reposted, &self.state.reposted)?;
        let reposted = reposted?;

        let reconcile_every = u64::from(self.config.schedule.reconcile_every.max(1));
        let unfollowed = if cycle % reconcile_every == 0 {
            Some(unfollow(self.client.as_ref(), &mut self.state, &self.store, page_size).await?)
        } else {
            None
        };

        Ok(CycleReport {
            cycle,
            follow_back: followed,
            check_posts: reposted,
            unfollow: unfollowed,
        })
    }

    /// Run cycles until `shutdown` is set or the error policy gives up
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let interval = self.config.schedule.interval;
        let policy = self.config.schedule.error_policy;
        let max_errors = self.config.schedule.max_errors;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping");
                break;
            }

            match self.run_cycle().await {
                Ok(report) => debug!(
                    "Cycle {} finished: {} followed, {} reposted",
                    report.cycle,
                    report.follow_back.followed.len(),
                    report.check_posts.reposted.len()
                ),
                Err(e) => match policy {
                    ErrorPolicy::FailFast => {
                        error!("Cycle {} failed: {}", self.state.run_count, e);
                        return Err(e);
                    }
                    ErrorPolicy::Isolate => {
                        self.state.error_count += 1;
                        error!(
                            "Cycle {} failed ({} of {} errors allowed): {}",
                            self.state.run_count, self.state.error_count, max_errors, e
                        );
                        if self.state.error_count > max_errors {
                            return Err(BoostError::CircuitOpen {
                                errors: self.state.error_count,
                                threshold: max_errors,
                            });
                        }
                    }
                },
            }

            pause(interval, &shutdown).await;
        }

        Ok(())
    }
}

/// Sleep for `interval`, returning early once `shutdown` is set
async fn pause(interval: Duration, shutdown: &AtomicBool) {
    let mut remaining = interval;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let step = remaining.min(SHUTDOWN_POLL);
        sleep(step).await;
        remaining -= step;
    }
}
