//! Follow back new followers
//!
//! Pages through followers newest first and follows everyone not already
//! followed. Paging stops at the follower remembered from the previous pass,
//! so a steady-state cycle costs one request. Follows that failed are kept
//! aside and retried directly on the next pass.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{BoostError, Result};
use crate::platforms::SocialClient;
use crate::state::BotState;
use crate::types::{Page, Profile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowBackReport {
    /// DIDs followed successfully, retries first, then in page order
    pub followed: Vec<String>,
    /// DIDs whose follow failed; queued in `pending_follows`
    pub failed: Vec<String>,
    pub pages: usize,
}

/// Follow every follower that is not yet followed
///
/// Listing errors abort the pass. Follow failures are logged and queued for
/// the next pass, except authentication failures, which are returned once
/// the successful follows have been recorded.
pub async fn follow_back(
    client: &dyn SocialClient,
    state: &mut BotState,
    page_size: u32,
) -> Result<FollowBackReport> {
    info!("Running follow back");
    let mut report = FollowBackReport::default();
    let mut attempted: HashSet<String> = HashSet::new();

    let pending = std::mem::take(&mut state.pending_follows);
    let retry: Vec<Profile> = pending
        .iter()
        .filter(|did| !state.following.contains(did))
        .map(|did| Profile::new(did.clone(), did.clone()))
        .collect();
    if !retry.is_empty() {
        info!("Retrying {} failed follow(s)", retry.len());
        attempted.extend(retry.iter().map(|p| p.did.clone()));
        if let Some(e) = follow_batch(client, state, &retry, &mut report).await {
            return Err(e);
        }
    }

    let mut cursor: Option<String> = None;
    let mut fatal: Option<BoostError> = None;
    let previous_mark = state.last_seen_follower.clone();
    let mut new_mark: Option<String> = None;

    loop {
        let first_page = cursor.is_none();
        let Page {
            items,
            cursor: next_cursor,
        } = client.list_followers(cursor.as_deref(), page_size).await?;
        report.pages += 1;

        let fetched = items.len();
        if first_page {
            new_mark = items.first().map(|p| p.did.clone());
        }
        let mut candidates = items;
        let mut reached_seen = false;

        if let Some(last_seen) = previous_mark.as_deref() {
            match candidates.iter().position(|p| p.did == last_seen) {
                Some(0) => {
                    debug!("No new followers since {}", last_seen);
                    break;
                }
                Some(index) => {
                    candidates.truncate(index);
                    reached_seen = true;
                }
                None => {}
            }
        }

        candidates.retain(|p| !state.following.contains(&p.did) && attempted.insert(p.did.clone()));

        if candidates.is_empty() {
            break;
        }

        fatal = follow_batch(client, state, &candidates, &mut report).await;

        if fatal.is_some() || reached_seen || fetched < page_size as usize {
            break;
        }
        match next_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }

    // Later pages may not have been reached; keep the old mark
    if let Some(e) = fatal {
        return Err(e);
    }

    if new_mark.is_some() {
        state.last_seen_follower = new_mark;
    }

    info!(
        "Follow back done: {} followed, {} failed, {} page(s)",
        report.followed.len(),
        report.failed.len(),
        report.pages
    );
    Ok(report)
}

/// Follow `batch` concurrently and record each outcome
///
/// Returns the first authentication failure, if any.
async fn follow_batch(
    client: &dyn SocialClient,
    state: &mut BotState,
    batch: &[Profile],
    report: &mut FollowBackReport,
) -> Option<BoostError> {
    let outcomes = join_all(batch.iter().map(|profile| async move {
        info!("Following {} ({})", profile.handle, profile.did);
        (profile, client.follow(&profile.did).await)
    }))
    .await;

    let mut fatal = None;
    for (profile, outcome) in outcomes {
        match outcome {
            Ok(()) => {
                state.following.insert(profile.did.clone());
                report.followed.push(profile.did.clone());
            }
            Err(e) => {
                warn!("Failed to follow {}: {}", profile.handle, e);
                state.pending_follows.insert(profile.did.clone());
                report.failed.push(profile.did.clone());
                if e.is_authentication() && fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }
    }
    fatal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockClient;
    use crate::state::TrackedSet;
    use crate::types::Profile;

    fn profiles(range: std::ops::Range<usize>) -> Vec<Profile> {
        range
            .map(|i| Profile::new(format!("did:plc:{}", i), format!("u{}.test", i)))
            .collect()
    }

    fn did(i: usize) -> String {
        format!("did:plc:{}", i)
    }

    #[tokio::test]
    async fn test_follows_everyone_on_first_run() {
        let client = MockClient::logged_in().with_followers(profiles(0..5));
        let mut state = BotState::default();

        let report = follow_back(&client, &mut state, 100).await.unwrap();

        assert_eq!(report.followed.len(), 5);
        assert_eq!(report.pages, 1);
        assert_eq!(state.following.len(), 5);
        assert_eq!(state.last_seen_follower, Some(did(0)));
    }

    #[tokio::test]
    async fn test_last_seen_first_entry_stops_immediately() {
        let client = MockClient::logged_in().with_followers(profiles(0..5));
        let mut state = BotState::default();
        state.last_seen_follower = Some(did(0));

        let report = follow_back(&client, &mut state, 100).await.unwrap();

        assert!(report.followed.is_empty());
        assert!(client.follows().is_empty());
        assert_eq!(client.follower_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_truncates_at_last_seen() {
        // Pages of 2; the mark sits on the second page
        let client = MockClient::logged_in().with_followers(profiles(0..6));
        let mut state = BotState::default();
        state.last_seen_follower = Some(did(3));

        let report = follow_back(&client, &mut state, 2).await.unwrap();

        assert_eq!(client.follows(), vec![did(0), did(1), did(2)]);
        assert_eq!(report.pages, 2);
        assert_eq!(state.last_seen_follower, Some(did(0)));
    }

    #[tokio::test]
    async fn test_skips_already_followed() {
        let client = MockClient::logged_in().with_followers(profiles(0..4));
        let mut state = BotState::new(vec![did(1), did(3)].into(), TrackedSet::new());

        follow_back(&client, &mut state, 100).await.unwrap();

        assert_eq!(client.follows(), vec![did(0), did(2)]);
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let client = MockClient::logged_in().with_followers(profiles(0..5));
        let mut state = BotState::default();

        let report = follow_back(&client, &mut state, 2).await.unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(client.follows().len(), 5);
        assert_eq!(
            client.follower_requests(),
            vec![None, Some("2".to_string()), Some("4".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stale_mark_scans_everything_once_per_id() {
        let mut followers = profiles(0..4);
        followers.push(Profile::new(did(1), "dup.test"));
        let client = MockClient::logged_in().with_followers(followers);
        let mut state = BotState::default();
        state.last_seen_follower = Some("did:plc:gone".to_string());

        follow_back(&client, &mut state, 2).await.unwrap();

        assert_eq!(client.follows(), vec![did(0), did(1), did(2), did(3)]);
    }

    #[tokio::test]
    async fn test_failed_follow_is_queued_and_retried() {
        let client = MockClient::logged_in()
            .with_followers(profiles(0..3))
            .failing_follow(&did(1));
        let mut state = BotState::default();

        let report = follow_back(&client, &mut state, 100).await.unwrap();

        assert_eq!(report.failed, vec![did(1)]);
        assert!(!state.following.contains(&did(1)));
        assert!(state.following.contains(&did(0)));
        assert!(state.pending_follows.contains(&did(1)));
        assert_eq!(state.last_seen_follower, Some(did(0)));

        // Next cycle retries only the failed account
        client.clear_failures();
        let report = follow_back(&client, &mut state, 100).await.unwrap();
        assert_eq!(report.followed, vec![did(1)]);
        assert_eq!(client.follows(), vec![did(0), did(2), did(1)]);
        assert!(state.pending_follows.is_empty());
    }

    #[tokio::test]
    async fn test_failed_follow_deep_in_the_list_is_retried() {
        let client = MockClient::logged_in()
            .with_followers(profiles(0..250))
            .failing_follow(&did(200));
        let mut state = BotState::default();

        let report = follow_back(&client, &mut state, 100).await.unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.failed, vec![did(200)]);

        // Still failing: stays queued without paging back to it
        let report = follow_back(&client, &mut state, 100).await.unwrap();
        assert_eq!(report.failed, vec![did(200)]);
        assert_eq!(report.pages, 1);

        client.clear_failures();
        let report = follow_back(&client, &mut state, 100).await.unwrap();
        assert_eq!(report.followed, vec![did(200)]);
        assert!(state.following.contains(&did(200)));
        assert!(state.pending_follows.is_empty());
        assert_eq!(state.following.len(), 250);

        let report = follow_back(&client, &mut state, 100).await.unwrap();
        assert!(report.followed.is_empty());
        assert_eq!(client.follows().len(), 250);
    }

    #[tokio::test]
    async fn test_pending_already_followed_is_dropped() {
        let client = MockClient::logged_in().with_followers(profiles(0..1));
        let mut state = BotState::new(vec![did(0)].into(), TrackedSet::new());
        state.pending_follows.insert(did(0));

        let report = follow_back(&client, &mut state, 100).await.unwrap();

        assert!(report.followed.is_empty());
        assert!(client.follows().is_empty());
        assert!(state.pending_follows.is_empty());
    }

    #[tokio::test]
    async fn test_authentication_failure_is_returned() {
        let client = MockClient::logged_in().with_followers(profiles(0..2));
        client.revoke_actions();
        let mut state = BotState::default();

        let err = follow_back(&client, &mut state, 100).await.unwrap_err();
        assert!(err.is_authentication());
        assert!(state.following.is_empty());
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let client = MockClient::logged_in().with_followers(profiles(0..2));
        client.set_followers_failing(true);
        let mut state = BotState::default();

        assert!(follow_back(&client, &mut state, 100).await.is_err());
    }
}
