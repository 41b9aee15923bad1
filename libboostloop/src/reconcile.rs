//! Unfollow accounts that no longer follow back
//!
//! The remote following list is authoritative here: after a pass the local
//! following set is rebuilt from it, which also drops ids that were recorded
//! locally but never actually followed.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{BoostError, Result};
use crate::platforms::SocialClient;
use crate::state::{BotState, TrackedSet};
use crate::store::{Store, StoreKind};
use crate::types::{Page, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Followers,
    Following,
}

impl std::fmt::Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listing::Followers => write!(f, "followers"),
            Listing::Following => write!(f, "following"),
        }
    }
}

/// Page through a listing until the cursor runs out
pub async fn list_all(
    client: &dyn SocialClient,
    listing: Listing,
    page_size: u32,
) -> Result<Vec<Profile>> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let Page {
            items,
            cursor: next_cursor,
        } = match listing {
            Listing::Followers => client.list_followers(cursor.as_deref(), page_size).await?,
            Listing::Following => client.list_following(cursor.as_deref(), page_size).await?,
        };
        let empty = items.is_empty();
        all.extend(items);

        if empty {
            break;
        }
        match next_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }

    debug!("Fetched {} {} entries", all.len(), listing);
    Ok(all)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnfollowReport {
    pub unfollowed: Vec<String>,
    pub failed: Vec<String>,
    /// Non-mutuals without a follow record to delete
    pub skipped: Vec<String>,
}

/// Unfollow everyone followed who does not follow back, then persist
pub async fn unfollow(
    client: &dyn SocialClient,
    state: &mut BotState,
    store: &Store,
    page_size: u32,
) -> Result<UnfollowReport> {
    info!("Running unfollow");
    let followers = list_all(client, Listing::Followers, page_size).await?;
    let following = list_all(client, Listing::Following, page_size).await?;

    let follower_ids: HashSet<&str> = followers.iter().map(|p| p.did.as_str()).collect();
    let mut report = UnfollowReport::default();
    let mut targets: Vec<(&Profile, &str)> = Vec::new();

    for profile in following.iter().filter(|p| !follower_ids.contains(p.did.as_str())) {
        match profile.following_uri.as_deref() {
            Some(uri) => targets.push((profile, uri)),
            None => {
                warn!("No follow record for {}, skipping", profile.handle);
                report.skipped.push(profile.did.clone());
            }
        }
    }

    let outcomes = join_all(targets.iter().map(|(profile, uri)| async move {
        info!("Unfollowing {} ({})", profile.handle, profile.did);
        (*profile, client.unfollow(uri).await)
    }))
    .await;

    let mut fatal: Option<BoostError> = None;
    for (profile, outcome) in outcomes {
        match outcome {
            Ok(()) => report.unfollowed.push(profile.did.clone()),
            Err(e) => {
                warn!("Failed to unfollow {}: {}", profile.handle, e);
                report.failed.push(profile.did.clone());
                if e.is_authentication() && fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }
    }

    let removed: HashSet<&str> = report.unfollowed.iter().map(String::as_str).collect();
    state.following = following
        .iter()
        .filter(|p| !removed.contains(p.did.as_str()))
        .map(|p| p.did.clone())
        .collect();
    store.save_set(StoreKind::Following, &state.following)?;

    if let Some(e) = fatal {
        return Err(e);
    }

    info!(
        "Unfollow done: {} unfollowed, {} failed, {} skipped, {} still followed",
        report.unfollowed.len(),
        report.failed.len(),
        report.skipped.len(),
        state.following.len()
    );
    Ok(report)
}

/// Fill an empty following set from the remote following list
///
/// Returns the number of ids seeded; a non-empty set is left alone.
pub async fn seed_following(
    client: &dyn SocialClient,
    state: &mut BotState,
    page_size: u32,
) -> Result<usize> {
    if !state.following.is_empty() {
        debug!("Following set already has {} ids", state.following.len());
        return Ok(0);
    }

    let following = list_all(client, Listing::Following, page_size).await?;
    state.following = following.into_iter().map(|p| p.did).collect::<TrackedSet>();
    info!("Seeded following set with {} ids", state.following.len());
    Ok(state.following.len())
}
