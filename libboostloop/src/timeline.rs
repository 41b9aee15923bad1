//! Timeline scan and repost
//!
//! Walks the home timeline newest first, reposting root-level posts that pass
//! the [`PostFilter`], until the page's oldest root-level post falls outside
//! the age window or the feed runs out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{BoostError, Result};
use crate::filter::PostFilter;
use crate::platforms::SocialClient;
use crate::state::BotState;
use crate::types::{Page, Post};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckPostsReport {
    /// CIDs reposted successfully
    pub reposted: Vec<String>,
    /// CIDs whose repost failed; left unrecorded for the next cycle
    pub failed: Vec<String>,
    /// Root-level posts run through the filter
    pub examined: usize,
    pub pages: usize,
}

/// Repost qualifying timeline posts, each at most once
pub async fn check_posts(
    client: &dyn SocialClient,
    filter: &PostFilter,
    state: &mut BotState,
    page_size: u32,
    now: DateTime<Utc>,
) -> Result<CheckPostsReport> {
    info!("Running check posts");
    let mut report = CheckPostsReport::default();
    let mut attempted: HashSet<String> = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut fatal: Option<BoostError> = None;

    loop {
        let Page {
            items,
            cursor: next_cursor,
        } = client.timeline(cursor.as_deref(), page_size).await?;
        report.pages += 1;

        if items.is_empty() {
            debug!("Timeline exhausted");
            break;
        }

        let root_level: Vec<&Post> = items.iter().filter(|p| p.is_root_level()).collect();
        report.examined += root_level.len();

        let mut picks: Vec<&Post> = Vec::new();
        for post in &root_level {
            match filter.evaluate(post, now, &state.reposted) {
                Ok(()) => {
                    if attempted.insert(post.cid.clone()) {
                        picks.push(*post);
                    }
                }
                Err(reason) => debug!("Skipping {}: {}", post.cid, reason),
            }
        }

        let outcomes = join_all(picks.iter().map(|post| async move {
            info!("Reposting {} by {}", post.cid, post.author);
            (*post, client.repost(post).await)
        }))
        .await;

        for (post, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    state.reposted.insert(post.cid.clone());
                    report.reposted.push(post.cid.clone());
                }
                Err(e) => {
                    warn!("Failed to repost {}: {}", post.cid, e);
                    report.failed.push(post.cid.clone());
                    if e.is_authentication() && fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        if fatal.is_some() {
            break;
        }

        let oldest = root_level.iter().min_by_key(|p| p.created_at);
        if let Some(oldest) = oldest {
            if filter.is_too_old(oldest, now) {
                debug!("Reached posts older than {:?}", filter.config().max_age);
                break;
            }
        }

        match next_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }

    if let Some(e) = fatal {
        return Err(e);
    }

    info!(
        "Check posts done: {} reposted, {} failed, {} examined over {} page(s)",
        report.reposted.len(),
        report.failed.len(),
        report.examined,
        report.pages
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::language::FixedDetector;
    use crate::platforms::mock::MockClient;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn post(cid: &str, minutes_old: i64, likes: u64) -> Post {
        Post {
            uri: format!("at://did:plc:author/app.bsky.feed.post/{}", cid),
            cid: cid.to_string(),
            author: "author.bsky.social".to_string(),
            text: "A perfectly ordinary post".to_string(),
            created_at: now() - Duration::minutes(minutes_old),
            like_count: likes,
            repost_count: 0,
            is_reply: false,
            is_repost: false,
        }
    }

    fn filter() -> PostFilter {
        PostFilter::new(FilterConfig::default(), Box::new(FixedDetector::new("english")))
    }

    #[tokio::test]
    async fn test_reposts_only_qualifying_posts() {
        let mut reply = post("reply", 60, 8);
        reply.is_reply = true;
        let client = MockClient::logged_in().with_timeline(vec![
            post("fresh", 10, 8),
            post("good", 45, 8),
            post("popular", 50, 30),
            reply,
            post("quiet", 70, 1),
            post("good2", 90, 6),
        ]);
        let mut state = BotState::default();

        let report = check_posts(&client, &filter(), &mut state, 100, now())
            .await
            .unwrap();

        assert_eq!(client.reposts(), vec!["good", "good2"]);
        assert_eq!(report.reposted, vec!["good", "good2"]);
        assert_eq!(report.examined, 5);
        assert!(state.reposted.contains("good"));
        assert!(state.reposted.contains("good2"));
    }

    #[tokio::test]
    async fn test_stops_when_oldest_post_too_old() {
        let client = MockClient::logged_in().with_timeline(vec![
            post("a", 60, 8),
            post("b", 150, 8),
            post("c", 160, 8),
            post("d", 170, 8),
        ]);
        let mut state = BotState::default();

        let report = check_posts(&client, &filter(), &mut state, 2, now())
            .await
            .unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(client.timeline_requests(), vec![None]);
        assert_eq!(client.reposts(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_keeps_paging_while_posts_are_recent() {
        let client = MockClient::logged_in().with_timeline(vec![
            post("a", 40, 8),
            post("b", 50, 8),
            post("c", 60, 8),
        ]);
        let mut state = BotState::default();

        let report = check_posts(&client, &filter(), &mut state, 2, now())
            .await
            .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(client.reposts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_timeline_stops() {
        let client = MockClient::logged_in();
        let mut state = BotState::default();

        let report = check_posts(&client, &filter(), &mut state, 100, now())
            .await
            .unwrap();

        assert_eq!(report.pages, 1);
        assert!(client.reposts().is_empty());
    }

    #[tokio::test]
    async fn test_never_reposts_twice() {
        let client = MockClient::logged_in().with_timeline(vec![post("a", 60, 8)]);
        let mut state = BotState::default();

        check_posts(&client, &filter(), &mut state, 100, now())
            .await
            .unwrap();
        check_posts(&client, &filter(), &mut state, 100, now())
            .await
            .unwrap();

        assert_eq!(client.reposts(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_failed_repost_is_retried_next_time() {
        let client = MockClient::logged_in()
            .with_timeline(vec![post("a", 60, 8), post("b", 61, 8)])
            .failing_repost("a");
        let mut state = BotState::default();

        let report = check_posts(&client, &filter(), &mut state, 100, now())
            .await
            .unwrap();
        assert_eq!(report.failed, vec!["a"]);
        assert!(!state.reposted.contains("a"));

        client.clear_failures();
        check_posts(&client, &filter(), &mut state, 100, now())
            .await
            .unwrap();
        assert_eq!(client.reposts(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_boosted_old_posts_do_not_end_paging() {
        let mut boosted = post("boosted", 600, 8);
        boosted.is_repost = true;
        let client = MockClient::logged_in().with_timeline(vec![
            post("a", 40, 8),
            boosted,
            post("b", 50, 8),
        ]);
        let mut state = BotState::default();

        check_posts(&client, &filter(), &mut state, 2, now())
            .await
            .unwrap();

        assert_eq!(client.reposts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_authentication_failure_is_returned() {
        let client = MockClient::logged_in().with_timeline(vec![post("a", 60, 8)]);
        client.revoke_actions();
        let mut state = BotState::default();

        let err = check_posts(&client, &filter(), &mut state, 100, now())
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(state.reposted.is_empty());
    }
}
