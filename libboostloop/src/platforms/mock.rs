//! Mock social client for testing
//!
//! An in-memory network with followers, follows and a timeline that pages
//! like the real service. Clones share state, so a test can keep a handle
//! for inspection after moving a clone into a runner. Individual actions can
//! be configured to fail.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PlatformError, Result};
use crate::platforms::SocialClient;
use crate::types::{Page, Post, Profile};

/// DID of the account the mock is logged in as
pub const MOCK_DID: &str = "did:plc:mockself";

#[derive(Debug, Default)]
struct MockState {
    authenticated: bool,
    auth_fails: bool,
    actions_unauthorized: bool,

    followers: Vec<Profile>,
    following: Vec<Profile>,
    timeline: Vec<Post>,

    failing_follows: HashSet<String>,
    failing_unfollows: HashSet<String>,
    failing_reposts: HashSet<String>,
    failing_timeline: bool,
    failing_followers: bool,

    follows: Vec<String>,
    unfollows: Vec<String>,
    reposts: Vec<String>,
    follower_requests: Vec<Option<String>>,
    following_requests: Vec<Option<String>>,
    timeline_requests: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, limit: u32) -> Result<Page<T>> {
    let start = match cursor {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| PlatformError::Request(format!("Invalid cursor: {}", raw)))?,
        None => 0,
    };
    let end = (start + limit as usize).min(items.len());
    let page = items.get(start..end).unwrap_or_default().to_vec();
    let cursor = (end < items.len()).then(|| end.to_string());
    Ok(Page::new(page, cursor))
}

impl MockClient {
    /// Create a mock that still needs `authenticate`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that is already logged in
    pub fn logged_in() -> Self {
        let client = Self::new();
        client.lock().authenticated = true;
        client
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn check_auth(state: &MockState) -> Result<()> {
        if !state.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }
        Ok(())
    }

    fn check_action(state: &MockState) -> Result<()> {
        Self::check_auth(state)?;
        if state.actions_unauthorized {
            return Err(PlatformError::Authentication("Session revoked".to_string()).into());
        }
        Ok(())
    }

    /// Followers, newest first
    pub fn with_followers(self, followers: Vec<Profile>) -> Self {
        self.lock().followers = followers;
        self
    }

    /// Follows with record URIs filled in where missing
    pub fn with_following(self, following: Vec<Profile>) -> Self {
        self.lock().following = following.into_iter().map(with_follow_uri).collect();
        self
    }

    /// Add a follow whose record URI is unknown
    pub fn with_unlinked_following(self, mut profile: Profile) -> Self {
        profile.following_uri = None;
        self.lock().following.push(profile);
        self
    }

    /// Timeline, newest first
    pub fn with_timeline(self, timeline: Vec<Post>) -> Self {
        self.lock().timeline = timeline;
        self
    }

    pub fn failing_auth(self) -> Self {
        self.lock().auth_fails = true;
        self
    }

    pub fn failing_follow(self, did: &str) -> Self {
        self.lock().failing_follows.insert(did.to_string());
        self
    }

    pub fn failing_unfollow(self, did: &str) -> Self {
        self.lock().failing_unfollows.insert(did.to_string());
        self
    }

    pub fn failing_repost(self, cid: &str) -> Self {
        self.lock().failing_reposts.insert(cid.to_string());
        self
    }

    /// Make every follow, unfollow and repost fail authentication
    pub fn revoke_actions(&self) {
        self.lock().actions_unauthorized = true;
    }

    pub fn set_timeline_failing(&self, failing: bool) {
        self.lock().failing_timeline = failing;
    }

    pub fn set_followers_failing(&self, failing: bool) {
        self.lock().failing_followers = failing;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_follows.clear();
        state.failing_unfollows.clear();
        state.failing_reposts.clear();
        state.failing_timeline = false;
        state.failing_followers = false;
        state.actions_unauthorized = false;
    }

    /// A new account follows us; it becomes the newest follower
    pub fn add_follower(&self, profile: Profile) {
        self.lock().followers.insert(0, profile);
    }

    /// An account stops following us
    pub fn remove_follower(&self, did: &str) {
        self.lock().followers.retain(|p| p.did != did);
    }

    /// DIDs passed to successful `follow` calls
    pub fn follows(&self) -> Vec<String> {
        self.lock().follows.clone()
    }

    /// DIDs removed by successful `unfollow` calls
    pub fn unfollows(&self) -> Vec<String> {
        self.lock().unfollows.clone()
    }

    /// CIDs passed to successful `repost` calls
    pub fn reposts(&self) -> Vec<String> {
        self.lock().reposts.clone()
    }

    /// DIDs the account currently follows on the mock network
    pub fn following_dids(&self) -> Vec<String> {
        self.lock().following.iter().map(|p| p.did.clone()).collect()
    }

    /// Cursors of every `list_followers` call, in order
    pub fn follower_requests(&self) -> Vec<Option<String>> {
        self.lock().follower_requests.clone()
    }

    pub fn following_requests(&self) -> Vec<Option<String>> {
        self.lock().following_requests.clone()
    }

    pub fn timeline_requests(&self) -> Vec<Option<String>> {
        self.lock().timeline_requests.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }
}

fn follow_uri(did: &str) -> String {
    let rkey = did.rsplit(':').next().unwrap_or(did);
    format!("at://{}/app.bsky.graph.follow/{}", MOCK_DID, rkey)
}

fn with_follow_uri(mut profile: Profile) -> Profile {
    if profile.following_uri.is_none() {
        profile.following_uri = Some(follow_uri(&profile.did));
    }
    profile
}

#[async_trait]
impl SocialClient for MockClient {
    async fn authenticate(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.auth_fails {
            return Err(
                PlatformError::Authentication("Mock authentication failed".to_string()).into(),
            );
        }
        state.authenticated = true;
        Ok(())
    }

    async fn list_followers(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Profile>> {
        let mut state = self.lock();
        Self::check_auth(&state)?;
        state.follower_requests.push(cursor.map(str::to_string));
        if state.failing_followers {
            return Err(PlatformError::Network("Mock followers unavailable".to_string()).into());
        }
        paginate(&state.followers, cursor, limit)
    }

    async fn list_following(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Profile>> {
        let mut state = self.lock();
        Self::check_auth(&state)?;
        state.following_requests.push(cursor.map(str::to_string));
        paginate(&state.following, cursor, limit)
    }

    async fn timeline(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Post>> {
        let mut state = self.lock();
        Self::check_auth(&state)?;
        state.timeline_requests.push(cursor.map(str::to_string));
        if state.failing_timeline {
            return Err(PlatformError::Network("Mock timeline unavailable".to_string()).into());
        }
        paginate(&state.timeline, cursor, limit)
    }

    async fn follow(&self, did: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check_action(&state)?;
        if state.failing_follows.contains(did) {
            return Err(PlatformError::Action(format!("Mock follow of {} failed", did)).into());
        }
        state.follows.push(did.to_string());
        if !state.following.iter().any(|p| p.did == did) {
            state.following.insert(0, with_follow_uri(Profile::new(did, did)));
        }
        Ok(())
    }

    async fn unfollow(&self, following_uri: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check_action(&state)?;
        let did = state
            .following
            .iter()
            .find(|p| p.following_uri.as_deref() == Some(following_uri))
            .map(|p| p.did.clone())
            .ok_or_else(|| {
                PlatformError::Request(format!("No follow record at {}", following_uri))
            })?;
        if state.failing_unfollows.contains(&did) {
            return Err(PlatformError::Action(format!("Mock unfollow of {} failed", did)).into());
        }
        state.following.retain(|p| p.did != did);
        state.unfollows.push(did);
        Ok(())
    }

    async fn repost(&self, post: &Post) -> Result<()> {
        let mut state = self.lock();
        Self::check_action(&state)?;
        if state.failing_reposts.contains(&post.cid) {
            return Err(
                PlatformError::Action(format!("Mock repost of {} failed", post.cid)).into(),
            );
        }
        state.reposts.push(post.cid.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
