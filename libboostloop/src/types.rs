//! Core types for Boostloop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Self { items, cursor }
    }
}

/// An account as seen in follower/following listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    /// URI of the follow record this account created for them, if any
    pub following_uri: Option<String>,
}

impl Profile {
    pub fn new(did: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
            following_uri: None,
        }
    }
}

/// Read-only view of a timeline entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub uri: String,
    /// Content id; the key recorded in the reposted set
    pub cid: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub repost_count: u64,
    pub is_reply: bool,
    /// Shown in the timeline because someone reposted it
    pub is_repost: bool,
}

impl Post {
    /// Neither a reply nor a repost of another post
    pub fn is_root_level(&self) -> bool {
        !self.is_reply && !self.is_repost
    }

    /// Age relative to `now`; posts dated in the future have zero age
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }
}
