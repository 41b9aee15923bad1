//! Social network client abstraction and implementations
//!
//! The loops only talk to the network through [`SocialClient`], so the
//! Bluesky client and the in-memory mock are interchangeable.
//!
//! # Examples
//!
//! ```no_run
//! use libboostloop::platforms::{bluesky::BlueskyClient, SocialClient};
//! use libboostloop::{Config, Credentials};
//!
//! # async fn example() -> libboostloop::Result<()> {
//! let config = Config::default();
//! let mut client = BlueskyClient::new(&config.service, Credentials::from_env()?)?;
//! client.authenticate().await?;
//!
//! let page = client.list_followers(None, 100).await?;
//! println!("{} followers on the first page", page.items.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Page, Post, Profile};

pub mod bluesky;

// Mock client is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Operations the control loop needs from the network
///
/// Listing operations take an opaque cursor (`None` for the first page) and
/// a page size, and return the next cursor or `None` on the last page.
/// Mutations report only success or failure.
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Log in and establish a session
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` for rejected credentials.
    async fn authenticate(&mut self) -> Result<()>;

    /// Accounts following this account, newest first
    async fn list_followers(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Profile>>;

    /// Accounts this account follows, with their follow record URIs
    async fn list_following(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Profile>>;

    /// Home timeline, newest first
    async fn timeline(&self, cursor: Option<&str>, limit: u32) -> Result<Page<Post>>;

    /// Follow an account by DID
    async fn follow(&self, did: &str) -> Result<()>;

    /// Delete a follow record by its URI
    async fn unfollow(&self, following_uri: &str) -> Result<()>;

    /// Repost a post
    async fn repost(&self, post: &Post) -> Result<()>;

    /// Short platform identifier used in log lines
    fn name(&self) -> &str;
}
