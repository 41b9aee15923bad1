//! Boostloop - an unattended follower and repost manager for Bluesky
//!
//! This library provides the control loop that reciprocates follows, reposts
//! a bounded selection of timeline posts and keeps local idempotency state
//! so that no action is repeated across restarts.

pub mod config;
pub mod error;
pub mod filter;
pub mod language;
pub mod logging;
pub mod platforms;
pub mod reciprocate;
pub mod reconcile;
pub mod runner;
pub mod state;
pub mod store;
pub mod timeline;
pub mod types;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use error::{BoostError, Result};
pub use runner::Runner;
pub use state::{BotState, TrackedSet};
pub use store::{Store, StoreKind};
pub use types::{Page, Post, Profile};
