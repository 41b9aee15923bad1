//! Repost eligibility rules
//!
//! A post qualifies when it is root-level, not yet reposted, written in an
//! accepted language, inside the age window, not already popular, and has
//! enough weighted engagement.

use chrono::{DateTime, Utc};

use crate::config::FilterConfig;
use crate::language::{LanguageDetector, WhatlangDetector};
use crate::state::TrackedSet;
use crate::types::Post;

/// First rule a post failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotRootLevel,
    AlreadyReposted,
    Language(Option<String>),
    TooNew,
    TooOld,
    TooPopular { likes: u64 },
    LowEngagement { score: u64 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotRootLevel => write!(f, "reply or repost"),
            Rejection::AlreadyReposted => write!(f, "already reposted"),
            Rejection::Language(Some(lang)) => write!(f, "language {}", lang),
            Rejection::Language(None) => write!(f, "language unknown"),
            Rejection::TooNew => write!(f, "too new"),
            Rejection::TooOld => write!(f, "too old"),
            Rejection::TooPopular { likes } => write!(f, "too popular ({} likes)", likes),
            Rejection::LowEngagement { score } => write!(f, "low engagement (score {})", score),
        }
    }
}

pub struct PostFilter {
    config: FilterConfig,
    detector: Box<dyn LanguageDetector>,
}

impl PostFilter {
    pub fn new(config: FilterConfig, detector: Box<dyn LanguageDetector>) -> Self {
        Self { config, detector }
    }

    /// Filter with the `whatlang` detector
    pub fn with_default_detector(config: FilterConfig) -> Self {
        Self::new(config, Box::new(WhatlangDetector))
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// `likes * like_weight + reposts * repost_weight`
    pub fn score(&self, post: &Post) -> u64 {
        post.like_count
            .saturating_mul(self.config.like_weight)
            .saturating_add(post.repost_count.saturating_mul(self.config.repost_weight))
    }

    /// Older than the window; also ends timeline paging
    pub fn is_too_old(&self, post: &Post, now: DateTime<Utc>) -> bool {
        post.age(now) > self.config.max_age
    }

    pub fn is_in_age_window(&self, post: &Post, now: DateTime<Utc>) -> bool {
        let age = post.age(now);
        age > self.config.min_age && age < self.config.max_age
    }

    fn language_accepted(&self, text: &str) -> std::result::Result<(), Option<String>> {
        if text.is_empty() {
            return Err(None);
        }
        match self.detector.detect(text) {
            Some(lang) if self.config.languages.iter().any(|l| l.eq_ignore_ascii_case(&lang)) => {
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Check every rule, reporting the first that fails
    pub fn evaluate(
        &self,
        post: &Post,
        now: DateTime<Utc>,
        reposted: &TrackedSet,
    ) -> std::result::Result<(), Rejection> {
        if !post.is_root_level() {
            return Err(Rejection::NotRootLevel);
        }
        if reposted.contains(&post.cid) {
            return Err(Rejection::AlreadyReposted);
        }
        self.language_accepted(&post.text)
            .map_err(Rejection::Language)?;

        let age = post.age(now);
        if age <= self.config.min_age {
            return Err(Rejection::TooNew);
        }
        if age >= self.config.max_age {
            return Err(Rejection::TooOld);
        }
        if post.like_count > self.config.like_max {
            return Err(Rejection::TooPopular {
                likes: post.like_count,
            });
        }
        let score = self.score(post);
        if score < self.config.like_min {
            return Err(Rejection::LowEngagement { score });
        }
        Ok(())
    }

    pub fn meets_criteria(&self, post: &Post, now: DateTime<Utc>, reposted: &TrackedSet) -> bool {
        self.evaluate(post, now, reposted).is_ok()
    }
}
