//! Picking a usable post: dedup, update-post filtering and narration length.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::comments::CommentId;
use crate::error::{Error, Result};
use crate::history::PostedIds;
use crate::reddit::{Listing, Post, RedditClient, Timeframe};
use crate::retry;

/// Empirical narration speed of the TTS voice.
pub const CHARS_PER_SECOND: f64 = (10000.0 / 10.5) / 60.0;
pub const MAX_POST_ATTEMPTS: usize = 50;
pub const DEFAULT_COMMENT_CHAR_BUDGET: usize = 5000;

const UPDATE_MARKERS: [&str; 3] = ["update:", "(update)", "[update]"];

/// Accepted narration length, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct DurationBounds {
    pub approx: Option<f64>,
    /// Fraction of `approx` the estimate may deviate by.
    pub tolerance: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub chars_per_second: f64,
}

impl Default for DurationBounds {
    fn default() -> Self {
        Self {
            approx: None,
            tolerance: 0.0,
            min: None,
            max: None,
            chars_per_second: CHARS_PER_SECOND,
        }
    }
}

impl DurationBounds {
    pub fn estimated_seconds(&self, text: &str) -> f64 {
        text.len() as f64 / self.chars_per_second
    }

    pub fn accepts(&self, seconds: f64) -> bool {
        if let Some(target) = self.approx {
            let lower = target - target * self.tolerance;
            let upper = target + target * self.tolerance;
            if seconds < lower || seconds > upper {
                return false;
            }
        }
        if self.min.is_some_and(|min| seconds < min) {
            return false;
        }
        if self.max.is_some_and(|max| seconds > max) {
            return false;
        }
        true
    }

    pub fn accepts_text(&self, text: &str) -> bool {
        self.accepts(self.estimated_seconds(text))
    }

    /// Character budget for comment selection when a target is set.
    pub fn char_budget(&self) -> Option<usize> {
        self.approx
            .map(|target| (target * self.chars_per_second) as usize)
    }
}

pub fn is_update_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.starts_with("update") || UPDATE_MARKERS.iter().any(|m| lower.contains(m))
}

pub struct PostFilter<'a> {
    pub posted: &'a PostedIds,
    pub bounds: DurationBounds,
    pub allow_nsfw: bool,
}

impl PostFilter<'_> {
    /// Checks that do not depend on the narration text.
    pub fn is_candidate(&self, post: &Post) -> bool {
        if self.posted.contains(&post.id) {
            info!("Post {} has already been posted", post.id);
            return false;
        }
        if is_update_title(&post.title) {
            info!("Post {} is an update", post.id);
            return false;
        }
        if post.nsfw && !self.allow_nsfw {
            info!("Post {} is NSFW", post.id);
            return false;
        }
        true
    }

    pub fn is_valid(&self, post: &Post, narration: &str) -> bool {
        if !self.is_candidate(post) {
            return false;
        }
        if narration.trim().is_empty() {
            info!("Post {} has no narration text", post.id);
            return false;
        }
        let seconds = self.bounds.estimated_seconds(narration);
        if !self.bounds.accepts(seconds) {
            info!(
                "Post {} narration of ~{:.0}s is outside the requested duration",
                post.id, seconds
            );
            return false;
        }
        info!("Post {} is valid (~{:.0}s)", post.id, seconds);
        true
    }
}

pub struct PostQuery<'a> {
    pub subreddits: &'a [String],
    pub listing: Listing,
    pub timeframe: Timeframe,
}

/// Random subreddit, random post, until one passes `filter`. The length
/// check covers the title too when it is narrated, i.e. without an intro.
pub async fn find_story_post<R: Rng>(
    client: &RedditClient,
    query: &PostQuery<'_>,
    filter: &PostFilter<'_>,
    with_intro: bool,
    rng: &mut R,
) -> Result<Post> {
    let found = retry::bounded_async(
        "post search",
        MAX_POST_ATTEMPTS,
        move |_| {
            let subreddit = query.subreddits.choose(&mut *rng).cloned();
            let pick: usize = rng.r#gen();
            async move {
                let Some(subreddit) = subreddit else {
                    return Err(Error::Config("no subreddits configured".to_string()));
                };
                let mut posts = client
                    .fetch_listing(&subreddit, query.listing, query.timeframe)
                    .await?;
                if posts.is_empty() {
                    return Ok(None);
                }
                let index = pick % posts.len();
                Ok(Some(posts.swap_remove(index)))
            }
        },
        |post: &Post| filter.is_valid(post, &post.narration(with_intro)),
    )
    .await;
    no_valid_post(found)
}

/// Like [`find_story_post`], but validity is judged on the post's best
/// comments. Returns the post with the selected comment ids.
pub async fn find_comment_post<R: Rng>(
    client: &RedditClient,
    query: &PostQuery<'_>,
    filter: &PostFilter<'_>,
    score_threshold: i64,
    rng: &mut R,
) -> Result<(Post, Vec<CommentId>)> {
    let budget = filter
        .bounds
        .char_budget()
        .unwrap_or(DEFAULT_COMMENT_CHAR_BUDGET);
    let found = retry::bounded_async(
        "comment post search",
        MAX_POST_ATTEMPTS,
        move |_| {
            let subreddit = query.subreddits.choose(&mut *rng).cloned();
            let pick: usize = rng.r#gen();
            async move {
                let Some(subreddit) = subreddit else {
                    return Err(Error::Config("no subreddits configured".to_string()));
                };
                let mut posts = client
                    .fetch_listing(&subreddit, query.listing, query.timeframe)
                    .await?;
                if posts.is_empty() {
                    return Ok(None);
                }
                let index = pick % posts.len();
                let mut post = posts.swap_remove(index);
                if !filter.is_candidate(&post) {
                    return Ok(None);
                }
                client.load_comments(&mut post, "top").await?;
                let selected = post.comments.select(score_threshold, Some(budget));
                debug!("Selected {} comments of post {}", selected.len(), post.id);
                Ok(Some((post, selected)))
            }
        },
        |(post, selected): &(Post, Vec<CommentId>)| {
            !selected.is_empty() && filter.is_valid(post, &post.joined_bodies(selected))
        },
    )
    .await;
    no_valid_post(found)
}

fn no_valid_post<T>(found: Result<T>) -> Result<T> {
    found.map_err(|e| match e {
        Error::ResourceExhausted { attempts, .. } => {
            Error::NotFound(format!("no valid post found in {attempts} attempts"))
        }
        other => other,
    })
}
