use clap::ValueEnum;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::comments::{Comment, CommentForest, CommentId};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::text::TextCleaner;

const REMOVED_BODIES: [&str; 2] = ["[deleted]", "[removed]"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Listing {
    Controversial,
    Best,
    Hot,
    New,
    Random,
    Rising,
    Top,
}

impl Listing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Listing::Controversial => "controversial",
            Listing::Best => "best",
            Listing::Hot => "hot",
            Listing::New => "new",
            Listing::Random => "random",
            Listing::Rising => "rising",
            Listing::Top => "top",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
            Timeframe::All => "all",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RedditListing<T> {
    pub data: RedditListingData<T>,
}

#[derive(Debug, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct RedditChild {
    pub data: RedditPost,
}

#[derive(Debug, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub ups: i64,
    #[serde(default)]
    pub downs: i64,
    #[serde(default)]
    pub gilded: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub url: String,
    pub over_18: Option<bool>,
}

/// A comment-listing child; `kind` is `t1` for comments and `more` for
/// collapsed placeholders.
#[derive(Debug, Deserialize)]
pub struct RedditThing {
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct RedditComment {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub gilded: i64,
    #[serde(default)]
    pub replies: Replies,
}

/// Reddit sends an empty string instead of a listing when there are no replies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Replies {
    Listing(RedditListing<RedditThing>),
    Empty(String),
}

impl Default for Replies {
    fn default() -> Self {
        Replies::Empty(String::new())
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    pub author: String,
    /// Cleaned self-text.
    pub selftext: String,
    pub score: i64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub gilded: i64,
    pub num_comments: i64,
    pub url: String,
    pub nsfw: bool,
    pub comments: CommentForest,
}

impl Post {
    pub fn from_raw(raw: RedditPost, cleaner: &TextCleaner) -> Self {
        Self {
            selftext: cleaner.clean(&raw.selftext),
            id: raw.id,
            subreddit: raw.subreddit,
            title: cleaner.clean_title(&raw.title),
            author: raw.author,
            score: raw.score,
            upvotes: raw.ups,
            downvotes: raw.downs,
            gilded: raw.gilded,
            num_comments: raw.num_comments,
            url: raw.url,
            nsfw: raw.over_18.unwrap_or(false),
            comments: CommentForest::new(),
        }
    }

    /// Story narration. Without an intro card the title is read first.
    pub fn narration(&self, with_intro: bool) -> String {
        if with_intro || self.title.is_empty() {
            self.selftext.clone()
        } else {
            let separator = if self.title.ends_with(['.', '?', '!']) { " " } else { ". " };
            format!("{}{}{}", self.title, separator, self.selftext)
        }
    }

    /// Bodies of `ids` joined into one narration string.
    pub fn joined_bodies(&self, ids: &[CommentId]) -> String {
        ids.iter()
            .map(|&id| self.comments.get(id).body.as_str())
            .filter(|body| !body.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created the post: \"{}\" which has {} score",
            self.author, self.title, self.score
        )
    }
}

/// Read-only client for the public Reddit JSON endpoints.
pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
    cleaner: TextCleaner,
}

impl RedditClient {
    pub fn new(config: &Config, cleaner: TextCleaner) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.reddit_base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            cleaner,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let res = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        serde_json::from_str(&res).map_err(|e| Error::service("reddit", format!("{url}: {e}")))
    }

    pub async fn fetch_listing(
        &self,
        subreddit: &str,
        listing: Listing,
        timeframe: Timeframe,
    ) -> Result<Vec<Post>> {
        info!(
            "Fetching {} posts of {} from r/{}",
            listing.as_str(),
            timeframe.as_str(),
            subreddit
        );
        let url = format!(
            "{}/r/{}/{}.json?t={}",
            self.base_url,
            subreddit,
            listing.as_str(),
            timeframe.as_str()
        );
        let parsed: RedditListing<RedditChild> = self.get_json(&url).await?;
        Ok(parsed
            .data
            .children
            .into_iter()
            .map(|child| Post::from_raw(child.data, &self.cleaner))
            .collect())
    }

    /// Fetches a single post together with its comment tree.
    pub async fn fetch_post(&self, post_id: &str, sort: &str) -> Result<Post> {
        let url = format!("{}/comments/{}.json?sort={}", self.base_url, post_id, sort);
        let (post_listing, comments) = self.get_post_and_comments(&url).await?;
        let raw = post_listing
            .data
            .children
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("post {post_id}")))?;
        let mut post = Post::from_raw(raw.data, &self.cleaner);
        post.comments = self.build_forest(comments);
        info!("Loaded post {} with {} comments", post.id, post.comments.len());
        Ok(post)
    }

    /// Replaces the post's comment tree with a freshly fetched one.
    pub async fn load_comments(&self, post: &mut Post, sort: &str) -> Result<()> {
        info!("Loading comments of post {}", post.id);
        let url = format!("{}/comments/{}.json?sort={}", self.base_url, post.id, sort);
        let (_, comments) = self.get_post_and_comments(&url).await?;
        post.comments = self.build_forest(comments);
        Ok(())
    }

    async fn get_post_and_comments(
        &self,
        url: &str,
    ) -> Result<(RedditListing<RedditChild>, RedditListing<RedditThing>)> {
        let (post, comments): (RedditListing<RedditChild>, RedditListing<RedditThing>) =
            self.get_json(url).await?;
        Ok((post, comments))
    }

    fn build_forest(&self, listing: RedditListing<RedditThing>) -> CommentForest {
        let mut forest = CommentForest::new();
        let mut pending: Vec<(Option<CommentId>, RedditThing)> = listing
            .data
            .children
            .into_iter()
            .rev()
            .map(|thing| (None, thing))
            .collect();

        while let Some((parent, thing)) = pending.pop() {
            if thing.kind != "t1" {
                continue;
            }
            let raw: RedditComment = match serde_json::from_value(thing.data) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unparseable comment: {}", e);
                    continue;
                }
            };
            // Removed comments stay in the tree so their replies still count.
            let body = if REMOVED_BODIES.contains(&raw.body.trim()) {
                String::new()
            } else {
                self.cleaner.clean(&raw.body)
            };
            let comment = Comment {
                id: raw.id,
                author: raw.author,
                body,
                score: raw.score,
                gilded: raw.gilded,
                replies: Vec::new(),
            };
            let id = forest.push(parent, comment);
            if let Replies::Listing(replies) = raw.replies {
                for reply in replies.data.children.into_iter().rev() {
                    pending.push((Some(id), reply));
                }
            }
        }
        forest
    }
}
