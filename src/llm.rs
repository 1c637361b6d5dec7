//! Prompts for the generated parts of a video: intro, outro, title,
//! description and thumbnail keywords.

use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::openai::OpenAiClient;
use crate::reddit::Post;

/// Tags too generic to pick a thumbnail person by.
pub const GENERIC_TAGS: [&str; 6] = ["human", "person", "happy", "content", "man", "woman"];

pub struct Writer<'a> {
    client: &'a OpenAiClient,
    config: &'a Config,
}

impl<'a> Writer<'a> {
    pub fn new(client: &'a OpenAiClient, config: &'a Config) -> Self {
        Self { client, config }
    }

    fn post_context(post: &Post) -> String {
        format!("{}\n{}", post.title, post.selftext)
    }

    pub async fn intro(&self, post: &Post) -> Result<String> {
        self.client
            .chat(&self.config.intro_prompt, &Self::post_context(post))
            .await
    }

    pub async fn outro(&self, post: &Post) -> Result<String> {
        self.client
            .chat(&self.config.outro_prompt, &Self::post_context(post))
            .await
    }

    pub async fn video_title(&self, post: &Post) -> Result<String> {
        self.client
            .chat(&self.config.video_title_prompt, &Self::post_context(post))
            .await
    }

    pub async fn description(&self, post: &Post, background_credit: &str) -> Result<String> {
        let text = self
            .client
            .chat(&self.config.description_prompt, &Self::post_context(post))
            .await?;
        Ok(describe(&text, post, background_credit))
    }

    /// Asks for `attempts` keyword pairs drawn from `categories`.
    pub async fn categorize(
        &self,
        post: &Post,
        categories: &[String],
        attempts: usize,
    ) -> Result<Vec<Vec<String>>> {
        let prompt = if self.config.categorize_prompt.is_empty() {
            format!(
                "Categorize this reddit post into these categories: {}\n\
                 Do not use any other categories.\n\
                 Generate {} answers, one per line.\n\
                 Select 2 categories per answer and dont repeat the same answer.",
                categories.join(", "),
                attempts
            )
        } else {
            self.config
                .categorize_prompt
                .replace("{categories}", &categories.join(", "))
                .replace("{attempts}", &attempts.to_string())
        };
        let content = format!("{}\n{}\n{}", post.subreddit, post.title, post.selftext);
        let response = self.client.chat(&prompt, &content).await?;
        debug!("Categorization response: {}", response);
        let keyword_sets = parse_keyword_sets(&response, categories);
        info!("Got {} keyword sets", keyword_sets.len());
        Ok(keyword_sets)
    }
}

/// Description body plus the source and footage credits.
pub fn describe(generated: &str, post: &Post, background_credit: &str) -> String {
    format!(
        "{}\n\nStory from r/{} by u/{}\nBackground footage: {}",
        generated.trim(),
        post.subreddit,
        post.author,
        background_credit
    )
}

/// The part of a generated title before the first `|`.
pub fn thumbnail_title(video_title: &str) -> &str {
    video_title.split('|').next().unwrap_or(video_title).trim()
}

/// One keyword set per line, comma separated, restricted to known categories.
pub fn parse_keyword_sets(response: &str, categories: &[String]) -> Vec<Vec<String>> {
    let mut sets: Vec<Vec<String>> = Vec::new();
    for line in response.lines() {
        let line = line
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == ')')
            .trim();
        let set: Vec<String> = line
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| categories.iter().any(|c| c == k))
            .collect();
        if !set.is_empty() && !sets.contains(&set) {
            sets.push(set);
        }
    }
    sets
}

pub fn usable_categories(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .filter(|t| !GENERIC_TAGS.contains(&t.as_str()))
        .collect()
}
