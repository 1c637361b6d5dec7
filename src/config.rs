//! Process-wide configuration.
//!
//! Everything is read once at start-up from the config directory and then
//! handed to the pipeline stages by reference.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "configuration.json";
pub const SECRETS_FILE: &str = "secrets.json";
pub const THREADS_FILE: &str = "reddit_threads.json";
pub const REPLACEMENTS_FILE: &str = "replace_in_text.txt";
pub const POSTED_FILE: &str = "already_posted.txt";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub background_videos_dir: PathBuf,
    /// Fraction of the target duration a post may deviate by.
    pub tolerated_duration_offset: f64,
    pub comment_score_threshold: i64,
    pub allow_nsfw: bool,

    pub intro_header: String,
    pub intro_prompt: String,
    pub outro_prompt: String,
    pub video_title_prompt: String,
    pub description_prompt: String,
    pub categorize_prompt: String,

    pub background_video_volume: f64,

    pub thumbnail_image_dir: PathBuf,
    pub tag_database: PathBuf,
    pub thumbnail_resolution: (u32, u32),
    pub thumbnail_text_width_percent: f64,
    pub thumbnail_allowed_overlap: f64,
    pub thumbnail_person_aspect_ratio_min: f64,
    pub thumbnail_person_aspect_ratio_max: f64,
    pub thumbnail_margin: u32,
    pub thumbnail_count: usize,
    pub thumbnail_keyword_attempts: usize,
    pub thumbnail_min_tag_usage: usize,
    pub thumbnail_subreddit_icon: Option<PathBuf>,
    pub thumbnail_upvote_icon: Option<PathBuf>,
    pub thumbnail_comment_icon: Option<PathBuf>,

    pub text_clips_font: String,
    pub text_clips_font_color: String,
    pub text_clips_font_size: u32,
    pub text_clips_font_stroke_width: u32,
    pub text_clips_font_stroke_color: String,

    pub text_wall_font: String,
    pub text_wall_font_color: String,
    pub text_wall_font_size: u32,
    pub text_wall_font_stroke_width: u32,
    pub text_wall_font_stroke_color: String,

    pub video_fps: u32,
    pub write_video_preset: String,
    pub num_threads: u32,

    pub audio_model: String,
    pub audio_voice: String,
    pub chat_model: String,
    pub openai_base_url: String,
    pub reddit_base_url: String,
    pub user_agent: String,

    #[serde(skip)]
    pub openai_api_key: String,
    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            temp_dir: PathBuf::from("tmp"),
            background_videos_dir: PathBuf::from("background_videos"),
            tolerated_duration_offset: 0.2,
            comment_score_threshold: 100,
            allow_nsfw: false,
            intro_header: "Reddit asks:".to_string(),
            intro_prompt: "Write a single spoken sentence that introduces this reddit post."
                .to_string(),
            outro_prompt: "Write a short spoken outro asking viewers what they think.".to_string(),
            video_title_prompt: "Write a catchy video title for this reddit post in the form \
                                 '<title> | <hook>'."
                .to_string(),
            description_prompt: "Write a two sentence video description for this reddit post."
                .to_string(),
            categorize_prompt: String::new(),
            background_video_volume: 0.1,
            thumbnail_image_dir: PathBuf::from("thumbnail_images"),
            tag_database: PathBuf::from("database.db"),
            thumbnail_resolution: (1920, 1080),
            thumbnail_text_width_percent: 0.55,
            thumbnail_allowed_overlap: 0.05,
            thumbnail_person_aspect_ratio_min: 0.5,
            thumbnail_person_aspect_ratio_max: 0.5,
            thumbnail_margin: 25,
            thumbnail_count: 5,
            thumbnail_keyword_attempts: 10,
            thumbnail_min_tag_usage: 10,
            thumbnail_subreddit_icon: None,
            thumbnail_upvote_icon: None,
            thumbnail_comment_icon: None,
            text_clips_font: "Arial Black".to_string(),
            text_clips_font_color: "white".to_string(),
            text_clips_font_size: 70,
            text_clips_font_stroke_width: 5,
            text_clips_font_stroke_color: "black".to_string(),
            text_wall_font: "Arial".to_string(),
            text_wall_font_color: "white".to_string(),
            text_wall_font_size: 50,
            text_wall_font_stroke_width: 3,
            text_wall_font_stroke_color: "black".to_string(),
            video_fps: 25,
            write_video_preset: "veryfast".to_string(),
            num_threads: 8,
            audio_model: "tts-1".to_string(),
            audio_voice: "onyx".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            reddit_base_url: "https://www.reddit.com".to_string(),
            user_agent: "storyreel/0.1".to_string(),
            openai_api_key: String::new(),
            config_dir: PathBuf::from("config"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Secrets {
    openai_api_key: String,
}

/// Font parameters for one family of on-screen text.
#[derive(Debug, Clone, PartialEq)]
pub struct FontStyle {
    pub font: String,
    pub color: String,
    pub size: u32,
    pub stroke_width: u32,
    pub stroke_color: String,
}

impl Config {
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        let mut config: Config = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str(&data)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            info!("No {} found; using defaults", path.display());
            Config::default()
        };
        config.config_dir = config_dir.to_path_buf();
        config.openai_api_key = load_api_key(config_dir)?;
        debug!("Loaded configuration: {:?}", config.redacted());
        Ok(config)
    }

    /// Subreddit lists keyed by video type (`story_based`, `comment_based`).
    pub fn reddit_threads(&self) -> Result<HashMap<String, Vec<String>>> {
        let path = self.config_dir.join(THREADS_FILE);
        if !path.exists() {
            return Err(Error::MissingFile(path));
        }
        let data = fs::read_to_string(&path)?;
        serde_json::from_str(&data).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn replacements_path(&self) -> PathBuf {
        self.config_dir.join(REPLACEMENTS_FILE)
    }

    pub fn posted_path(&self) -> PathBuf {
        self.config_dir.join(POSTED_FILE)
    }

    pub fn caption_style(&self) -> FontStyle {
        FontStyle {
            font: self.text_clips_font.clone(),
            color: self.text_clips_font_color.clone(),
            size: self.text_clips_font_size,
            stroke_width: self.text_clips_font_stroke_width,
            stroke_color: self.text_clips_font_stroke_color.clone(),
        }
    }

    pub fn text_wall_style(&self) -> FontStyle {
        FontStyle {
            font: self.text_wall_font.clone(),
            color: self.text_wall_font_color.clone(),
            size: self.text_wall_font_size,
            stroke_width: self.text_wall_font_stroke_width,
            stroke_color: self.text_wall_font_stroke_color.clone(),
        }
    }

    fn redacted(&self) -> Config {
        let mut copy = self.clone();
        if !copy.openai_api_key.is_empty() {
            copy.openai_api_key = "***".to_string();
        }
        copy
    }
}

fn load_api_key(config_dir: &Path) -> Result<String> {
    let path = config_dir.join(SECRETS_FILE);
    if path.exists() {
        let data = fs::read_to_string(&path)?;
        let secrets: Secrets = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        return Ok(secrets.openai_api_key);
    }
    std::env::var("OPENAI_API_KEY").map_err(|_| {
        Error::Config(format!(
            "no {} and OPENAI_API_KEY is not set",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"output_dir": "/videos", "text_clips_font_size": 64, "thumbnail_resolution": [1280, 720]}"#,
        )
        .unwrap();
        fs::write(dir.path().join(SECRETS_FILE), r#"{"openai_api_key": "sk-test"}"#).unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/videos"));
        assert_eq!(config.caption_style().size, 64);
        assert_eq!(config.thumbnail_resolution, (1280, 720));
        assert_eq!(config.tolerated_duration_offset, 0.2);
        assert_eq!(config.openai_api_key, "sk-test");
        assert_eq!(config.posted_path(), dir.path().join(POSTED_FILE));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        fs::write(dir.path().join(SECRETS_FILE), r#"{"openai_api_key": "k"}"#).unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn reddit_threads_by_video_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(THREADS_FILE),
            r#"{"story_based": ["AITAH", "tifu"], "comment_based": ["AskReddit"]}"#,
        )
        .unwrap();
        let config = Config {
            config_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let threads = config.reddit_threads().unwrap();
        assert_eq!(threads["story_based"], vec!["AITAH", "tifu"]);
    }
}
