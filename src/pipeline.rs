//! One video from post selection to written output directory.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::align::{Aligner, MfaAligner};
use crate::background;
use crate::captions::segment_random;
use crate::comments::CommentId;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::PostedIds;
use crate::llm::{Writer, thumbnail_title, usable_categories};
use crate::media;
use crate::openai::OpenAiClient;
use crate::reddit::{Listing, Post, RedditClient, Timeframe};
use crate::render::{RenderSettings, Section, assemble_sections, render_video, text_wall_parts};
use crate::selection::{
    DEFAULT_COMMENT_CHAR_BUDGET, DurationBounds, PostFilter, PostQuery, find_comment_post,
    find_story_post,
};
use crate::subtitle::{Cue, write_ass, write_srt};
use crate::tagdb::TagDb;
use crate::text::TextCleaner;
use crate::thumbnail::Thumbnailer;
use crate::tts::synthesize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoKind {
    /// Narrated self-text with word-timed captions.
    Story,
    /// Top comment chains shown as text walls.
    Comments,
}

impl VideoKind {
    /// Key of this kind's subreddit list in `reddit_threads.json`.
    pub fn threads_key(&self) -> &'static str {
        match self {
            VideoKind::Story => "story_based",
            VideoKind::Comments => "comment_based",
        }
    }
}

#[derive(Debug, Clone)]
pub enum PostSource {
    Search { listing: Listing, timeframe: Timeframe },
    Id(String),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub kind: VideoKind,
    pub source: PostSource,
    pub bounds: DurationBounds,
    pub resolution: (u32, u32),
    pub language: String,
    pub intro: bool,
    pub outro: bool,
    pub thumbnails: bool,
    pub keep_temp: bool,
    pub seed: Option<u64>,
}

pub fn thumbnail_file_name(index: usize, keywords: &[String]) -> String {
    if keywords.is_empty() {
        format!("thumbnail-{index}.jpg")
    } else {
        format!("thumbnail-{index}-{}.jpg", keywords.join("_"))
    }
}

struct Run<'a> {
    config: &'a Config,
    options: &'a RunOptions,
    reddit: RedditClient,
    openai: OpenAiClient,
}

/// Produces one video and returns its output directory.
pub async fn run(config: &Config, options: &RunOptions) -> Result<PathBuf> {
    let cleaner = TextCleaner::load(&config.replacements_path())?;
    let run = Run {
        config,
        options,
        reddit: RedditClient::new(config, cleaner),
        openai: OpenAiClient::new(config),
    };
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    run.execute(&mut rng).await
}

impl Run<'_> {
    async fn execute(&self, rng: &mut StdRng) -> Result<PathBuf> {
        let mut posted = PostedIds::load(&self.config.posted_path())?;
        info!("{} posts were already turned into videos", posted.len());
        let (post, selected) = self.select_post(&posted, &mut *rng).await?;
        info!("{}", post);
        posted.mark(&post.id)?;

        let work_dir = self.config.temp_dir.join(&post.id);
        let out_dir = self.config.output_dir.join(&post.id);
        fs::create_dir_all(&work_dir)?;
        fs::create_dir_all(&out_dir)?;

        let writer = Writer::new(&self.openai, self.config);
        let mut sections = Vec::new();
        if self.options.intro {
            let text = writer.intro(&post).await?;
            let audio = synthesize(&self.openai, &text, &work_dir, "intro").await?;
            let card = format!("{}\n{}", self.config.intro_header, post.title);
            sections.push(Section::card(audio, card, None));
        }
        match self.options.kind {
            VideoKind::Story => {
                let aligner =
                    MfaAligner::for_language(&self.options.language, &work_dir.join("alignment"))?;
                sections.push(self.story_section(&post, &aligner, &work_dir, &mut *rng).await?);
            }
            VideoKind::Comments => {
                sections.extend(self.comment_sections(&post, &selected, &work_dir).await?);
            }
        }
        if self.options.outro {
            let text = writer.outro(&post).await?;
            let audio = synthesize(&self.openai, &text, &work_dir, "outro").await?;
            sections.push(Section::blank(audio));
        }

        let assembled = assemble_sections(&sections, &work_dir, &work_dir.join("narration.wav"))?;
        let style = match self.options.kind {
            VideoKind::Story => self.config.caption_style(),
            VideoKind::Comments => self.config.text_wall_style(),
        };
        let ass = work_dir.join("captions.ass");
        write_ass(&ass, &assembled.cues, &style, self.options.resolution)?;
        write_srt(&out_dir.join("captions.srt"), &assembled.cues)?;

        let clip = background::select(
            background::collect_videos(&self.config.background_videos_dir),
            assembled.duration,
            &mut *rng,
            |path| media::probe(path).map(|info| info.duration),
        )?;
        let has_audio = media::probe(&clip.path)?.has_audio;
        render_video(
            &RenderSettings::from_config(self.config, self.options.resolution),
            &clip,
            has_audio,
            &assembled.audio,
            &ass,
            &out_dir.join("video.mp4"),
        )?;

        let title = writer.video_title(&post).await?;
        fs::write(out_dir.join("title.txt"), &title)?;
        let description = writer.description(&post, &clip.credit).await?;
        fs::write(out_dir.join("description.txt"), description)?;

        if self.options.thumbnails {
            let written = self
                .thumbnails(&writer, &post, &clip, &title, &work_dir, &out_dir, &mut *rng)
                .await;
            info!("{} thumbnails written", written);
        }

        if self.options.keep_temp {
            info!("Keeping temporary files in {}", work_dir.display());
        } else {
            fs::remove_dir_all(&work_dir)?;
        }
        info!("Process complete. Output in {}", out_dir.display());
        Ok(out_dir)
    }

    async fn select_post(
        &self,
        posted: &PostedIds,
        rng: &mut StdRng,
    ) -> Result<(Post, Vec<CommentId>)> {
        let config = self.config;
        let options = self.options;
        let budget = options.bounds.char_budget().unwrap_or(DEFAULT_COMMENT_CHAR_BUDGET);
        match &options.source {
            PostSource::Id(id) => {
                let post = self.reddit.fetch_post(id, "top").await?;
                if posted.contains(&post.id) {
                    warn!("Post {} was already posted; rendering it anyway", post.id);
                }
                let selected = match options.kind {
                    VideoKind::Story => Vec::new(),
                    VideoKind::Comments => post
                        .comments
                        .select(config.comment_score_threshold, Some(budget)),
                };
                Ok((post, selected))
            }
            PostSource::Search { listing, timeframe } => {
                let threads = config.reddit_threads()?;
                let key = options.kind.threads_key();
                let subreddits = threads
                    .get(key)
                    .ok_or_else(|| Error::Config(format!("no {key} subreddits configured")))?;
                let query = PostQuery {
                    subreddits,
                    listing: *listing,
                    timeframe: *timeframe,
                };
                let filter = PostFilter {
                    posted,
                    bounds: options.bounds,
                    allow_nsfw: config.allow_nsfw,
                };
                match options.kind {
                    VideoKind::Story => {
                        let post =
                            find_story_post(&self.reddit, &query, &filter, options.intro, rng)
                                .await?;
                        Ok((post, Vec::new()))
                    }
                    VideoKind::Comments => {
                        find_comment_post(
                            &self.reddit,
                            &query,
                            &filter,
                            config.comment_score_threshold,
                            rng,
                        )
                        .await
                    }
                }
            }
        }
    }

    async fn story_section(
        &self,
        post: &Post,
        aligner: &dyn Aligner,
        work_dir: &Path,
        rng: &mut StdRng,
    ) -> Result<Section> {
        let narration = post.narration(self.options.intro);
        let audio = synthesize(&self.openai, &narration, work_dir, "story").await?;
        let trace = aligner.align(&audio, &narration)?;
        let segments = segment_random(&narration, &trace, rng)?;
        info!("Story split into {} captions", segments.len());
        let cues = segments.iter().map(Cue::from).collect();
        Ok(Section::timed(audio, cues))
    }

    async fn comment_sections(
        &self,
        post: &Post,
        selected: &[CommentId],
        work_dir: &Path,
    ) -> Result<Vec<Section>> {
        info!("There are {} good comments", selected.len());
        let mut sections = Vec::new();
        for (i, &id) in selected.iter().enumerate() {
            let comment = post.comments.get(id);
            let parts = text_wall_parts(&comment.body);
            if parts.len() > 1 {
                info!("Splitting comment into {} parts", parts.len());
            }
            for (j, (part, font_size)) in parts.into_iter().enumerate() {
                let stem = format!("comment-{i:03}-{j:03}");
                let audio = synthesize(&self.openai, &part, work_dir, &stem).await?;
                sections.push(Section::card(audio, part, Some(font_size)));
            }
        }
        if sections.is_empty() {
            return Err(Error::NotFound(format!("comments to narrate in post {}", post.id)));
        }
        Ok(sections)
    }

    /// Renders up to `thumbnail_count` thumbnails, one per keyword set.
    /// Individual failures are logged and skipped.
    #[allow(clippy::too_many_arguments)]
    async fn thumbnails(
        &self,
        writer: &Writer<'_>,
        post: &Post,
        clip: &background::BackgroundClip,
        video_title: &str,
        work_dir: &Path,
        out_dir: &Path,
        rng: &mut StdRng,
    ) -> usize {
        let config = self.config;
        let db = match TagDb::open(&config.tag_database) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("No tag database, thumbnails will have no person: {}", e);
                None
            }
        };
        let keyword_sets = thumbnail_keywords(writer, db.as_ref(), post, config).await;

        let thumbnailer = Thumbnailer::new(config, db.as_ref(), &work_dir.join("thumbnails"));
        let title = thumbnail_title(video_title);
        let mut written = 0;
        for (attempt, keywords) in keyword_sets.iter().enumerate() {
            if written == config.thumbnail_count {
                break;
            }
            info!("Generating thumbnail {} for keywords {:?}", attempt, keywords);
            let out = out_dir.join(thumbnail_file_name(written, keywords));
            let stem = format!("thumbnail-{attempt:02}");
            match thumbnailer.render(clip, title, post, keywords, &stem, &out, &mut *rng) {
                Ok(()) => written += 1,
                Err(e) => warn!("Thumbnail generation for keywords {:?} failed: {}", keywords, e),
            }
        }
        written
    }
}

/// Keyword sets to pick thumbnail people by. Always holds at least one set,
/// an empty one when the tag database or the categorization fails.
async fn thumbnail_keywords(
    writer: &Writer<'_>,
    db: Option<&TagDb>,
    post: &Post,
    config: &Config,
) -> Vec<Vec<String>> {
    let categories = match db.map(|db| db.tags_used_at_least(config.thumbnail_min_tag_usage)) {
        Some(Ok(tags)) => usable_categories(tags),
        Some(Err(e)) => {
            warn!("Could not read thumbnail categories: {}", e);
            Vec::new()
        }
        None => Vec::new(),
    };
    let mut keyword_sets = if categories.is_empty() {
        Vec::new()
    } else {
        match writer
            .categorize(post, &categories, config.thumbnail_keyword_attempts)
            .await
        {
            Ok(sets) => sets,
            Err(e) => {
                warn!("Thumbnail categorization failed, using no keywords: {}", e);
                Vec::new()
            }
        }
    };
    if keyword_sets.is_empty() {
        keyword_sets.push(Vec::new());
    }
    keyword_sets
}
