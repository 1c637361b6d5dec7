use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::{PostSource, RunOptions, VideoKind};
use crate::reddit::{Listing, Timeframe};
use crate::selection::DurationBounds;

#[derive(Parser, Debug)]
#[clap(name = "storyreel", about = "Turns reddit posts into narrated short videos")]
pub struct Args {
    /// Directory holding configuration.json, secrets.json and the post lists.
    #[clap(long, default_value = "config", global = true)]
    pub config_dir: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Narrate the self-text of a searched post.
    Story(SearchArgs),
    /// Show the best comment chains of a searched post.
    Comments(SearchArgs),
    /// Render a specific post by id.
    Post {
        id: String,

        /// Show comments instead of narrating the self-text.
        #[clap(long)]
        comments: bool,

        #[clap(flatten)]
        video: VideoArgs,
    },
    /// Tag a thumbnail image, or list its tags when none are given.
    Tag { filename: String, tags: Vec<String> },
}

#[derive(ClapArgs, Debug)]
pub struct SearchArgs {
    #[clap(long, value_enum, default_value = "top")]
    pub listing: Listing,

    #[clap(long, value_enum, default_value = "month")]
    pub timeframe: Timeframe,

    /// Approximate narration length in seconds.
    #[clap(long)]
    pub target_seconds: Option<f64>,

    #[clap(long)]
    pub min_seconds: Option<f64>,

    #[clap(long)]
    pub max_seconds: Option<f64>,

    #[clap(flatten)]
    pub video: VideoArgs,
}

#[derive(ClapArgs, Debug)]
pub struct VideoArgs {
    /// Output size as WIDTHxHEIGHT.
    #[clap(long, default_value = "1080x1920", value_parser = parse_resolution)]
    pub resolution: (u32, u32),

    #[clap(long, default_value = "english")]
    pub language: String,

    #[clap(long)]
    pub no_intro: bool,

    #[clap(long)]
    pub no_outro: bool,

    #[clap(long)]
    pub no_thumbnails: bool,

    #[clap(long)]
    pub keep_temp: bool,

    /// Seed for post, chunk and background choices.
    #[clap(long)]
    pub seed: Option<u64>,
}

pub fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid dimension {v:?}"))
    };
    Ok((parse(w)?, parse(h)?))
}

impl VideoArgs {
    fn options(&self, kind: VideoKind, source: PostSource, bounds: DurationBounds) -> RunOptions {
        RunOptions {
            kind,
            source,
            bounds,
            resolution: self.resolution,
            language: self.language.clone(),
            intro: !self.no_intro,
            outro: !self.no_outro,
            thumbnails: !self.no_thumbnails,
            keep_temp: self.keep_temp,
            seed: self.seed,
        }
    }
}

impl SearchArgs {
    pub fn run_options(&self, kind: VideoKind, tolerance: f64) -> RunOptions {
        let bounds = DurationBounds {
            approx: self.target_seconds,
            tolerance,
            min: self.min_seconds,
            max: self.max_seconds,
            ..DurationBounds::default()
        };
        let source = PostSource::Search {
            listing: self.listing,
            timeframe: self.timeframe,
        };
        self.video.options(kind, source, bounds)
    }
}

impl Command {
    /// Options for the video commands; `None` for `tag`.
    pub fn run_options(&self, tolerance: f64) -> Option<RunOptions> {
        match self {
            Command::Story(search) => Some(search.run_options(VideoKind::Story, tolerance)),
            Command::Comments(search) => Some(search.run_options(VideoKind::Comments, tolerance)),
            Command::Post { id, comments, video } => {
                let kind = if *comments {
                    VideoKind::Comments
                } else {
                    VideoKind::Story
                };
                Some(video.options(kind, PostSource::Id(id.clone()), DurationBounds::default()))
            }
            Command::Tag { .. } => None,
        }
    }
}
