//! Thumbnail composition: a still from the background footage, the title
//! block, subreddit and vote counts, and optionally a person cutout picked
//! from the tag database.

use rand::Rng;
use rand::seq::SliceRandom;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::background::BackgroundClip;
use crate::config::{Config, FontStyle};
use crate::error::{Error, ErrorKind, Result};
use crate::media::{filter_path, run_ffmpeg};
use crate::reddit::Post;
use crate::retry;
use crate::tagdb::TagDb;

const TITLE_FONT_SIZE: u32 = 100;
const TITLE_STROKE_WIDTH: u32 = 6;
const LABEL_FONT_SIZE: u32 = 70;
/// Times the keyword set is generalised before giving up on a person.
pub const KEYWORD_RETRIES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

/// Pixel position and size of an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Region right of the title block the person may occupy.
pub fn person_bounds(resolution: (u32, u32), text_width_percent: f64, allowed_overlap: f64) -> Rect {
    let (width, height) = (resolution.0 as f64, resolution.1 as f64);
    let overlap = (allowed_overlap * width).trunc();
    let left = text_width_percent * width - overlap;
    Rect {
        x: left,
        y: 0.0,
        width: width - left,
        height,
    }
}

/// Whether `ratio` lies strictly inside `(r - min*r, r + max*r)`.
pub fn aspect_ratio_fits(region_ratio: f64, ratio: f64, min: f64, max: f64) -> bool {
    let lower = region_ratio - min * region_ratio;
    let upper = region_ratio + max * region_ratio;
    lower < ratio && ratio < upper
}

/// Scales a cutout to the region height, centred horizontally and resting
/// on the bottom edge.
pub fn place_person(bounds: &Rect, image: (u32, u32)) -> Placement {
    let scale = bounds.height / image.1 as f64;
    let width = (image.0 as f64 * scale) as u32;
    let height = (image.1 as f64 * scale) as u32;
    let remaining = bounds.width - width as f64;
    Placement {
        x: (bounds.x as i64 + (remaining / 2.0) as i64).max(0) as u32,
        y: ((bounds.y + bounds.height) as u32).saturating_sub(height),
        width,
        height,
    }
}

/// Makes a keyword set easier to satisfy. Returns false if nothing changed.
pub fn generalize_keywords<R: Rng>(keywords: &mut Vec<String>, rng: &mut R) -> bool {
    let mut changed = false;
    for keyword in keywords.iter_mut() {
        let general = match keyword.as_str() {
            "mother" => "woman",
            "father" => "man",
            _ => continue,
        };
        *keyword = general.to_string();
        changed = true;
    }
    if !changed && keywords.len() > 1 {
        let dropped = keywords.remove(rng.gen_range(0..keywords.len()));
        info!("dropping keyword {dropped}");
        changed = true;
    }
    changed
}

/// Two title words per line.
pub fn title_lines(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| pair.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_count(count: i64) -> String {
    let abs = count.unsigned_abs() as f64;
    let sign = if count < 0 { "-" } else { "" };
    if abs >= 1_000_000.0 {
        format!("{sign}{:.1}M", abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{sign}{:.1}k", abs / 1_000.0)
    } else {
        count.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonCutout {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl PersonCutout {
    fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// First shuffled cutout carrying every keyword whose shape suits `bounds`.
pub fn find_person<R: Rng>(
    db: &TagDb,
    image_dir: &Path,
    bounds: &Rect,
    keywords: &[String],
    ratio_tolerance: (f64, f64),
    rng: &mut R,
) -> Result<PersonCutout> {
    let mut candidates = db.find_images_with_tags(keywords)?;
    if candidates.is_empty() {
        return Err(Error::NotFound(format!("thumbnail person tagged {keywords:?}")));
    }
    candidates.shuffle(rng);
    let (min, max) = ratio_tolerance;
    let region_ratio = bounds.aspect_ratio();
    let person = retry::bounded(
        &format!("thumbnail people tagged {keywords:?}"),
        candidates.len(),
        |attempt| {
            let path = image_dir.join(&candidates[attempt]);
            let (width, height) = image::image_dimensions(&path)
                .map_err(|e| Error::service("image", format!("{}: {}", path.display(), e)))?;
            Ok(Some(PersonCutout { path, width, height }))
        },
        |person| aspect_ratio_fits(region_ratio, person.aspect_ratio(), min, max),
    )?;
    info!("selected {}", person.path.display());
    Ok(person)
}

/// Everything drawn on top of the background still.
#[derive(Debug, Clone)]
pub struct ThumbnailLayout {
    pub resolution: (u32, u32),
    pub margin: u32,
    pub text_width_percent: f64,
    pub style: FontStyle,
    pub person: Option<(PathBuf, Placement)>,
    pub subreddit_icon: Option<PathBuf>,
    pub upvote_icon: Option<PathBuf>,
    pub comment_icon: Option<PathBuf>,
    pub title_file: PathBuf,
    pub subreddit_file: PathBuf,
    pub upvotes_file: PathBuf,
    pub comments_file: PathBuf,
}

impl ThumbnailLayout {
    fn icon_size(&self) -> u32 {
        self.resolution.1 / 9
    }

    fn comment_column(&self) -> u32 {
        (self.resolution.0 as f64 * self.text_width_percent / 2.0) as u32
    }

    /// Overlay images in input order (input 0 is the background still).
    pub fn overlays(&self) -> Vec<(PathBuf, Placement)> {
        let (_, height) = self.resolution;
        let icon = self.icon_size();
        let bottom = height.saturating_sub(self.margin + icon);
        let mut overlays = Vec::new();
        if let Some(person) = &self.person {
            overlays.push(person.clone());
        }
        let square = |x, y| Placement { x, y, width: icon, height: icon };
        if let Some(path) = &self.subreddit_icon {
            overlays.push((path.clone(), square(self.margin, self.margin)));
        }
        if let Some(path) = &self.upvote_icon {
            overlays.push((path.clone(), square(self.margin, bottom)));
        }
        if let Some(path) = &self.comment_icon {
            overlays.push((path.clone(), square(self.comment_column(), bottom)));
        }
        overlays
    }

    fn drawtext(&self, file: &Path, size: u32, stroke: u32, x: &str, y: &str) -> String {
        format!(
            "drawtext=textfile='{file}':font='{font}':fontsize={size}:fontcolor={color}:\
             borderw={stroke}:bordercolor={border}:line_spacing=10:x={x}:y={y}",
            file = filter_path(file),
            font = self.style.font.replace('\'', ""),
            color = ffmpeg_color(&self.style.color),
            border = ffmpeg_color(&self.style.stroke_color),
        )
    }

    pub fn filter(&self) -> String {
        let (width, height) = self.resolution;
        let icon = self.icon_size();
        let margin = self.margin;
        let mut filter = format!(
            "[0:v]scale={width}:{height}:force_original_aspect_ratio=increase,\
             crop={width}:{height}[base0]"
        );
        let overlays = self.overlays();
        for (i, (_, placement)) in overlays.iter().enumerate() {
            let input = i + 1;
            filter.push_str(&format!(
                ";[{input}:v]scale={}:{}[ov{input}];[base{i}][ov{input}]overlay={}:{}[base{input}]",
                placement.width, placement.height, placement.x, placement.y
            ));
        }

        let text_left = |with_icon: bool, column: u32| {
            if with_icon {
                (column + icon + margin).to_string()
            } else {
                column.to_string()
            }
        };
        let row_y = |top: String| format!("{top}+({icon}-text_h)/2");
        let bottom = height.saturating_sub(margin + icon);
        let stroke = self.style.stroke_width;
        let texts = [
            self.drawtext(
                &self.title_file,
                TITLE_FONT_SIZE,
                TITLE_STROKE_WIDTH,
                &margin.to_string(),
                "(h-text_h)/2",
            ),
            self.drawtext(
                &self.subreddit_file,
                LABEL_FONT_SIZE,
                stroke,
                &text_left(self.subreddit_icon.is_some(), margin),
                &row_y(margin.to_string()),
            ),
            self.drawtext(
                &self.upvotes_file,
                LABEL_FONT_SIZE,
                stroke,
                &text_left(self.upvote_icon.is_some(), margin),
                &row_y(bottom.to_string()),
            ),
            self.drawtext(
                &self.comments_file,
                LABEL_FONT_SIZE,
                stroke,
                &text_left(self.comment_icon.is_some(), self.comment_column()),
                &row_y(bottom.to_string()),
            ),
        ];
        filter.push_str(&format!(";[base{}]{}[out]", overlays.len(), texts.join(",")));
        filter
    }
}

/// ffmpeg colour syntax from a colour name or `#RRGGBB`.
fn ffmpeg_color(color: &str) -> String {
    match color.trim().strip_prefix('#') {
        Some(hex) => format!("0x{hex}"),
        None => color.trim().to_string(),
    }
}

pub fn extract_frame(video: &Path, at: f64, out: &Path) -> Result<()> {
    let at = format!("{at:.3}");
    let video = video.to_string_lossy().into_owned();
    let target = out.to_string_lossy().into_owned();
    run_ffmpeg(
        ["-ss", at.as_str(), "-i", video.as_str(), "-frames:v", "1", target.as_str()],
        "extract thumbnail frame",
    )
}

pub struct Thumbnailer<'a> {
    config: &'a Config,
    db: Option<&'a TagDb>,
    work_dir: PathBuf,
}

impl<'a> Thumbnailer<'a> {
    pub fn new(config: &'a Config, db: Option<&'a TagDb>, work_dir: &Path) -> Self {
        Self {
            config,
            db,
            work_dir: work_dir.to_path_buf(),
        }
    }

    fn bounds(&self) -> Rect {
        person_bounds(
            self.config.thumbnail_resolution,
            self.config.thumbnail_text_width_percent,
            self.config.thumbnail_allowed_overlap,
        )
    }

    /// Looks up a person for `keywords`, generalising them on failure.
    pub fn person_for<R: Rng>(&self, keywords: &[String], rng: &mut R) -> Result<Option<PersonCutout>> {
        let Some(db) = self.db else {
            return Ok(None);
        };
        let bounds = self.bounds();
        let tolerance = (
            self.config.thumbnail_person_aspect_ratio_min,
            self.config.thumbnail_person_aspect_ratio_max,
        );
        let mut keywords = keywords.to_vec();
        let found = retry::bounded(
            "thumbnail person keyword sets",
            KEYWORD_RETRIES + 1,
            |attempt| {
                if attempt > 0 && !generalize_keywords(&mut keywords, &mut *rng) {
                    return Ok(None);
                }
                find_person(
                    db,
                    &self.config.thumbnail_image_dir,
                    &bounds,
                    &keywords,
                    tolerance,
                    &mut *rng,
                )
                .map(Some)
            },
            |_| true,
        );
        match found {
            Ok(person) => Ok(Some(person)),
            Err(e) if e.kind() == ErrorKind::ResourceExhausted => {
                warn!("Thumbnail generation for keywords {:?} found no person", keywords);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Renders one thumbnail to `out`. `stem` keeps the intermediate files
    /// of several thumbnails apart.
    pub fn render<R: Rng>(
        &self,
        background: &BackgroundClip,
        title: &str,
        post: &Post,
        keywords: &[String],
        stem: &str,
        out: &Path,
        rng: &mut R,
    ) -> Result<()> {
        fs::create_dir_all(&self.work_dir)?;
        let frame = self.work_dir.join(format!("{stem}-frame.png"));
        let at = background.start + rng.r#gen::<f64>() * background.duration;
        extract_frame(&background.path, at, &frame)?;

        let person = self.person_for(keywords, rng)?.map(|p| {
            let placement = place_person(&self.bounds(), (p.width, p.height));
            (p.path, placement)
        });
        if person.is_none() {
            info!("rendering thumbnail {stem} without a person");
        }

        let write = |name: &str, text: String| -> Result<PathBuf> {
            let path = self.work_dir.join(format!("{stem}-{name}.txt"));
            fs::write(&path, text)?;
            Ok(path)
        };
        let layout = ThumbnailLayout {
            resolution: self.config.thumbnail_resolution,
            margin: self.config.thumbnail_margin,
            text_width_percent: self.config.thumbnail_text_width_percent,
            style: self.config.caption_style(),
            person,
            subreddit_icon: self.config.thumbnail_subreddit_icon.clone(),
            upvote_icon: self.config.thumbnail_upvote_icon.clone(),
            comment_icon: self.config.thumbnail_comment_icon.clone(),
            title_file: write("title", title_lines(title))?,
            subreddit_file: write("subreddit", format!("r/{}", post.subreddit))?,
            upvotes_file: write("upvotes", format_count(post.upvotes))?,
            comments_file: write("comments", format_count(post.num_comments))?,
        };

        let mut args = vec!["-i".to_string(), frame.to_string_lossy().into_owned()];
        for (path, _) in layout.overlays() {
            args.push("-i".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        args.extend([
            "-filter_complex".to_string(),
            layout.filter(),
            "-map".to_string(),
            "[out]".to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            out.to_string_lossy().into_owned(),
        ]);
        run_ffmpeg(&args, "render thumbnail")?;
        info!("Thumbnail written to {}", out.display());
        Ok(())
    }
}
