//! Final composition: narration sections stitched into one track with their
//! captions, burned onto the cropped background clip.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::audio::{append_silence, concat_wavs, wav_duration_seconds};
use crate::background::BackgroundClip;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::media::{filter_path, run_ffmpeg};
use crate::subtitle::Cue;
use crate::text::split_to_max_chars;

/// Longest comment text shown on screen at once.
pub const TEXT_WALL_MAX_CHARS: usize = 550;
/// Pause after cards and comment parts.
pub const CARD_PADDING: f64 = 1.0;

/// One narrated stretch of the video. Cue times are relative to its start.
#[derive(Debug, Clone)]
pub struct Section {
    pub audio: PathBuf,
    pub cues: Vec<Cue>,
    /// Text shown for the whole section, e.g. the intro title card.
    pub card: Option<(String, Option<u32>)>,
    pub tail_silence: f64,
}

impl Section {
    pub fn timed(audio: PathBuf, cues: Vec<Cue>) -> Self {
        Self {
            audio,
            cues,
            card: None,
            tail_silence: 0.0,
        }
    }

    pub fn card(audio: PathBuf, text: impl Into<String>, font_size: Option<u32>) -> Self {
        Self {
            audio,
            cues: Vec::new(),
            card: Some((text.into(), font_size)),
            tail_silence: CARD_PADDING,
        }
    }

    /// A section with nothing on screen, used for the outro.
    pub fn blank(audio: PathBuf) -> Self {
        Self {
            audio,
            cues: Vec::new(),
            card: None,
            tail_silence: CARD_PADDING,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Assembled {
    pub audio: PathBuf,
    pub cues: Vec<Cue>,
    pub duration: f64,
}

/// Lays sections end to end given each section's padded duration.
pub fn layout_cues(sections: &[Section], durations: &[f64]) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut offset = 0.0;
    for (section, &duration) in sections.iter().zip(durations) {
        if let Some((text, font_size)) = &section.card {
            cues.push(Cue {
                text: text.clone(),
                start: offset,
                end: offset + duration,
                font_size: *font_size,
            });
        }
        cues.extend(section.cues.iter().cloned().map(|c| c.delayed(offset)));
        offset += duration;
    }
    cues
}

/// Pads each section, concatenates the audio into `out` and shifts every
/// cue onto the combined timeline.
pub fn assemble_sections(sections: &[Section], work_dir: &Path, out: &Path) -> Result<Assembled> {
    if sections.is_empty() {
        return Err(Error::NotFound("video sections".to_string()));
    }
    let mut parts = Vec::with_capacity(sections.len());
    let mut durations = Vec::with_capacity(sections.len());
    for (i, section) in sections.iter().enumerate() {
        let part = if section.tail_silence > 0.0 {
            let padded = work_dir.join(format!("section-{i:03}.wav"));
            append_silence(&section.audio, &padded, section.tail_silence)?;
            padded
        } else {
            section.audio.clone()
        };
        durations.push(wav_duration_seconds(&part)?);
        parts.push(part);
    }
    concat_wavs(&parts, out)?;
    let duration = durations.iter().sum();
    info!("the video will be {:.2}s long", duration);
    Ok(Assembled {
        audio: out.to_path_buf(),
        cues: layout_cues(sections, &durations),
        duration,
    })
}

/// Splits a comment into screen-sized parts, each with a font size that
/// keeps long parts inside the frame.
pub fn text_wall_parts(body: &str) -> Vec<(String, u32)> {
    split_to_max_chars(body, TEXT_WALL_MAX_CHARS)
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let size = text_wall_font_size(part.len());
            (part, size)
        })
        .collect()
}

pub fn text_wall_font_size(chars: usize) -> u32 {
    if chars > 400 {
        45
    } else if chars > 200 {
        50
    } else {
        70
    }
}

/// Encoder settings for the final video.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub resolution: (u32, u32),
    pub fps: u32,
    pub preset: String,
    pub threads: u32,
    pub background_volume: f64,
}

impl RenderSettings {
    pub fn from_config(config: &Config, resolution: (u32, u32)) -> Self {
        Self {
            resolution,
            fps: config.video_fps,
            preset: config.write_video_preset.clone(),
            threads: config.num_threads,
            background_volume: config.background_video_volume,
        }
    }

    /// Centre crop to the target aspect ratio, resize, burn in captions and
    /// mix the quieted background audio under the narration.
    pub fn filter(&self, subtitles: &Path, background_has_audio: bool) -> String {
        let (w, h) = self.resolution;
        let mut filter = format!(
            "[0:v]crop='min(iw,ih*{w}/{h})':'min(ih,iw*{h}/{w})',scale={w}:{h},setsar=1,\
             fps={fps},subtitles='{subs}'[v]",
            fps = self.fps,
            subs = filter_path(subtitles),
        );
        if background_has_audio {
            filter.push_str(&format!(
                ";[0:a]volume={}[bg];[bg][1:a]amix=inputs=2:duration=longest:dropout_transition=0:normalize=0[a]",
                self.background_volume
            ));
        }
        filter
    }

    pub fn ffmpeg_args(
        &self,
        background: &BackgroundClip,
        background_has_audio: bool,
        narration: &Path,
        subtitles: &Path,
        out: &Path,
    ) -> Vec<String> {
        let audio_map = if background_has_audio { "[a]" } else { "1:a:0" };
        [
            "-ss".to_string(),
            format!("{:.3}", background.start),
            "-t".to_string(),
            format!("{:.3}", background.duration),
            "-i".to_string(),
            background.path.to_string_lossy().into_owned(),
            "-i".to_string(),
            narration.to_string_lossy().into_owned(),
            "-filter_complex".to_string(),
            self.filter(subtitles, background_has_audio),
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            audio_map.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-threads".to_string(),
            self.threads.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-t".to_string(),
            format!("{:.3}", background.duration),
            out.to_string_lossy().into_owned(),
        ]
        .into()
    }
}

pub fn render_video(
    settings: &RenderSettings,
    background: &BackgroundClip,
    background_has_audio: bool,
    narration: &Path,
    subtitles: &Path,
    out: &Path,
) -> Result<()> {
    info!("Merging audio and subtitles into final video {}", out.display());
    let args = settings.ffmpeg_args(background, background_has_audio, narration, subtitles, out);
    run_ffmpeg(&args, "produce final video")?;
    info!("Final video written to {}", out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(text: &str, start: f64, end: f64) -> Cue {
        Cue {
            text: text.to_string(),
            start,
            end,
            font_size: None,
        }
    }

    #[test]
    fn sections_are_laid_end_to_end() {
        let sections = vec![
            Section::card(PathBuf::from("intro.wav"), "Reddit asks:\nTitle", None),
            Section::timed(
                PathBuf::from("story.wav"),
                vec![cue("one two", 0.0, 1.0), cue("three four", 1.0, 2.5)],
            ),
            Section::blank(PathBuf::from("outro.wav")),
        ];
        let cues = layout_cues(&sections, &[3.0, 2.6, 2.0]);
        assert_eq!(cues.len(), 3);
        assert_eq!((cues[0].start, cues[0].end), (0.0, 3.0));
        assert_eq!((cues[1].start, cues[1].end), (3.0, 4.0));
        assert_eq!((cues[2].start, cues[2].end), (4.0, 5.5));
    }

    #[test]
    fn comment_parts_get_smaller_fonts_when_long() {
        assert_eq!(text_wall_font_size(450), 45);
        assert_eq!(text_wall_font_size(401), 45);
        assert_eq!(text_wall_font_size(400), 50);
        assert_eq!(text_wall_font_size(201), 50);
        assert_eq!(text_wall_font_size(200), 70);

        let body = "This is a sentence that keeps going. ".repeat(30);
        let parts = text_wall_parts(&body);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|(p, _)| p.len() <= TEXT_WALL_MAX_CHARS));
        assert_eq!(text_wall_parts("short one"), vec![("short one".to_string(), 70)]);
    }

    fn settings() -> RenderSettings {
        RenderSettings::from_config(&Config::default(), (1080, 1920))
    }

    fn clip() -> BackgroundClip {
        BackgroundClip {
            path: PathBuf::from("bg/minecraft/run.mp4"),
            start: 12.5,
            duration: 61.25,
            source_duration: 600.0,
            credit: "minecraft".to_string(),
        }
    }

    #[test]
    fn filter_crops_to_portrait_and_burns_captions() {
        let filter = settings().filter(Path::new("tmp/abc/captions.ass"), false);
        assert!(filter.starts_with("[0:v]crop='min(iw,ih*1080/1920)':'min(ih,iw*1920/1080)',scale=1080:1920"));
        assert!(filter.contains("fps=25"));
        assert!(filter.contains("subtitles='tmp/abc/captions.ass'[v]"));
        assert!(!filter.contains("amix"));
    }

    #[test]
    fn background_audio_is_quieted_and_mixed() {
        let s = settings();
        let args = s.ffmpeg_args(
            &clip(),
            true,
            Path::new("tmp/abc/narration.wav"),
            Path::new("tmp/abc/captions.ass"),
            Path::new("out/abc/video.mp4"),
        );
        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("[0:a]volume=0.1[bg];[bg][1:a]amix=inputs=2"));
        assert_eq!(&args[..4], ["-ss", "12.500", "-t", "61.250"]);
        assert!(args.windows(2).any(|w| w == ["-map", "[a]"]));
        assert!(args.windows(2).any(|w| w == ["-preset", "veryfast"]));
        assert_eq!(args.last().unwrap(), "out/abc/video.mp4");
    }
}
