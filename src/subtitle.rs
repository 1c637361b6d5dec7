use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::captions::CaptionSegment;
use crate::config::FontStyle;
use crate::error::Result;

/// A caption as it is written to disk. `font_size` overrides the style size.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub font_size: Option<u32>,
}

impl From<&CaptionSegment> for Cue {
    fn from(segment: &CaptionSegment) -> Self {
        Self {
            text: segment.text.clone(),
            start: segment.start,
            end: segment.end,
            font_size: None,
        }
    }
}

impl Cue {
    /// Shifts the cue later by `offset` seconds.
    pub fn delayed(mut self, offset: f64) -> Self {
        self.start += offset;
        self.end += offset;
        self
    }
}

pub fn write_srt(path: &Path, cues: &[Cue]) -> Result<()> {
    let mut f = File::create(path)?;
    for (i, cue) in cues.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(f, "{} --> {}", format_srt_time(cue.start), format_srt_time(cue.end))?;
        for line in wrap_text(&cue.text, 80) {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
    }
    Ok(())
}

/// Styled captions for burning in with the ffmpeg `subtitles` filter.
/// Text is centred in a box 80% of the frame wide.
pub fn write_ass(path: &Path, cues: &[Cue], style: &FontStyle, resolution: (u32, u32)) -> Result<()> {
    let (width, height) = resolution;
    let margin = width / 10;
    let mut f = File::create(path)?;
    writeln!(f, "[Script Info]")?;
    writeln!(f, "ScriptType: v4.00+")?;
    writeln!(f, "PlayResX: {}", width)?;
    writeln!(f, "PlayResY: {}", height)?;
    writeln!(f, "WrapStyle: 0")?;
    writeln!(f)?;
    writeln!(f, "[V4+ Styles]")?;
    writeln!(
        f,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    )?;
    writeln!(
        f,
        "Style: Default,{},{},{},{},{},&H00000000,0,0,0,0,100,100,0,0,1,{},0,5,{},{},0,1",
        style.font,
        style.size,
        ass_color(&style.color),
        ass_color(&style.color),
        ass_color(&style.stroke_color),
        style.stroke_width,
        margin,
        margin
    )?;
    writeln!(f)?;
    writeln!(f, "[Events]")?;
    writeln!(
        f,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    )?;
    for cue in cues {
        let size = cue
            .font_size
            .map(|s| format!("{{\\fs{}}}", s))
            .unwrap_or_default();
        writeln!(
            f,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}{}",
            format_ass_time(cue.start),
            format_ass_time(cue.end),
            size,
            escape_ass(&cue.text)
        )?;
    }
    Ok(())
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_sec = total_cs / 100;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

fn escape_ass(text: &str) -> String {
    text.replace('{', "(")
        .replace('}', ")")
        .replace('\n', "\\N")
}

/// `&HAABBGGRR` from a colour name or `#RRGGBB`.
pub fn ass_color(color: &str) -> String {
    let rgb = match color.trim().to_lowercase().as_str() {
        "white" => (255, 255, 255),
        "black" => (0, 0, 0),
        "yellow" => (255, 255, 0),
        "red" => (255, 0, 0),
        "green" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "orange" => (255, 165, 0),
        hex if hex.len() == 7 && hex.starts_with('#') => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(255);
            (channel(1), channel(3), channel(5))
        }
        _ => (255, 255, 255),
    };
    format!("&H00{:02X}{:02X}{:02X}", rgb.2, rgb.1, rgb.0)
}

fn wrap_text(s: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if current.len() + word.len() + 1 > width && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
            current.push_str(word);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
