//! Narration text cleanup and splitting.

use pulldown_cmark::{Event, Parser, TagEnd};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::Result;

/// Trailing sections that get cut when they start late enough in a post.
const TRAILING_SECTIONS: [&str; 5] = ["\nedit", "*edit", "\ntldr", "\ntl;dr", "update:"];
const TRAILING_SECTION_MIN_POSITION: f64 = 0.4;

struct Fixups {
    line_join: Regex,
    quote_join: Regex,
    open_paren: Regex,
    close_paren: Regex,
    comma_join: Regex,
    dash_join: Regex,
    loose_comma: Regex,
    ellipsis: Regex,
    link: Regex,
}

fn fixups() -> &'static Fixups {
    static FIXUPS: OnceLock<Fixups> = OnceLock::new();
    FIXUPS.get_or_init(|| Fixups {
        line_join: Regex::new(r"([a-zA-Z]+)\n([a-zA-Z]+)").unwrap(),
        quote_join: Regex::new(r#"([a-zA-Z]+)"([a-zA-Z]+)"#).unwrap(),
        open_paren: Regex::new(r"([a-zA-Z])\(").unwrap(),
        close_paren: Regex::new(r"\)([a-zA-Z])").unwrap(),
        comma_join: Regex::new(r"([a-zA-Z]),([a-zA-Z])").unwrap(),
        dash_join: Regex::new(r"([a-zA-Z]) - ([a-zA-Z])").unwrap(),
        loose_comma: Regex::new(r"([a-zA-Z]) ,([a-zA-Z])").unwrap(),
        ellipsis: Regex::new(r"([a-zA-Z])\.\.\.([a-zA-Z])").unwrap(),
        link: Regex::new(r"\[([^\]]+)\]\((\S+?)\)").unwrap(),
    })
}

/// Cleans raw Reddit markdown into something a TTS voice can read.
#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    replacements: Vec<(String, String)>,
}

impl TextCleaner {
    pub fn new(replacements: Vec<(String, String)>) -> Self {
        Self { replacements }
    }

    /// Loads `from,to` replacement lines. A missing file means no replacements.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No replacement table at {}", path.display());
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let mut replacements = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once(',') {
                Some((from, to)) => replacements.push((from.to_string(), to.to_string())),
                None => warn!("Ignoring malformed replacement line: {:?}", line),
            }
        }
        Ok(Self { replacements })
    }

    pub fn clean(&self, raw: &str) -> String {
        self.normalize(cut_trailing_sections(&strip_markdown(raw)))
    }

    /// Cleans a post title. Unlike [`clean`](Self::clean) nothing is cut, so
    /// update markers survive for the update filter.
    pub fn clean_title(&self, raw: &str) -> String {
        self.normalize(strip_markdown(raw))
    }

    fn normalize(&self, mut text: String) -> String {
        let f = fixups();
        text = f.line_join.replace_all(&text, "$1. $2").into_owned();
        text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        text = text.replace(" , ", ", ").replace(" . ", ". ");
        text = text
            .replace("â€œ", "\"")
            .replace(['\u{201c}', '\u{201d}'], "\"")
            .replace(['\u{2018}', '\u{2019}'], "'");
        text.retain(|c| c.is_ascii());

        text = f.quote_join.replace_all(&text, "$1 $2").into_owned();
        text = f.open_paren.replace_all(&text, "$1 (").into_owned();
        text = f.close_paren.replace_all(&text, ") $1").into_owned();
        text = f.comma_join.replace_all(&text, "$1, $2").into_owned();
        text = f.dash_join.replace_all(&text, "$1, $2").into_owned();
        text = f.loose_comma.replace_all(&text, "$1, $2").into_owned();
        text = f.ellipsis.replace_all(&text, "$1... $2").into_owned();
        text = f.link.replace_all(&text, "$1").into_owned();

        for (from, to) in &self.replacements {
            text = text.replace(from.as_str(), to);
        }
        text.trim().to_string()
    }
}

/// Renders markdown as plain text. Block ends become newlines so the line
/// join fixup can turn them into sentence breaks.
pub fn strip_markdown(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::BlockQuote(_)) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
    out.trim_end().to_string()
}

fn cut_trailing_sections(text: &str) -> String {
    let mut text = text.to_string();
    for phrase in TRAILING_SECTIONS {
        let lower = text.to_ascii_lowercase();
        if let Some(position) = lower.find(phrase) {
            if position as f64 > text.len() as f64 * TRAILING_SECTION_MIN_POSITION {
                debug!("Cutting trailing {:?} section", phrase.trim());
                text.truncate(position);
            }
        }
    }
    text
}

/// Splits `text` into parts of at most `max_chars` bytes, preferring to break
/// after the last period, then semicolon, then comma, then space.
pub fn split_to_max_chars(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.len() > max_chars {
        let window = &rest[..floor_char_boundary(rest, max_chars)];
        let cut = ['.', ';', ',', ' ']
            .iter()
            .find_map(|sep| window.rfind(*sep).map(|i| i + sep.len_utf8()))
            .unwrap_or(window.len());
        let cut = if cut == 0 {
            rest.chars().next().map_or(0, char::len_utf8)
        } else {
            cut
        };
        parts.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    parts.push(rest.to_string());
    parts
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
