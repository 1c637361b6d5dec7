//! Reader for the long ("ooTextFile") Praat TextGrid format that the aligner
//! writes. Only the first interval tier is read; for MFA that is the word tier.

use regex::Regex;
use std::sync::OnceLock;

use super::WordTiming;
use crate::error::{Error, Result};

struct Patterns {
    item: Regex,
    interval: Regex,
    bound: Regex,
    text: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        item: Regex::new(r"^\s*item\s*\[(\d+)\]\s*:").unwrap(),
        interval: Regex::new(r"^\s*intervals\s*\[\d+\]\s*:").unwrap(),
        bound: Regex::new(r"^\s*(xmin|xmax)\s*=\s*([-+0-9.eE]+)").unwrap(),
        text: Regex::new(r#"^\s*text\s*=\s*"(.*)"\s*$"#).unwrap(),
    })
}

#[derive(Default)]
struct Partial {
    start: Option<f64>,
    end: Option<f64>,
}

pub fn parse_first_tier(contents: &str) -> Result<Vec<WordTiming>> {
    let p = patterns();
    let mut in_first_tier = false;
    let mut current: Option<Partial> = None;
    let mut words = Vec::new();

    for line in contents.lines() {
        if let Some(caps) = p.item.captures(line) {
            if in_first_tier {
                break;
            }
            in_first_tier = &caps[1] == "1";
            continue;
        }
        if !in_first_tier {
            continue;
        }
        if p.interval.is_match(line) {
            current = Some(Partial::default());
            continue;
        }
        let Some(partial) = current.as_mut() else {
            continue;
        };
        if let Some(caps) = p.bound.captures(line) {
            let value: f64 = caps[2]
                .parse()
                .map_err(|_| Error::service("textgrid", format!("bad time in line {line:?}")))?;
            if &caps[1] == "xmin" {
                partial.start = Some(value);
            } else {
                partial.end = Some(value);
            }
        } else if let Some(caps) = p.text.captures(line) {
            let (Some(start), Some(end)) = (partial.start, partial.end) else {
                return Err(Error::service(
                    "textgrid",
                    format!("interval text before its bounds: {line:?}"),
                ));
            };
            words.push(WordTiming {
                word: caps[1].replace("\"\"", "\""),
                start,
                end,
            });
            current = None;
        }
    }

    if words.is_empty() {
        return Err(Error::service("textgrid", "no intervals in first tier"));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"File type = "ooTextFile"
Object class = "TextGrid"

xmin = 0
xmax = 1.9
tiers? <exists>
size = 2
item []:
    item [1]:
        class = "IntervalTier"
        name = "words"
        xmin = 0
        xmax = 1.9
        intervals: size = 4
        intervals [1]:
            xmin = 0
            xmax = 0.31
            text = ""
        intervals [2]:
            xmin = 0.31
            xmax = 0.72
            text = "hello"
        intervals [3]:
            xmin = 0.72
            xmax = 1.5
            text = "world"
        intervals [4]:
            xmin = 1.5
            xmax = 1.9
            text = "<eps>"
    item [2]:
        class = "IntervalTier"
        name = "phones"
        xmin = 0
        xmax = 1.9
        intervals: size = 1
        intervals [1]:
            xmin = 0.31
            xmax = 0.4
            text = "HH"
"#;

    #[test]
    fn reads_word_tier_only() {
        let words = parse_first_tier(SAMPLE).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[1].word, "hello");
        assert_eq!(words[1].start, 0.31);
        assert_eq!(words[2].end, 1.5);
        assert_eq!(words[3].word, "<eps>");
    }

    #[test]
    fn empty_grid_is_an_error() {
        assert!(parse_first_tier("File type = \"ooTextFile\"\n").is_err());
    }
}
