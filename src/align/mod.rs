//! Word-level forced alignment of narration audio against its transcript.

pub mod textgrid;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// One aligned interval. Silence intervals have an empty or `<...>` word.
#[derive(Debug, Clone, PartialEq)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    pub fn is_spoken(&self) -> bool {
        let word = self.word.trim();
        !word.is_empty() && !word.starts_with('<')
    }
}

/// Ordered word timings as produced by the aligner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentTrace {
    pub words: Vec<WordTiming>,
}

impl AlignmentTrace {
    pub fn new(words: Vec<WordTiming>) -> Self {
        Self { words }
    }

    /// The trace without silence and non-speech markers, one entry per word.
    pub fn spoken(&self) -> AlignmentTrace {
        AlignmentTrace {
            words: self.words.iter().filter(|w| w.is_spoken()).cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

pub trait Aligner {
    fn align(&self, audio: &Path, transcript: &str) -> Result<AlignmentTrace>;
}

/// Text as handed to the aligner: punctuation removed, words kept.
pub fn transcript_text(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_punctuation()).collect()
}

/// Montreal Forced Aligner, run as `mfa align_one`.
#[derive(Debug, Clone)]
pub struct MfaAligner {
    pub dictionary: String,
    pub acoustic_model: String,
    pub work_dir: PathBuf,
}

impl MfaAligner {
    pub fn for_language(language: &str, work_dir: &Path) -> Result<Self> {
        let (dictionary, acoustic_model) = match language.to_lowercase().as_str() {
            "english" | "en" => ("english_us_arpa", "english_us_arpa"),
            "german" | "de" => ("german_mfa", "german_mfa"),
            other => {
                return Err(Error::Config(format!(
                    "no alignment models configured for language {other:?}"
                )));
            }
        };
        Ok(Self {
            dictionary: dictionary.to_string(),
            acoustic_model: acoustic_model.to_string(),
            work_dir: work_dir.to_path_buf(),
        })
    }
}

impl Aligner for MfaAligner {
    fn align(&self, audio: &Path, transcript: &str) -> Result<AlignmentTrace> {
        which::which("mfa").map_err(|_| Error::service("mfa", "mfa not found in PATH"))?;

        let stem = audio
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config(format!("invalid audio path {}", audio.display())))?;
        fs::create_dir_all(&self.work_dir)?;
        let text_path = self.work_dir.join(format!("{stem}.txt"));
        fs::write(&text_path, transcript_text(transcript))?;

        info!("Aligning {} against {}", audio.display(), text_path.display());
        let status = Command::new("mfa")
            .arg("align_one")
            .arg(audio)
            .arg(&text_path)
            .arg(&self.dictionary)
            .arg(&self.acoustic_model)
            .arg(&self.work_dir)
            .args(["--clean", "--single_speaker"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()?;
        if !status.success() {
            error!("mfa align_one failed for {}", audio.display());
            return Err(Error::service(
                "mfa",
                format!("align_one exited with {status}"),
            ));
        }

        let grid_path = self.work_dir.join(format!("{stem}.TextGrid"));
        if !grid_path.exists() {
            return Err(Error::service(
                "mfa",
                format!("no TextGrid written to {}", grid_path.display()),
            ));
        }
        let trace = AlignmentTrace::new(textgrid::parse_first_tier(&fs::read_to_string(
            &grid_path,
        )?)?);
        debug!("Alignment produced {} intervals", trace.len());
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_markers_are_dropped() {
        let trace = AlignmentTrace::new(vec![
            WordTiming::new("", 0.0, 0.2),
            WordTiming::new("i", 0.2, 0.3),
            WordTiming::new("<eps>", 0.3, 0.4),
            WordTiming::new("<unk>", 0.4, 0.5),
            WordTiming::new("left", 0.5, 0.9),
        ]);
        let spoken = trace.spoken();
        let words: Vec<&str> = spoken.words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["i", "left"]);
    }

    #[test]
    fn transcript_drops_punctuation() {
        assert_eq!(transcript_text("Well, I didn't \"go\"."), "Well I didnt go");
    }

    #[test]
    fn unknown_language_is_config_error() {
        let err = MfaAligner::for_language("klingon", Path::new("tmp")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        let mfa = MfaAligner::for_language("German", Path::new("tmp")).unwrap();
        assert_eq!(mfa.dictionary, "german_mfa");
    }
}
