//! Thin wrappers around the `ffmpeg` and `ffprobe` binaries.

use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, error};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub has_audio: bool,
}

pub fn probe(path: &Path) -> Result<MediaInfo> {
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    which::which("ffprobe").map_err(|_| Error::service("ffprobe", "ffprobe not found in PATH"))?;

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .output()?;
    if !output.status.success() {
        return Err(Error::service(
            "ffprobe",
            format!(
                "{}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    parse_probe(&output.stdout)
        .map_err(|e| Error::service("ffprobe", format!("{}: {}", path.display(), e)))
}

fn parse_probe(stdout: &[u8]) -> std::result::Result<MediaInfo, String> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout).map_err(|e| e.to_string())?;
    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| "no duration".to_string())?;
    Ok(MediaInfo {
        duration,
        has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
    })
}

/// Runs ffmpeg with `args`, failing with an `ExternalServiceFailure` naming `what`.
pub fn run_ffmpeg<I, S>(args: I, what: &str) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    debug!(
        "ffmpeg {}",
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let output = Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error"])
        .args(&args)
        .stdin(Stdio::null())
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ffmpeg failed to {}: {}", what, stderr.trim());
        return Err(Error::service("ffmpeg", format!("failed to {what}")));
    }
    Ok(())
}

/// Escapes a path for use as an option value inside an ffmpeg filtergraph.
pub fn filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_output_is_parsed() {
        let json = br#"{"streams": [{"codec_type": "video"}, {"codec_type": "audio"}],
                        "format": {"duration": "93.4"}}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.duration, 93.4);
        assert!(info.has_audio);

        let silent = br#"{"streams": [{"codec_type": "video"}], "format": {"duration": "5"}}"#;
        assert!(!parse_probe(silent).unwrap().has_audio);
        assert!(parse_probe(br#"{"format": {}}"#).is_err());
    }

    #[test]
    fn filter_paths_are_escaped() {
        assert_eq!(filter_path(Path::new("C:\\tmp\\a.ass")), "C\\:/tmp/a.ass");
    }
}
