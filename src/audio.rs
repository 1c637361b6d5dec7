use hound::{SampleFormat, WavReader, WavWriter};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::media::run_ffmpeg;

pub fn wav_duration_seconds(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

/// Concatenates WAV files into `out`, stream-copying when possible.
pub fn concat_wavs(parts: &[PathBuf], out: &Path) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::NotFound("audio parts to concatenate".to_string()));
    }
    let list_path = out.with_extension("concat.txt");
    {
        let mut f = File::create(&list_path)?;
        for p in parts {
            let absolute = std::path::absolute(p)?;
            writeln!(f, "file '{}'", absolute.to_string_lossy().replace('\'', "'\\''"))?;
        }
    }
    info!("Concatenating {} WAV parts into {}", parts.len(), out.display());

    let list = list_path.to_string_lossy().into_owned();
    let target = out.to_string_lossy().into_owned();
    let copied = run_ffmpeg(
        ["-f", "concat", "-safe", "0", "-i", list.as_str(), "-c", "copy", target.as_str()],
        "concatenate audio",
    );
    if copied.is_err() {
        warn!("ffmpeg concat with copy failed; retrying with re-encode");
        run_ffmpeg(
            [
                "-f", "concat", "-safe", "0", "-i", list.as_str(), "-c:a", "pcm_s16le",
                target.as_str(),
            ],
            "concatenate audio",
        )?;
    }
    Ok(())
}

/// Copies `input` to `output` followed by `seconds` of silence.
pub fn append_silence(input: &Path, output: &Path, seconds: f64) -> Result<()> {
    let mut reader = WavReader::open(input)?;
    let spec = reader.spec();
    let mut writer = WavWriter::create(output, spec)?;
    match spec.sample_format {
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                writer.write_sample(sample?)?;
            }
        }
        SampleFormat::Int => {
            for sample in reader.samples::<i32>() {
                writer.write_sample(sample?)?;
            }
        }
    }
    let silent_samples = (seconds * spec.sample_rate as f64).round() as u64 * spec.channels as u64;
    for _ in 0..silent_samples {
        match spec.sample_format {
            SampleFormat::Float => writer.write_sample(0.0f32)?,
            SampleFormat::Int => writer.write_sample(0i32)?,
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavSpec;

    fn write_tone(path: &Path, seconds: f64) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let frames = (seconds * 8000.0) as usize;
        for i in 0..frames {
            let v = ((i % 100) as i16 - 50) * 100;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn duration_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_tone(&path, 1.5);
        assert!((wav_duration_seconds(&path).unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn silence_extends_duration() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        let output = dir.path().join("padded.wav");
        write_tone(&input, 0.5);
        append_silence(&input, &output, 1.0).unwrap();
        assert!((wav_duration_seconds(&output).unwrap() - 1.5).abs() < 1e-9);

        let mut reader = WavReader::open(&output).unwrap();
        let last: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert!(last[last.len() - 10..].iter().all(|&s| s == 0));
    }
}
