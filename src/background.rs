//! Stock background footage selection.

use rand::Rng;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::retry;

pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "webm", "mkv", "ogv", "mpeg", "avi", "mov"];

/// A sub-range of a background file, exactly as long as the video needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundClip {
    pub path: PathBuf,
    pub start: f64,
    pub duration: f64,
    pub source_duration: f64,
    /// Footage source, taken from the containing folder's name.
    pub credit: String,
}

pub fn collect_videos(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect()
}

pub fn credit_for(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Shuffles `candidates` and takes a random window of `required` seconds out
/// of the first one that is long enough. `probe` returns a file's duration.
pub fn select<R, P>(
    mut candidates: Vec<PathBuf>,
    required: f64,
    rng: &mut R,
    mut probe: P,
) -> Result<BackgroundClip>
where
    R: Rng,
    P: FnMut(&Path) -> Result<f64>,
{
    if candidates.is_empty() {
        return Err(Error::NotFound("background videos".to_string()));
    }
    candidates.shuffle(&mut *rng);
    let pool = candidates.len();
    let (path, source_duration) = retry::bounded(
        &format!("background videos of at least {required:.1}s"),
        pool,
        |attempt| {
            let path = &candidates[attempt];
            Ok(Some((path.clone(), probe(path)?)))
        },
        |(_, duration)| *duration >= required,
    )?;

    let start = rng.r#gen::<f64>() * (source_duration - required);
    info!(
        "selected {} as background video, using {:.2}s to {:.2}s out of {:.2}s",
        path.display(),
        start,
        start + required,
        source_duration
    );
    Ok(BackgroundClip {
        credit: credit_for(&path),
        path,
        start,
        duration: required,
        source_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;

    #[test]
    fn collects_video_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let creator = dir.path().join("Some Creator");
        fs::create_dir_all(&creator).unwrap();
        fs::write(creator.join("run.MP4"), b"").unwrap();
        fs::write(creator.join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("loop.webm"), b"").unwrap();

        let mut found = collect_videos(dir.path());
        found.sort();
        assert_eq!(found.len(), 2);
        assert_eq!(credit_for(&creator.join("run.MP4")), "Some Creator");
    }

    #[test]
    fn picks_long_enough_file_and_window() {
        let candidates = vec![
            PathBuf::from("bg/a/short.mp4"),
            PathBuf::from("bg/minecraft/long.mp4"),
            PathBuf::from("bg/b/tiny.mp4"),
        ];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let clip = select(candidates.clone(), 60.0, &mut rng, |p| {
                Ok(if p.ends_with("long.mp4") { 600.0 } else { 30.0 })
            })
            .unwrap();
            assert_eq!(clip.credit, "minecraft");
            assert_eq!(clip.duration, 60.0);
            assert!(clip.start >= 0.0 && clip.start + clip.duration <= 600.0);
        }
    }

    #[test]
    fn exact_length_file_is_accepted() {
        let mut rng = StdRng::seed_from_u64(1);
        let clip = select(vec![PathBuf::from("bg/x/exact.mp4")], 42.0, &mut rng, |_| Ok(42.0)).unwrap();
        assert_eq!(clip.start, 0.0);
    }

    #[test]
    fn exhausted_pool_is_an_error() {
        let mut rng = StdRng::seed_from_u64(7);
        let err = select(
            vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")],
            120.0,
            &mut rng,
            |p| {
                if p.ends_with("a.mp4") {
                    Err(Error::service("ffprobe", "corrupt"))
                } else {
                    Ok(10.0)
                }
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ResourceExhausted);

        let empty = select(Vec::new(), 1.0, &mut rng, |_| Ok(1.0)).unwrap_err();
        assert_eq!(empty.kind(), crate::error::ErrorKind::NotFound);
    }
}
