use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

/// Append-only list of post ids that already became videos.
#[derive(Debug)]
pub struct PostedIds {
    path: PathBuf,
    ids: HashSet<String>,
}

impl PostedIds {
    pub fn load(path: &Path) -> Result<Self> {
        let ids = if path.exists() {
            fs::read_to_string(path)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            HashSet::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            ids,
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn mark(&mut self, id: &str) -> Result<()> {
        if !self.ids.insert(id.to_string()) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", id)?;
        info!("Saved post_id {} as posted", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ids = PostedIds::load(&dir.path().join("already_posted.txt")).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn marks_are_appended_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("already_posted.txt");
        fs::write(&path, "old1\nold2\n").unwrap();

        let mut ids = PostedIds::load(&path).unwrap();
        assert!(ids.contains("old2"));
        ids.mark("new1").unwrap();
        ids.mark("new1").unwrap();
        ids.mark("old1").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "old1\nold2\nnew1\n");
        let reloaded = PostedIds::load(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
    }
}
