use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use veil_transform::Snapshot;

/// Writes pipeline snapshots as `step{N}_{pass}.sol`, with the untouched input as step 0.
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(step: usize, pass: &str) -> String {
        format!("step{}_{}.sol", step, pass)
    }

    pub fn write_input(&self, source: &str) -> Result<PathBuf> {
        self.write_file(&Self::file_name(0, "input"), source)
    }

    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        self.write_file(&Self::file_name(snapshot.step, snapshot.pass), &snapshot.source)
    }

    pub fn write_all(&self, snapshots: &[Snapshot]) -> Result<Vec<PathBuf>> {
        snapshots.iter().map(|s| self.write(s)).collect()
    }

    fn write_file(&self, name: &str, source: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, source).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "wrote snapshot");
        Ok(path)
    }
}
