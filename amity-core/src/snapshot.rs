use amity_scanner::CandidateRecord;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid snapshot name: {0:?}")]
    InvalidName(String),
}

/// Writes the raw extraction of a run to `<dir>/<encoded subject>.json`.
///
/// Each save replaces the previous snapshot for the subject.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Subjects are percent-encoded so distinct subjects never share a file
    /// and no subject can name a path outside the snapshot directory.
    pub fn path_for(&self, subject: &str) -> Result<PathBuf, SnapshotError> {
        let name = urlencoding::encode(subject.trim());

        if name.is_empty() || name.chars().all(|c| c == '.') {
            return Err(SnapshotError::InvalidName(subject.to_string()));
        }

        Ok(self.dir.join(format!("{}.json", name)))
    }

    pub fn save(&self, subject: &str, records: &[CandidateRecord]) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(subject)?;
        fs::create_dir_all(&self.dir)?;

        // Readers only ever see a complete file
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(records)?)?;
        fs::rename(&tmp_path, &path)?;

        debug!("Saved {} records to {}", records.len(), path.display());
        Ok(path)
    }

    pub fn load(&self, subject: &str) -> Result<Vec<CandidateRecord>, SnapshotError> {
        let content = fs::read(self.path_for(subject)?)?;
        Ok(serde_json::from_slice(&content)?)
    }
}
