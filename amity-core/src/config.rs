use std::path::{Path, PathBuf};

/// Default location of the Amity data directory
pub const DEFAULT_DATA_DIR: &str = "~/.config/amity/";
/// Friend listing URL; `{id}` is replaced with the subject identifier
pub const DEFAULT_PROFILE_URL: &str = "https://www.facebook.com/{id}/friends";

pub const DATABASE_FILE: &str = "amity.db";
pub const SNAPSHOT_DIR: &str = "snapshots";
pub const COOKIE_FILE: &str = "cookies.json";

/// Filesystem layout under the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Expands `~` and environment variables in `path`
    pub fn new(path: &str) -> Self {
        let expanded = shellexpand::full(path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| shellexpand::tilde(path).into_owned());
        Self {
            root: PathBuf::from(expanded),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOT_DIR)
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.root.join(COOKIE_FILE)
    }
}

impl Default for DataDir {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

/// Builds the listing URL for a subject from a `{id}` template
pub fn profile_url(template: &str, identifier: &str) -> String {
    if template.contains("{id}") {
        template.replace("{id}", identifier)
    } else {
        format!("{}/{}/friends", template.trim_end_matches('/'), identifier)
    }
}
