use amity_scanner::{PageDriver, ScanError, SessionCookie};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to read cookie file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid cookie file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("page driver error: {0}")]
    Driver(#[from] ScanError),
}

/// Reads a JSON array of `{name, value, domain?, path?}` cookies
pub fn load_cookie_file(path: &Path) -> Result<Vec<SessionCookie>, SessionError> {
    let content = fs::read_to_string(path).map_err(|source| SessionError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| SessionError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Restores the saved session into the driver and reloads the listing.
///
/// Without a cookie file the listing is reloaded anonymously.
pub async fn restore_session<D: PageDriver>(
    driver: &mut D,
    cookie_file: Option<&Path>,
) -> Result<usize, SessionError> {
    let cookies = match cookie_file {
        Some(path) => load_cookie_file(path)?,
        None => Vec::new(),
    };

    if !cookies.is_empty() {
        driver.load_cookies(&cookies).await?;
    }
    driver.refresh().await?;

    info!("Session restored with {} cookies", cookies.len());
    Ok(cookies.len())
}
