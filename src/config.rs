use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use serde::Deserialize;
use tracing::debug;

use crate::error::CollidbError;

pub const DEFAULT_DB_URL: &str = "https://db-amdis.org/collisiondb";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    db_url: Option<String>,
    #[serde(default)]
    data_dir: Option<Utf8PathBuf>,
}

/// Where the service lives and where downloaded archives land. Without a
/// configured data dir, each session gets a fresh temporary directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub data_dir: Option<Utf8PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.to_string(),
            data_dir: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, CollidbError> {
        let content =
            fs::read_to_string(path).map_err(|_| CollidbError::ConfigRead(path.to_path_buf()))?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|err| CollidbError::ConfigParse(err.to_string()))?;
        Ok(Self {
            db_url: file.db_url.unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            data_dir: file.data_dir,
        })
    }

    /// The directory archives are downloaded into. Created if configured,
    /// otherwise a new temporary directory per call.
    pub fn resolve_data_dir(&self) -> Result<Utf8PathBuf, CollidbError> {
        match &self.data_dir {
            Some(dir) => {
                fs::create_dir_all(dir.as_std_path())
                    .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
                Ok(dir.clone())
            }
            None => {
                let dir = tempfile::tempdir()
                    .map_err(|err| CollidbError::Filesystem(err.to_string()))?
                    .keep();
                let dir = Utf8PathBuf::from_path_buf(dir).map_err(|_| {
                    CollidbError::Filesystem("non-utf8 temporary data dir".to_string())
                })?;
                debug!(dir = %dir, "created temporary data dir");
                Ok(dir)
            }
        }
    }
}
