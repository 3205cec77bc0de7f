use crate::Config;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CHORALE_";
const SQLITE_FILENAME: &str = "cache.sqlite";
const LOCAL_DIRNAME: &str = "cache";

/// Platform data directory (`~/.local/share/chorale` on Linux).
pub fn default_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "chorale", "chorale").map(|dirs| dirs.data_dir().to_path_buf())
}

impl Config {
    /// The layered sources, without extracting or validating.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
                Some("json") => figment.merge(Json::file_exact(path)),
                _ => figment.merge(Toml::file_exact(path)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate the configuration.
    ///
    /// A `file` that's given but missing is an error; environment variables
    /// override whatever the file says.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(file = ?file, storage = ?config.storage.kind, "Configuration loaded");
        Ok(config)
    }

    /// Where the configured storage kind lives on disk.
    pub fn storage_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage.path {
            return Ok(path.clone());
        }
        let data_dir = default_data_dir().ok_or_raise(|| ErrorKind::NoDataDir)?;
        Ok(match self.storage.kind {
            crate::StorageKind::Sqlite => data_dir.join(SQLITE_FILENAME),
            crate::StorageKind::Local => data_dir.join(LOCAL_DIRNAME),
        })
    }
}
