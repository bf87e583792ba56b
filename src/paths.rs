// Paths - where a deployment lives on the host

use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "settings.env";
pub const COMPOSE_FILE: &str = "docker-compose.yml";
const DEFAULT_DIR_NAME: &str = "etlserver";

/// Install directory: the explicit override, else `~/etlserver`.
pub fn install_dir(dir: Option<&Path>) -> PathBuf {
    match dir {
        Some(dir) => dir.to_path_buf(),
        None => directories::UserDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DIR_NAME),
    }
}

pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join(SETTINGS_FILE)
}

pub fn compose_path(dir: &Path) -> PathBuf {
    dir.join(COMPOSE_FILE)
}
