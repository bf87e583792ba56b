pub mod compose;
pub mod entrypoint;
pub mod fetch_maps;
pub mod install;
pub mod manage;
pub mod render;

use crate::error::{Error, Result};
use crate::settings::SettingsStore;
use std::path::Path;

/// Settings of an existing install; a missing file means nothing was
/// installed in `dir`.
pub(crate) fn load_installed(dir: &Path) -> Result<SettingsStore> {
    let path = crate::paths::settings_path(dir);
    if !path.is_file() {
        return Err(Error::NotInstalled(path));
    }
    Ok(SettingsStore::load(path)?)
}
