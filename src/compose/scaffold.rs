// Host directory layout for a deployment

use crate::compose::instance::ComposeError;
use std::path::{Path, PathBuf};

/// uid/gid the server process runs as inside the image.
pub const CONTAINER_UID: u32 = 1000;
pub const CONTAINER_GID: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    pub fn container_user() -> Self {
        Self {
            uid: CONTAINER_UID,
            gid: CONTAINER_GID,
        }
    }

    /// Parse `uid:gid`.
    pub fn parse(value: &str) -> Option<Self> {
        let (uid, gid) = value.split_once(':')?;
        Some(Self {
            uid: uid.trim().parse().ok()?,
            gid: gid.trim().parse().ok()?,
        })
    }
}

/// Create `maps/` and `logs/server{n}` for every instance under `root`
/// (`mkdir -p` semantics) and hand them to `owner` when given.
pub fn scaffold(root: &Path, count: u8, owner: Option<Ownership>) -> Result<Vec<PathBuf>, ComposeError> {
    let mut dirs = vec![root.join("maps"), root.join("logs")];
    dirs.extend((1..=count).map(|n| root.join("logs").join(format!("server{}", n))));

    for dir in &dirs {
        std::fs::create_dir_all(dir).map_err(|source| ComposeError::Io {
            path: dir.clone(),
            source,
        })?;
        if let Some(owner) = owner {
            change_owner(dir, owner)?;
        }
    }

    tracing::info!("Prepared {} directories under {:?}", dirs.len(), root);
    Ok(dirs)
}

/// Whether files created by this process end up owned by root, i.e. whether
/// handing directories to the container user is possible.
#[cfg(unix)]
pub fn running_as_root(probe: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(probe).map(|m| m.uid() == 0).unwrap_or(false)
}

#[cfg(not(unix))]
pub fn running_as_root(_probe: &Path) -> bool {
    false
}

#[cfg(unix)]
fn change_owner(path: &Path, owner: Ownership) -> Result<(), ComposeError> {
    std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid)).map_err(|source| {
        ComposeError::Ownership {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn change_owner(path: &Path, _owner: Ownership) -> Result<(), ComposeError> {
    tracing::debug!("Ownership not supported on this platform: {:?}", path);
    Ok(())
}
