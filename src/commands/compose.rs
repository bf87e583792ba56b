// Compose - regenerate docker-compose.yml from an existing settings file

use crate::compose::{scaffold, AddOns, ComposeFile, InstanceComposer};
use crate::error::Result;
use crate::paths;
use std::path::Path;

pub fn execute(dir: &Path) -> Result<()> {
    let store = super::load_installed(dir)?;
    let composer = InstanceComposer::from_store(&store)?;

    // New instances need their log directories
    scaffold(dir, composer.count(), None)?;

    let path = paths::compose_path(dir);
    let compose = ComposeFile::build(&composer, &store, dir, &AddOns::from_store(&store));
    compose.write(&path)?;

    println!("Wrote {} service(s) to {}", compose.services.len(), path.display());
    Ok(())
}
