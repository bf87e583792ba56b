// Entrypoint - runs inside the game container

use crate::assets::{parse_map_list, AssetFetcher, HttpSource};
use crate::cli::EntrypointOpts;
use crate::error::Result;
use crate::launcher::LaunchPlan;
use crate::render::ConfigPlan;
use crate::settings::{SettingsStore, CATALOG};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Checkout of the config repository, below the home path.
const CHECKOUT_DIR: &str = "settings";
/// Mod directory the rendered configs land in.
const MOD_DIR: &str = "legacy";

/// Prepare the server from the environment and run it. Returns the server's
/// exit code where the process can't be replaced.
pub async fn execute(opts: EntrypointOpts) -> Result<i32> {
    let store = SettingsStore::from_env(CATALOG);
    let layout = Layout::from_store(&store);

    if opts.skip_configs {
        tracing::info!("Keeping existing configs in {:?}", layout.mod_dir);
    } else {
        prepare_configs(&store, &layout).await?;
    }

    if opts.skip_maps {
        tracing::info!("Skipping map downloads");
    } else {
        fetch_maps(&store, &layout).await?;
    }

    let plan = LaunchPlan::from_store(&store);
    if opts.dry_run {
        println!("{}", plan.command_line());
        return Ok(0);
    }

    // On unix the server takes over this process and receives its signals
    #[cfg(unix)]
    let result: Result<i32> = Err(plan.exec().into());
    #[cfg(not(unix))]
    let result: Result<i32> = plan
        .run()
        .await
        .map(|status| status.code().unwrap_or(1))
        .map_err(Into::into);
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    checkout: PathBuf,
    mod_dir: PathBuf,
    etmain: PathBuf,
    cache: PathBuf,
}

impl Layout {
    fn from_store(store: &SettingsStore) -> Self {
        let basepath = PathBuf::from(store.resolve("BASEPATH", None, "/legacy/server"));
        let homepath = PathBuf::from(store.resolve("HOMEPATH", None, "/legacy/homepath"));
        Self {
            checkout: homepath.join(CHECKOUT_DIR),
            mod_dir: homepath.join(MOD_DIR),
            etmain: basepath.join("etmain"),
            cache: PathBuf::from(store.resolve("MAPSDIR", None, "/maps")),
        }
    }
}

async fn prepare_configs(store: &SettingsStore, layout: &Layout) -> Result<()> {
    let plan = ConfigPlan::resolve(store, None);
    tracing::info!("Config flavour: {:?}", plan.flavor);

    plan.source.fetch(&layout.checkout).await?;
    plan.render_all(&layout.checkout, &layout.mod_dir)?;
    tracing::info!("Rendered {} template(s) into {:?}", plan.templates.len(), layout.mod_dir);
    Ok(())
}

/// Map fetching never stops the server from starting; only a target
/// directory that can't be created is fatal.
async fn fetch_maps(store: &SettingsStore, layout: &Layout) -> Result<()> {
    let maps = parse_map_list(&store.resolve("MAPS", None, ""));
    if maps.is_empty() {
        tracing::info!("No maps configured");
        return Ok(());
    }

    let fetcher = build_fetcher(&layout.etmain, &layout.cache, &store.resolve("REDIRECTURL", None, ""));
    fetcher.fetch_all(&maps).await?;
    Ok(())
}

pub(crate) fn build_fetcher(target: &Path, cache: &Path, redirect: &str) -> AssetFetcher {
    let mut fetcher = AssetFetcher::new(target).with_cache(cache);
    let redirect = redirect.trim().trim_end_matches('/');
    if redirect.is_empty() {
        tracing::warn!("REDIRECTURL is empty, maps can only come from {:?}", cache);
    } else {
        fetcher = fetcher.with_source(Arc::new(HttpSource::new(&format!("{}/etmain", redirect))));
    }
    fetcher
}
