// Fetch maps - run the map fetcher outside the container

use crate::assets::{parse_map_list, MapName};
use crate::cli::FetchMapsOpts;
use crate::error::{Error, Result};
use crate::settings::{SettingsStore, CATALOG};
use std::path::Path;

pub async fn execute(dir: &Path, opts: FetchMapsOpts) -> Result<()> {
    let settings = crate::paths::settings_path(dir);
    let store = if settings.exists() {
        SettingsStore::load(&settings)?
    } else {
        SettingsStore::from_env(CATALOG)
    };

    let maps = map_list(&store, &opts.maps)?;
    let redirect = opts
        .url
        .clone()
        .unwrap_or_else(|| store.resolve("REDIRECTURL", None, ""));
    let cache = opts
        .cache
        .clone()
        .unwrap_or_else(|| opts.target.join(".cache"));

    let fetcher = super::entrypoint::build_fetcher(&opts.target, &cache, &redirect)
        .with_workers(opts.workers);
    let report = fetcher.fetch_all(&maps).await?;

    println!(
        "{} present, {} copied, {} downloaded, {} failed",
        report.skipped.len(),
        report.copied.len(),
        report.downloaded.len(),
        report.failed.len()
    );
    if report.is_complete() {
        Ok(())
    } else {
        let failed: Vec<&str> = report.failed.iter().map(MapName::as_str).collect();
        Err(Error::Refused(format!("could not fetch: {}", failed.join(", "))))
    }
}

/// Maps named on the command line, else the MAPS setting.
fn map_list(store: &SettingsStore, args: &[String]) -> Result<Vec<MapName>> {
    if args.is_empty() {
        return Ok(parse_map_list(&store.resolve("MAPS", None, "")));
    }
    args.iter()
        .map(|a| MapName::new(a).ok_or_else(|| Error::Input(format!("invalid map name {:?}", a))))
        .collect()
}
