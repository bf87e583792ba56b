// Render - render one template against the settings file

use crate::cli::RenderOpts;
use crate::error::{Error, Result};
use crate::render::{ConfigPlan, RenderError, UnknownPlaceholder};
use crate::settings::SettingsStore;
use std::path::Path;

pub fn execute(dir: &Path, opts: RenderOpts) -> Result<()> {
    let store = super::load_installed(dir)?;
    let output = render_with(&store, &opts)?;

    match &opts.output {
        Some(path) => {
            std::fs::write(path, output).map_err(|source| RenderError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Rendered {:?} into {:?}", opts.template, path);
        }
        None => print!("{}", output),
    }
    Ok(())
}

/// Render `opts.template` with the same values and hooks the server config
/// gets inside the container.
fn render_with(store: &SettingsStore, opts: &RenderOpts) -> Result<String> {
    if let Some(n) = opts.instance {
        let count = store.instance_count().max(1);
        if n == 0 || n > count {
            return Err(Error::UnknownInstance { ordinal: n, count });
        }
    }

    let text = std::fs::read_to_string(&opts.template).map_err(|source| RenderError::Read {
        path: opts.template.clone(),
        source,
    })?;

    let plan = ConfigPlan::resolve(store, opts.instance);
    let mut renderer = plan.renderer();
    if opts.keep_unknown {
        renderer = renderer.unknown_placeholders(UnknownPlaceholder::Keep);
    }
    Ok(renderer.render_str(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Category, Scope, CATALOG};
    use std::path::PathBuf;

    fn opts(template: PathBuf, instance: Option<u8>, keep_unknown: bool) -> RenderOpts {
        RenderOpts {
            template,
            output: None,
            instance,
            keep_unknown,
        }
    }

    #[test]
    fn test_instance_values_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("server.cfg");
        std::fs::write(&template, "set sv_hostname \"%CONF_HOSTNAME%\"\nset x \"%CONF_NOPE%\"\n").unwrap();

        let mut store = SettingsStore::from_lookup(CATALOG, |_| None);
        store.set(Category::Instance, "HOSTNAME", "Second", Scope::Instance(2));

        let out = render_with(&store, &opts(template.clone(), Some(2), false)).unwrap();
        assert!(out.starts_with("set sv_hostname \"Second\"\nset x \"\"\n"));

        let kept = render_with(&store, &opts(template, Some(2), true)).unwrap();
        assert!(kept.contains("%CONF_NOPE%"));
    }

    #[test]
    fn test_unknown_instance_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("server.cfg");
        std::fs::write(&template, "").unwrap();
        let store = SettingsStore::from_lookup(CATALOG, |_| None);
        assert!(matches!(
            render_with(&store, &opts(template, Some(4), false)),
            Err(Error::UnknownInstance { ordinal: 4, .. })
        ));
    }
}
