// Config flavour - decides which templates are rendered and where they come from

use crate::render::template::{
    motd_lines, quote_safe, LuaModuleHook, PasswordHook, RenderError, Renderer, MOTD_SLOTS,
};
use crate::settings::{is_enabled, SettingsStore, CATALOG, STATS_SETTINGS_BRANCH};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SERVER_CONFIG: &str = "etl_server.cfg";
pub const STATS_SCRIPT: &str = "luascripts/stats.lua";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFlavor {
    Standard,
    StatsSubmission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub url: String,
    pub branch: String,
}

/// A template inside the config checkout and where its rendering lands,
/// relative to the server's `legacy` mod directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpec {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Everything derived from the stats flag, resolved in one place: the config
/// source branch, the templates to render and the render hooks.
#[derive(Debug, Clone)]
pub struct ConfigPlan {
    pub flavor: ConfigFlavor,
    pub source: ConfigSource,
    pub templates: Vec<TemplateSpec>,
    pub values: HashMap<String, String>,
}

impl ConfigFlavor {
    pub fn from_store(store: &SettingsStore) -> Self {
        if is_enabled(&store.resolve("STATS_SUBMIT", None, "false")) {
            ConfigFlavor::StatsSubmission
        } else {
            ConfigFlavor::Standard
        }
    }
}

impl ConfigPlan {
    pub fn resolve(store: &SettingsStore, instance: Option<u8>) -> Self {
        let flavor = ConfigFlavor::from_store(store);

        let url = store.resolve("SETTINGSURL", None, "");
        let branch = match flavor {
            ConfigFlavor::Standard => store.resolve("SETTINGSBRANCH", None, "main"),
            ConfigFlavor::StatsSubmission => STATS_SETTINGS_BRANCH.to_string(),
        };

        let mut templates = vec![TemplateSpec {
            source: PathBuf::from(SERVER_CONFIG),
            target: PathBuf::from(SERVER_CONFIG),
        }];
        if flavor == ConfigFlavor::StatsSubmission {
            templates.push(TemplateSpec {
                source: PathBuf::from(STATS_SCRIPT),
                target: PathBuf::from(STATS_SCRIPT),
            });
        }

        Self {
            flavor,
            source: ConfigSource { url, branch },
            templates,
            values: placeholders_from(store, instance),
        }
    }

    pub fn renderer(&self) -> Renderer {
        let renderer = Renderer::new(self.values.clone()).hook(PasswordHook);
        match self.flavor {
            ConfigFlavor::Standard => renderer,
            ConfigFlavor::StatsSubmission => renderer.hook(LuaModuleHook {
                module: STATS_SCRIPT.to_string(),
            }),
        }
    }

    /// Render every template from `checkout` into `mod_dir`.
    pub fn render_all(&self, checkout: &Path, mod_dir: &Path) -> Result<(), RenderError> {
        let renderer = self.renderer();
        // Only the server config gets the trailing directives; the Lua script
        // is plain substitution.
        let plain = Renderer::new(self.values.clone());

        for spec in &self.templates {
            let source = checkout.join(&spec.source);
            let target = mod_dir.join(&spec.target);
            if spec.source == Path::new(SERVER_CONFIG) {
                renderer.render_file(&source, &target)?;
            } else {
                plain.render_file(&source, &target)?;
            }
        }
        Ok(())
    }
}

impl ConfigSource {
    /// Shallow-clone the config repository into `dest`, replacing any
    /// previous checkout.
    pub async fn fetch(&self, dest: &Path) -> Result<(), RenderError> {
        let fail = |reason: String| RenderError::Fetch {
            url: self.url.clone(),
            branch: self.branch.clone(),
            reason,
        };

        if dest.exists() {
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| fail(format!("cannot clear {:?}: {}", dest, e)))?;
        }

        tracing::info!("Fetching configs from {} ({})", self.url, self.branch);
        let output = tokio::process::Command::new("git")
            .args(["clone", "--depth", "1", "--single-branch", "--branch"])
            .arg(&self.branch)
            .arg(&self.url)
            .arg(dest)
            .output()
            .await
            .map_err(|e| fail(format!("git not available: {}", e)))?;

        if !output.status.success() {
            return Err(fail(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(())
    }
}

/// Placeholder values for one instance (or the global scope), keyed by
/// placeholder name.
pub fn placeholders_from(store: &SettingsStore, instance: Option<u8>) -> HashMap<String, String> {
    let mut values = HashMap::new();

    for desc in CATALOG {
        let Some(placeholder) = desc.placeholder else {
            continue;
        };
        let value = store.resolve(desc.key, instance, desc.default);
        let value = if placeholder == "CONF_MOTD" {
            motd_lines(&value, MOTD_SLOTS).join("\n")
        } else {
            quote_safe(&value)
        };
        values.insert(placeholder.to_string(), value);
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Category, Scope};

    fn store_with(pairs: &[(&str, &str)]) -> SettingsStore {
        let mut store = SettingsStore::from_lookup(CATALOG, |_| None);
        for (k, v) in pairs {
            let category = crate::settings::lookup(k)
                .map(|d| d.category.clone())
                .unwrap_or(Category::Custom("Test".into()));
            store.set(category, k, v, Scope::Global);
        }
        store
    }

    #[test]
    fn test_standard_flavor_uses_configured_branch() {
        let plan = ConfigPlan::resolve(&store_with(&[("SETTINGSBRANCH", "dev")]), None);
        assert_eq!(plan.flavor, ConfigFlavor::Standard);
        assert_eq!(plan.source.branch, "dev");
        assert_eq!(plan.templates.len(), 1);
    }

    #[test]
    fn test_stats_flag_switches_branch_and_templates_together() {
        let plan = ConfigPlan::resolve(
            &store_with(&[("STATS_SUBMIT", "true"), ("SETTINGSBRANCH", "dev")]),
            None,
        );
        assert_eq!(plan.flavor, ConfigFlavor::StatsSubmission);
        assert_eq!(plan.source.branch, STATS_SETTINGS_BRANCH);
        assert!(plan.templates.iter().any(|t| t.source == Path::new(STATS_SCRIPT)));
    }

    #[test]
    fn test_instance_values_override_globals() {
        let mut store = store_with(&[("HOSTNAME", "Global")]);
        store.set(Category::Instance, "HOSTNAME", "Second", Scope::Instance(2));

        assert_eq!(placeholders_from(&store, Some(2))["CONF_HOSTNAME"], "Second");
        assert_eq!(placeholders_from(&store, Some(1))["CONF_HOSTNAME"], "Global");
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=etl", "-c", "user.email=etl@localhost", "-c", "commit.gpgsign=false"])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    #[tokio::test]
    async fn test_fetch_replaces_previous_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        git(&repo, &["init", "-q"]);
        git(&repo, &["symbolic-ref", "HEAD", "refs/heads/etl-settings"]);
        std::fs::write(repo.join(SERVER_CONFIG), "set sv_hostname \"%CONF_HOSTNAME%\"\n").unwrap();
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-q", "-m", "configs"]);

        let dest = dir.path().join("checkout");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.cfg"), "old").unwrap();

        let source = ConfigSource {
            url: file_url(&repo),
            branch: "etl-settings".to_string(),
        };
        source.fetch(&dest).await.unwrap();

        assert!(dest.join(SERVER_CONFIG).is_file());
        assert!(!dest.join("stale.cfg").exists());
    }

    #[tokio::test]
    async fn test_failed_clone_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("checkout");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.cfg"), "old").unwrap();

        let source = ConfigSource {
            url: file_url(&dir.path().join("missing")),
            branch: "main".to_string(),
        };
        let err = source.fetch(&dest).await.unwrap_err();

        match err {
            RenderError::Fetch { url, branch, .. } => {
                assert_eq!(url, source.url);
                assert_eq!(branch, "main");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dest.join("stale.cfg").exists());
    }

    #[test]
    fn test_every_value_is_quote_safe() {
        let store = store_with(&[
            ("HOSTNAME", "The \"Best\" Server"),
            ("CONF_MOTD", "Say \"hi\""),
        ]);
        let values = placeholders_from(&store, None);
        assert_eq!(values["CONF_HOSTNAME"], "The 'Best' Server");
        assert!(values["CONF_MOTD"].starts_with("set server_motd0 \"Say 'hi'\""));

        let cfg = ConfigPlan::resolve(&store, None)
            .renderer()
            .render_str("set sv_hostname \"%CONF_HOSTNAME%\"");
        assert!(cfg.starts_with("set sv_hostname \"The 'Best' Server\""));
    }

    #[test]
    fn test_render_all_stats_flavor() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("checkout");
        let mod_dir = dir.path().join("legacy");
        std::fs::create_dir_all(checkout.join("luascripts")).unwrap();
        std::fs::write(
            checkout.join(SERVER_CONFIG),
            "set sv_hostname \"%CONF_HOSTNAME%\"\n%CONF_MOTD%\n",
        )
        .unwrap();
        std::fs::write(
            checkout.join(STATS_SCRIPT),
            "local token = \"%CONF_STATS_API_TOKEN%\"\nlocal url = \"%CONF_STATS_API_URL%\"\n",
        )
        .unwrap();

        let store = store_with(&[
            ("STATS_SUBMIT", "1"),
            ("STATS_API_TOKEN", "tok"),
            ("HOSTNAME", "Srv"),
            ("CONF_MOTD", "Hi\\nThere"),
            ("PASSWORD", "pw"),
        ]);
        let plan = ConfigPlan::resolve(&store, None);
        plan.render_all(&checkout, &mod_dir).unwrap();

        let cfg = std::fs::read_to_string(mod_dir.join(SERVER_CONFIG)).unwrap();
        assert!(cfg.contains("set sv_hostname \"Srv\""));
        assert!(cfg.contains("set server_motd1 \"There\""));
        assert!(cfg.contains("set server_motd5 \"\""));
        assert!(cfg.contains("set g_needpass \"1\""));
        assert!(cfg.contains("set lua_modules \"luascripts/stats.lua\""));
        assert!(!cfg.contains('%'));

        let lua = std::fs::read_to_string(mod_dir.join(STATS_SCRIPT)).unwrap();
        assert!(lua.contains("local token = \"tok\""));
        assert!(!lua.contains("g_needpass"));
    }
}
