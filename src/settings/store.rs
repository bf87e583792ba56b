// Settings store - categorised KEY=value file shared by installer, composer and entrypoint

use crate::settings::catalog::{Category, Scope, SettingDescriptor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed line {line} in {path:?}: {content}")]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub category: Category,
    pub key: String,
    pub value: String,
    pub scope: Scope,
}

#[derive(Debug, Clone)]
struct Section {
    category: Category,
    entries: Vec<Setting>,
    /// Hand-written comments, each with the entry index it precedes.
    notes: Vec<(usize, String)>,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    header: Vec<String>,
    sections: Vec<Section>,
}

impl SettingsStore {
    /// Empty in-memory store with the fixed category scaffold.
    pub fn new() -> Self {
        Self {
            path: None,
            header: default_header(),
            sections: Category::SCAFFOLD
                .iter()
                .map(|c| Section {
                    category: c.clone(),
                    entries: Vec::new(),
                    notes: Vec::new(),
                })
                .collect(),
        }
    }

    /// Load a settings file. A missing file yields a scaffolded empty store
    /// bound to `path`, so the next `save` creates it.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();

        if !path.exists() {
            tracing::debug!("Settings file doesn't exist yet: {:?}", path);
            let mut store = Self::new();
            store.path = Some(path);
            return Ok(store);
        }

        let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;

        let mut store = Self::parse(&content, &path)?;
        store.path = Some(path);
        Ok(store)
    }

    /// Build a store from the catalog: every descriptor takes its environment
    /// override when set, otherwise its default.
    pub fn from_env(catalog: &[SettingDescriptor]) -> Self {
        Self::from_lookup(catalog, |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(catalog: &[SettingDescriptor], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut store = Self::new();
        for desc in catalog {
            let value = lookup(desc.env).unwrap_or_else(|| desc.default.to_string());
            store.set(desc.category.clone(), desc.key, &value, Scope::Global);
        }
        store
    }

    fn parse(content: &str, path: &Path) -> Result<Self, SettingsError> {
        let mut store = Self {
            path: None,
            header: Vec::new(),
            sections: Vec::new(),
        };
        let mut current: Option<Category> = None;

        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }

            if let Some(comment) = trimmed.strip_prefix('#') {
                if let Some(category) = section_header(comment) {
                    store.section_mut(&category);
                    current = Some(category);
                } else if current.is_none() && store.sections.is_empty() {
                    // Comments ahead of the first section are the file header
                    store.header.push(line.to_string());
                } else {
                    let category = current.clone().unwrap_or_else(misc_category);
                    let section = store.section_mut(&category);
                    let at = section.entries.len();
                    section.notes.push((at, line.trim_end().to_string()));
                }
                continue;
            }

            // Only the key side is trimmed; values keep their spaces
            let Some(eq_pos) = line.find('=') else {
                return Err(SettingsError::Malformed {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    content: line.to_string(),
                });
            };

            let qualified = line[..eq_pos].trim();
            let value = unescape_value(&line[eq_pos + 1..]);
            let (scope, key) = Scope::split(qualified);
            let category = current.clone().unwrap_or_else(misc_category);
            store.set(category, key, &value, scope);
        }

        for category in Category::SCAFFOLD.iter() {
            store.section_mut(category);
        }

        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// Insert or overwrite `key` in `scope`. Keys are unique per scope: an
    /// existing entry in the same category is replaced in place, one in another
    /// category is moved.
    pub fn set(&mut self, category: Category, key: &str, value: &str, scope: Scope) {
        for section in &mut self.sections {
            if let Some(pos) = section
                .entries
                .iter()
                .position(|s| s.key == key && s.scope == scope)
            {
                if section.category == category {
                    section.entries[pos].value = value.to_string();
                    return;
                }
                section.entries.remove(pos);
                break;
            }
        }

        let section = self.section_mut(&category);
        section.entries.push(Setting {
            category,
            key: key.to_string(),
            value: value.to_string(),
            scope,
        });
    }

    /// Value of `key` within `category` and `scope`, or `default`.
    pub fn get<'a>(&'a self, category: &Category, key: &str, scope: Scope, default: &'a str) -> &'a str {
        self.sections
            .iter()
            .filter(|s| &s.category == category)
            .flat_map(|s| s.entries.iter())
            .find(|s| s.key == key && s.scope == scope)
            .map(|s| s.value.as_str())
            .unwrap_or(default)
    }

    /// Value of `key` in any category for the exact scope.
    pub fn lookup(&self, key: &str, scope: Scope) -> Option<&str> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .find(|s| s.key == key && s.scope == scope)
            .map(|s| s.value.as_str())
    }

    /// Effective value for an instance: instance override, then global, then `default`.
    pub fn resolve(&self, key: &str, instance: Option<u8>, default: &str) -> String {
        instance
            .and_then(|n| self.lookup(key, Scope::Instance(n)))
            .or_else(|| self.lookup(key, Scope::Global))
            .unwrap_or(default)
            .to_string()
    }

    /// All settings of a category, in file order.
    pub fn enumerate(&self, category: &Category) -> Vec<&Setting> {
        self.sections
            .iter()
            .filter(|s| &s.category == category)
            .flat_map(|s| s.entries.iter())
            .collect()
    }

    /// Settings of one scope flattened to `KEY -> value`.
    pub fn scoped(&self, scope: Scope) -> HashMap<String, String> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter(|s| s.scope == scope)
            .map(|s| (s.key.clone(), s.value.clone()))
            .collect()
    }

    /// Highest instance ordinal with at least one instance-scoped key.
    pub fn instance_count(&self) -> u8 {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter_map(|s| match s.scope {
                Scope::Instance(n) => Some(n),
                Scope::Global => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a global setting, reporting unparsable values.
    pub fn parse_global<T: std::str::FromStr>(&self, key: &str, default: &str) -> Result<T, SettingsError> {
        let value = self.resolve(key, None, default);
        value.trim().parse::<T>().map_err(|_| SettingsError::InvalidValue {
            key: key.to_string(),
            value,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str(line);
            out.push('\n');
        }
        for section in &self.sections {
            out.push('\n');
            out.push_str(&header_line(&section.category));
            out.push('\n');
            let notes_before = |i: usize| section.notes.iter().filter(move |(at, _)| *at == i);
            for (i, setting) in section.entries.iter().enumerate() {
                for (_, note) in notes_before(i) {
                    out.push_str(note);
                    out.push('\n');
                }
                out.push_str(&format!(
                    "{}={}\n",
                    setting.scope.qualify(&setting.key),
                    escape_value(&setting.value)
                ));
            }
            for (_, note) in section.notes.iter().filter(|(at, _)| *at >= section.entries.len()) {
                out.push_str(note);
                out.push('\n');
            }
        }
        out
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Err(SettingsError::Write {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "store has no file path"),
            });
        };
        self.save_to(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        std::fs::write(path, self.render()).map_err(write_err)?;
        tracing::info!("Saved settings: {:?}", path);
        Ok(())
    }

    fn section_mut(&mut self, category: &Category) -> &mut Section {
        let idx = match self.sections.iter().position(|s| &s.category == category) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    category: category.clone(),
                    entries: Vec::new(),
                    notes: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn default_header() -> Vec<String> {
    vec![
        "# ET:Legacy server settings".to_string(),
        format!("# Generated {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
    ]
}

fn misc_category() -> Category {
    Category::Custom("Misc".to_string())
}

/// Built-in categories are written as `# Title`, custom ones as `# [Title]`.
fn header_line(category: &Category) -> String {
    match category {
        Category::Custom(name) => format!("# [{}]", name),
        known => format!("# {}", known.title()),
    }
}

/// The category a comment opens, if it is a section header rather than a note.
fn section_header(comment: &str) -> Option<Category> {
    let title = comment.trim();
    if let Some(name) = title.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let name = name.trim();
        return (!name.is_empty()).then(|| Category::from_title(name));
    }
    match Category::from_title(title) {
        Category::Custom(_) => None,
        known => Some(known),
    }
}

/// Escape the path separator so values survive pattern-based substitution.
/// Line breaks become the literal `\n` used as the MOTD separator, so every
/// value stays on one line.
pub fn escape_value(value: &str) -> String {
    value
        .replace('/', "\\/")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .replace('\r', "")
}

pub fn unescape_value(value: &str) -> String {
    value.replace("\\/", "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut store = SettingsStore::new();
        store.set(Category::Server, "HOSTNAME", "first", Scope::Global);
        store.set(Category::Server, "HOSTNAME", "second", Scope::Global);

        assert_eq!(store.get(&Category::Server, "HOSTNAME", Scope::Global, ""), "second");
        let rendered = store.render();
        assert_eq!(rendered.matches("HOSTNAME=").count(), 1);
        assert!(rendered.contains("HOSTNAME=second"));
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut store = SettingsStore::new();
        store.set(Category::Server, "MAP_PORT", "27960", Scope::Global);
        store.set(Category::Instance, "MAP_PORT", "27961", Scope::Instance(2));

        assert_eq!(store.resolve("MAP_PORT", Some(2), "0"), "27961");
        assert_eq!(store.resolve("MAP_PORT", Some(1), "0"), "27960");
        assert_eq!(store.resolve("MAP_PORT", None, "0"), "27960");
        assert_eq!(store.instance_count(), 2);
    }

    #[test]
    fn test_set_moves_between_categories() {
        let mut store = SettingsStore::new();
        store.set(Category::Server, "TOKEN", "a", Scope::Global);
        store.set(Category::Stats, "TOKEN", "b", Scope::Global);

        assert!(store.enumerate(&Category::Server).is_empty());
        assert_eq!(store.enumerate(&Category::Stats).len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_file_is_scaffolded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.env");

        let store = SettingsStore::load(&path).unwrap();
        assert!(store.is_empty());
        store.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# ET:Legacy server settings"));
        for category in Category::SCAFFOLD.iter() {
            assert!(content.contains(&format!("# {}\n", category.title())));
        }
    }

    #[test]
    fn test_roundtrip_preserves_order_and_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.env");

        let mut store = SettingsStore::load(&path).unwrap();
        store.set(Category::Maps, "MAPS", "radar:supply", Scope::Global);
        store.set(Category::Maps, "REDIRECTURL", "https://example.org/et", Scope::Global);
        store.set(Category::Instance, "HOSTNAME", "Second", Scope::Instance(2));
        store.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("REDIRECTURL=https:\\/\\/example.org\\/et"));
        assert!(content.contains("SERVER2_HOSTNAME=Second"));

        let loaded = SettingsStore::load(&path).unwrap();
        let keys: Vec<_> = loaded
            .enumerate(&Category::Maps)
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(keys, vec!["MAPS", "REDIRECTURL"]);
        assert_eq!(
            loaded.get(&Category::Maps, "REDIRECTURL", Scope::Global, ""),
            "https://example.org/et"
        );
        assert_eq!(
            loaded.get(&Category::Instance, "HOSTNAME", Scope::Instance(2), ""),
            "Second"
        );
    }

    #[test]
    fn test_custom_category_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.env");
        std::fs::write(&path, "# [My Extras]\nFOO=bar\n").unwrap();

        let store = SettingsStore::load(&path).unwrap();
        let extras = Category::Custom("My Extras".to_string());
        assert_eq!(store.get(&extras, "FOO", Scope::Global, ""), "bar");
        assert!(store.render().contains("# [My Extras]\nFOO=bar\n"));
    }

    #[test]
    fn test_notes_stay_in_their_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.env");
        std::fs::write(
            &path,
            "# Passwords\n# keep these secret\nRCONPASSWORD=x\n# Maps\nMAPS=radar\n# end of maps\n",
        )
        .unwrap();

        let store = SettingsStore::load(&path).unwrap();
        assert_eq!(store.get(&Category::Passwords, "RCONPASSWORD", Scope::Global, "<default>"), "x");
        assert_eq!(store.get(&Category::Maps, "MAPS", Scope::Global, ""), "radar");
        assert!(store
            .sections
            .iter()
            .all(|s| !matches!(s.category, Category::Custom(_))));

        let rendered = store.render();
        assert!(rendered.contains("# Passwords\n# keep these secret\nRCONPASSWORD=x\n"));
        assert!(rendered.contains("# Maps\nMAPS=radar\n# end of maps\n"));

        store.save().unwrap();
        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.render(), rendered);
    }

    #[test]
    fn test_multiline_value_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.env");

        let mut store = SettingsStore::load(&path).unwrap();
        store.set(Category::Server, "CONF_MOTD", "Line1\nLine2\r\nLine3", Scope::Global);
        store.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("CONF_MOTD=Line1\\nLine2\\nLine3\n"));

        let loaded = SettingsStore::load(&path).unwrap();
        assert_eq!(
            loaded.get(&Category::Server, "CONF_MOTD", Scope::Global, ""),
            "Line1\\nLine2\\nLine3"
        );
    }

    #[test]
    fn test_value_keeps_surrounding_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.env");
        std::fs::write(&path, "# Passwords\n  SERVER1_RCONPASSWORD =secret \n").unwrap();

        let store = SettingsStore::load(&path).unwrap();
        assert_eq!(
            store.get(&Category::Passwords, "RCONPASSWORD", Scope::Instance(1), ""),
            "secret "
        );

        store.save().unwrap();
        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(
            reloaded.get(&Category::Passwords, "RCONPASSWORD", Scope::Instance(1), ""),
            "secret "
        );
    }

    #[test]
    fn test_malformed_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.env");
        std::fs::write(&path, "# Server\nthis is not a setting\n").unwrap();

        assert!(matches!(
            SettingsStore::load(&path),
            Err(SettingsError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn test_from_lookup_prefers_environment() {
        let catalog = crate::settings::CATALOG;
        let store = SettingsStore::from_lookup(catalog, |name| match name {
            "MAXCLIENTS" => Some("20".to_string()),
            _ => None,
        });

        assert_eq!(store.get(&Category::Server, "MAXCLIENTS", Scope::Global, ""), "20");
        assert_eq!(store.get(&Category::Server, "STARTMAP", Scope::Global, ""), "radar");
    }

    #[test]
    fn test_save_to_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let store = SettingsStore::new();
        let result = store.save_to(&blocker.join("settings.env"));
        assert!(matches!(result, Err(SettingsError::Write { .. })));
    }
}
