// Template renderer - %NAME% placeholder substitution with post-render hooks

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to read template {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write rendered file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch configs from {url} ({branch}): {reason}")]
    Fetch {
        url: String,
        branch: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Placeholder(String),
}

/// A parsed template: literal text interleaved with `%NAME%` placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    tokens: Vec<Token>,
}

impl Template {
    pub fn parse(text: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(start) = rest.find('%') {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 1..];

            match after.find('%') {
                Some(end) if is_placeholder_name(&after[..end]) => {
                    if !literal.is_empty() {
                        tokens.push(Token::Text(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Placeholder(after[..end].to_string()));
                    rest = &after[end + 1..];
                }
                _ => {
                    literal.push('%');
                    rest = after;
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Text(literal));
        }

        Self { tokens }
    }

    /// Placeholder names in order of appearance, duplicates included.
    pub fn placeholders(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Placeholder(name) => Some(name.as_str()),
                Token::Text(_) => None,
            })
            .collect()
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// What to emit for a placeholder with no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownPlaceholder {
    /// Absent value means the feature is disabled: emit nothing.
    #[default]
    Blank,
    /// Leave `%NAME%` in the output.
    Keep,
}

/// Side effects applied to the rendered text after substitution.
pub trait RenderHook: Send + Sync {
    fn after_render(&self, values: &HashMap<String, String>, output: &mut String);
}

/// Enforces the join password whenever one is configured.
pub struct PasswordHook;

impl RenderHook for PasswordHook {
    fn after_render(&self, values: &HashMap<String, String>, output: &mut String) {
        let has_password = values
            .get("CONF_PASSWORD")
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false);
        if has_password {
            append_line(output, "set g_needpass \"1\"");
        }
    }
}

/// Loads a Lua module on startup.
pub struct LuaModuleHook {
    pub module: String,
}

impl RenderHook for LuaModuleHook {
    fn after_render(&self, _values: &HashMap<String, String>, output: &mut String) {
        append_line(output, &format!("set lua_modules \"{}\"", self.module));
    }
}

fn append_line(output: &mut String, line: &str) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(line);
    output.push('\n');
}

pub struct Renderer {
    values: HashMap<String, String>,
    unknown: UnknownPlaceholder,
    hooks: Vec<Box<dyn RenderHook>>,
}

impl Renderer {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values,
            unknown: UnknownPlaceholder::default(),
            hooks: Vec::new(),
        }
    }

    pub fn unknown_placeholders(mut self, policy: UnknownPlaceholder) -> Self {
        self.unknown = policy;
        self
    }

    pub fn hook(mut self, hook: impl RenderHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Substitute without running hooks.
    pub fn substitute(&self, template: &Template) -> String {
        let mut out = String::new();
        for token in &template.tokens {
            match token {
                Token::Text(text) => out.push_str(text),
                Token::Placeholder(name) => match self.values.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        if self.unknown == UnknownPlaceholder::Keep {
                            out.push('%');
                            out.push_str(name);
                            out.push('%');
                        } else {
                            tracing::debug!("Blanking unresolved placeholder %{}%", name);
                        }
                    }
                },
            }
        }
        out
    }

    pub fn render(&self, template: &Template) -> String {
        let mut out = self.substitute(template);
        for hook in &self.hooks {
            hook.after_render(&self.values, &mut out);
        }
        out
    }

    pub fn render_str(&self, text: &str) -> String {
        self.render(&Template::parse(text))
    }

    /// Copy `source` to `target` with placeholders substituted. The target is
    /// overwritten on every call.
    pub fn render_file(&self, source: &Path, target: &Path) -> Result<(), RenderError> {
        let text = std::fs::read_to_string(source).map_err(|e| RenderError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;

        let rendered = self.render_str(&text);

        let write_err = |e| RenderError::Write {
            path: target.to_path_buf(),
            source: e,
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(target, rendered).map_err(write_err)?;

        tracing::info!("Rendered {:?} -> {:?}", source, target);
        Ok(())
    }
}

/// Number of message-of-the-day slots the server exposes.
pub const MOTD_SLOTS: usize = 6;

/// Values land inside double-quoted cvars, so a `"` becomes `'`.
pub fn quote_safe(value: &str) -> String {
    value.replace('"', "'")
}

/// Split a message of the day on the literal `\n` escape into exactly
/// `slots` `server_motdN` lines. Surplus lines are dropped.
pub fn motd_lines(value: &str, slots: usize) -> Vec<String> {
    let mut parts: Vec<&str> = if value.is_empty() {
        Vec::new()
    } else {
        value.split("\\n").collect()
    };
    if parts.len() > slots {
        tracing::warn!("MOTD has {} lines, only {} are shown", parts.len(), slots);
        parts.truncate(slots);
    }

    (0..slots)
        .map(|i| {
            let line = quote_safe(parts.get(i).copied().unwrap_or(""));
            format!("set server_motd{} \"{}\"", i, line)
        })
        .collect()
}
