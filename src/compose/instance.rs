// Instance composer - per-instance ports, names and credentials

use crate::settings::{Category, Scope, SettingsError, SettingsStore};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use thiserror::Error;

pub const BASE_PORT: u16 = 27960;
pub const MAX_INSTANCES: u8 = 10;
pub const PORT_RANGE: RangeInclusive<u16> = 1024..=65535;

/// How default ports are spread across instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPolicy {
    /// `base + (n - 1)`
    Sequential,
    /// `base + (n - 1) * 10`
    Spaced,
}

/// The two installer generations disagree on the offset formula. Sequential
/// ports are what the management helper and firewall docs assume.
pub const DEFAULT_PORT_POLICY: PortPolicy = PortPolicy::Sequential;

impl PortPolicy {
    pub fn port_for(&self, base: u16, ordinal: u8) -> Option<u16> {
        let step: u16 = match self {
            PortPolicy::Sequential => 1,
            PortPolicy::Spaced => 10,
        };
        let offset = u16::from(ordinal.checked_sub(1)?).checked_mul(step)?;
        base.checked_add(offset)
    }
}

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Instance count must be between 1 and 10, got {0}")]
    InvalidCount(u8),

    #[error("Instance {ordinal} is outside 1..={count}")]
    OrdinalOutOfRange { ordinal: u8, count: u8 },

    #[error("Instance {0} was already configured")]
    DuplicateOrdinal(u8),

    #[error("Port {0} is outside the registered range 1024-65535")]
    PortOutOfRange(u32),

    #[error("Port {port} is already used by instance {ordinal}")]
    PortInUse { port: u16, ordinal: u8 },

    #[error("Only {configured} of {count} instances are configured")]
    Incomplete { configured: usize, count: u8 },

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to serialize compose file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to create {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to change ownership of {path:?}: {source}")]
    Ownership {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Optional access credentials; `None` disables that access mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub password: Option<String>,
    pub rcon: Option<String>,
    pub referee: Option<String>,
    pub shoutcaster: Option<String>,
}

impl Credentials {
    /// Settings keys paired with their values.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("PASSWORD", self.password.as_deref()),
            ("RCONPASSWORD", self.rcon.as_deref()),
            ("REFEREEPASSWORD", self.referee.as_deref()),
            ("SCPASSWORD", self.shoutcaster.as_deref()),
        ]
    }

    fn from_store(store: &SettingsStore, ordinal: u8) -> Self {
        let get = |key: &str| non_empty(store.resolve(key, Some(ordinal), ""));
        Self {
            password: get("PASSWORD"),
            rcon: get("RCONPASSWORD"),
            referee: get("REFEREEPASSWORD"),
            shoutcaster: get("SCPASSWORD"),
        }
    }
}

/// Treat blank input as "not set".
pub fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub ordinal: u8,
    pub port: u16,
    pub name: String,
    pub credentials: Credentials,
}

pub struct InstanceComposer {
    count: u8,
    policy: PortPolicy,
    base_port: u16,
    instances: Vec<InstanceSpec>,
}

impl InstanceComposer {
    pub fn new(count: u8) -> Result<Self, ComposeError> {
        if count == 0 || count > MAX_INSTANCES {
            return Err(ComposeError::InvalidCount(count));
        }
        Ok(Self {
            count,
            policy: DEFAULT_PORT_POLICY,
            base_port: BASE_PORT,
            instances: Vec::new(),
        })
    }

    pub fn with_policy(mut self, policy: PortPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn instances(&self) -> &[InstanceSpec] {
        &self.instances
    }

    /// Lowest ordinal not configured yet.
    pub fn next_ordinal(&self) -> Option<u8> {
        (1..=self.count).find(|n| self.instances.iter().all(|i| i.ordinal != *n))
    }

    /// Suggested port for `ordinal`: the policy port, or the next free port
    /// above it when that one is taken.
    pub fn default_port(&self, ordinal: u8) -> u16 {
        let mut port = self
            .policy
            .port_for(self.base_port, ordinal)
            .unwrap_or(self.base_port);
        while self.instances.iter().any(|i| i.port == port) && port < *PORT_RANGE.end() {
            port += 1;
        }
        port
    }

    /// Check a candidate port before it is accepted. Takes `u32` so that
    /// out-of-range input is reported instead of truncated.
    pub fn validate_port(&self, ordinal: u8, port: u32) -> Result<u16, ComposeError> {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| PORT_RANGE.contains(p))
            .ok_or(ComposeError::PortOutOfRange(port))?;

        if let Some(other) = self
            .instances
            .iter()
            .find(|i| i.port == port && i.ordinal != ordinal)
        {
            return Err(ComposeError::PortInUse {
                port,
                ordinal: other.ordinal,
            });
        }
        Ok(port)
    }

    pub fn add(&mut self, spec: InstanceSpec) -> Result<(), ComposeError> {
        if spec.ordinal == 0 || spec.ordinal > self.count {
            return Err(ComposeError::OrdinalOutOfRange {
                ordinal: spec.ordinal,
                count: self.count,
            });
        }
        if self.instances.iter().any(|i| i.ordinal == spec.ordinal) {
            return Err(ComposeError::DuplicateOrdinal(spec.ordinal));
        }
        self.validate_port(spec.ordinal, u32::from(spec.port))?;

        tracing::debug!("Configured instance {} on port {}", spec.ordinal, spec.port);
        self.instances.push(spec);
        self.instances.sort_by_key(|i| i.ordinal);
        Ok(())
    }

    /// Default name for an instance derived from the global hostname.
    pub fn default_name(&self, store: &SettingsStore, ordinal: u8) -> String {
        let base = store.resolve("HOSTNAME", None, "ET Docker Server");
        if self.count > 1 {
            format!("{} #{}", base, ordinal)
        } else {
            base
        }
    }

    /// Configure every remaining instance with default port and name and the
    /// global credentials.
    pub fn fill_defaults(&mut self, store: &SettingsStore) -> Result<(), ComposeError> {
        while let Some(ordinal) = self.next_ordinal() {
            let spec = InstanceSpec {
                ordinal,
                port: self.default_port(ordinal),
                name: self.default_name(store, ordinal),
                credentials: Credentials::from_store(store, ordinal),
            };
            self.add(spec)?;
        }
        Ok(())
    }

    /// Rebuild the composer from a settings file written by `write_settings`.
    pub fn from_store(store: &SettingsStore) -> Result<Self, ComposeError> {
        let count = store
            .resolve("SERVER_COUNT", None, "")
            .trim()
            .parse::<u8>()
            .unwrap_or_else(|_| store.instance_count().max(1));

        let mut composer = Self::new(count)?;
        for ordinal in 1..=count {
            let port = match store.lookup("MAP_PORT", Scope::Instance(ordinal)) {
                Some(port) => port
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| SettingsError::InvalidValue {
                        key: Scope::Instance(ordinal).qualify("MAP_PORT"),
                        value: port.to_string(),
                    })?,
                None => u32::from(composer.default_port(ordinal)),
            };
            let port = composer.validate_port(ordinal, port)?;
            let name = store
                .lookup("HOSTNAME", Scope::Instance(ordinal))
                .map(str::to_string)
                .unwrap_or_else(|| composer.default_name(store, ordinal));

            composer.add(InstanceSpec {
                ordinal,
                port,
                name,
                credentials: Credentials::from_store(store, ordinal),
            })?;
        }
        Ok(composer)
    }

    /// Persist every instance under its own scope. Missing credentials are
    /// written as empty values so they never fall back to a global password.
    pub fn write_settings(&self, store: &mut SettingsStore) -> Result<(), ComposeError> {
        if self.instances.len() != usize::from(self.count) {
            return Err(ComposeError::Incomplete {
                configured: self.instances.len(),
                count: self.count,
            });
        }

        store.set(Category::Services, "SERVER_COUNT", &self.count.to_string(), Scope::Global);

        for spec in &self.instances {
            let scope = Scope::Instance(spec.ordinal);
            store.set(Category::Instance, "MAP_PORT", &spec.port.to_string(), scope);
            store.set(Category::Instance, "HOSTNAME", &spec.name, scope);
            for (key, value) in spec.credentials.entries() {
                store.set(Category::Instance, key, value.unwrap_or(""), scope);
            }
        }
        Ok(())
    }
}
