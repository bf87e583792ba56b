use serde::{Deserialize, Serialize};
use std::fmt;

/// Section a setting is grouped under in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Server,
    Instance,
    Passwords,
    Maps,
    Configs,
    Stats,
    Services,
    Custom(String),
}

impl Category {
    /// Categories every new settings file is scaffolded with, in file order.
    pub const SCAFFOLD: [Category; 7] = [
        Category::Server,
        Category::Instance,
        Category::Passwords,
        Category::Maps,
        Category::Configs,
        Category::Stats,
        Category::Services,
    ];

    pub fn title(&self) -> &str {
        match self {
            Category::Server => "Server",
            Category::Instance => "Instances",
            Category::Passwords => "Passwords",
            Category::Maps => "Maps",
            Category::Configs => "Configs",
            Category::Stats => "Stats",
            Category::Services => "Services",
            Category::Custom(name) => name,
        }
    }

    pub fn from_title(title: &str) -> Self {
        let title = title.trim();
        Self::SCAFFOLD
            .iter()
            .find(|c| c.title().eq_ignore_ascii_case(title))
            .cloned()
            .unwrap_or_else(|| Category::Custom(title.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Whether a setting applies to every instance or to one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Instance(u8),
}

impl Scope {
    /// Key as written to the settings file: `SERVER{n}_{KEY}` for instance scope.
    pub fn qualify(&self, key: &str) -> String {
        match self {
            Scope::Global => key.to_string(),
            Scope::Instance(n) => format!("SERVER{}_{}", n, key),
        }
    }

    /// Inverse of [`Scope::qualify`].
    pub fn split(qualified: &str) -> (Scope, &str) {
        if let Some(rest) = qualified.strip_prefix("SERVER") {
            if let Some(sep) = rest.find('_') {
                let (digits, key) = (&rest[..sep], &rest[sep + 1..]);
                if !digits.is_empty() && !key.is_empty() {
                    if let Ok(n) = digits.parse::<u8>() {
                        return (Scope::Instance(n), key);
                    }
                }
            }
        }
        (Scope::Global, qualified)
    }
}

/// Static description of a known setting.
#[derive(Debug, Clone)]
pub struct SettingDescriptor {
    pub key: &'static str,
    /// Environment variable that overrides the default.
    pub env: &'static str,
    pub category: Category,
    pub default: &'static str,
    /// Template placeholder fed by this setting, without the `%` delimiters.
    pub placeholder: Option<&'static str>,
    /// Can be overridden per instance.
    pub per_instance: bool,
    pub secret: bool,
    pub prompt: &'static str,
}

/// Master server tracker. The two installer generations disagree
/// (`et.trackbase.net:4444` vs `tracker.etl.lol:4444`); the newer one is used.
pub const DEFAULT_TRACKER: &str = "tracker.etl.lol:4444";

/// Default ETLTV password. One installer generation shipped `3tltv`, the other
/// left it empty; empty keeps the ETLTV slot closed until an operator sets it.
pub const DEFAULT_ETLTV_PASSWORD: &str = "";

pub const DEFAULT_IMAGE: &str = "oksii/etlegacy:latest";

/// Branch the configs are fetched from when stats submission is enabled.
pub const STATS_SETTINGS_BRANCH: &str = "etl-stats-api";

const fn descriptor(
    key: &'static str,
    category: Category,
    default: &'static str,
    placeholder: Option<&'static str>,
    per_instance: bool,
    secret: bool,
    prompt: &'static str,
) -> SettingDescriptor {
    SettingDescriptor {
        key,
        env: key,
        category,
        default,
        placeholder,
        per_instance,
        secret,
        prompt,
    }
}

pub const CATALOG: &[SettingDescriptor] = &[
    // Server
    descriptor("HOSTNAME", Category::Server, "ET Docker Server", Some("CONF_HOSTNAME"), true, false, "Server name"),
    descriptor("MAP_PORT", Category::Server, "27960", None, true, false, "UDP port"),
    descriptor("MAXCLIENTS", Category::Server, "32", None, true, false, "Maximum clients"),
    descriptor("STARTMAP", Category::Server, "radar", None, true, false, "Map loaded on startup"),
    descriptor("CONF_MOTD", Category::Server, "", Some("CONF_MOTD"), true, false, "Message of the day (\\n separates lines)"),
    descriptor("SVTRACKER", Category::Server, DEFAULT_TRACKER, None, false, false, "Tracker endpoint"),
    descriptor("ADDITIONAL_CLI_ARGS", Category::Server, "", None, true, false, "Extra server arguments"),
    descriptor("BASEPATH", Category::Server, "/legacy/server", None, false, false, "Server base path"),
    descriptor("HOMEPATH", Category::Server, "/legacy/homepath", None, false, false, "Server home path"),
    descriptor("SERVER_BINARY", Category::Server, "etlded", None, false, false, "Server binary"),
    // Passwords
    descriptor("PASSWORD", Category::Passwords, "", Some("CONF_PASSWORD"), true, true, "Server password (empty for public)"),
    descriptor("RCONPASSWORD", Category::Passwords, "", Some("CONF_RCONPASSWORD"), true, true, "RCON password (empty disables RCON)"),
    descriptor("REFEREEPASSWORD", Category::Passwords, "", Some("CONF_REFEREEPASSWORD"), true, true, "Referee password (empty disables referee)"),
    descriptor("SCPASSWORD", Category::Passwords, "", Some("CONF_SCPASSWORD"), true, true, "Shoutcaster password (empty disables shoutcaster)"),
    descriptor("ETLTV_PASSWORD", Category::Passwords, DEFAULT_ETLTV_PASSWORD, Some("CONF_ETLTVPASSWORD"), true, true, "ETLTV password"),
    // Maps
    descriptor("MAPS", Category::Maps, "radar:supply:sw_goldrush_te:bremen_b3:frostbite:adlernest:et_ice:braundorf_b4:erdenberg_t2:et_beach", None, false, false, "Maps (colon separated)"),
    descriptor("REDIRECTURL", Category::Maps, "https://dl.etl.lol/maps/et", Some("CONF_REDIRECTURL"), false, false, "Map download URL"),
    descriptor("MAPSDIR", Category::Maps, "/maps", None, false, false, "Local map cache"),
    // Configs
    descriptor("SETTINGSURL", Category::Configs, "https://github.com/Oksii/legacy-configs.git", None, false, false, "Config repository"),
    descriptor("SETTINGSBRANCH", Category::Configs, "main", None, false, false, "Config repository branch"),
    descriptor("SERVERCONF", Category::Configs, "legacy6", Some("CONF_SERVERCONF"), true, false, "Config executed after startup"),
    // Stats
    descriptor("STATS_SUBMIT", Category::Stats, "false", None, false, false, "Submit match stats"),
    descriptor("STATS_API_TOKEN", Category::Stats, "", Some("CONF_STATS_API_TOKEN"), false, true, "Stats API token"),
    descriptor("STATS_API_URL", Category::Stats, "https://api.etl.lol/api/v2/stats/etl/matches/stats/submit", Some("CONF_STATS_API_URL"), false, false, "Stats API URL"),
    // Services
    descriptor("IMAGE", Category::Services, DEFAULT_IMAGE, None, false, false, "Docker image"),
    descriptor("SERVER_COUNT", Category::Services, "1", None, false, false, "Number of servers"),
    descriptor("ENABLE_WATCHTOWER", Category::Services, "false", None, false, false, "Enable automatic image updates"),
    descriptor("ENABLE_MAP_SERVER", Category::Services, "false", None, false, false, "Serve maps over HTTP"),
    descriptor("MAP_SERVER_PORT", Category::Services, "8080", None, false, false, "Map server port"),
];

pub fn lookup(key: &str) -> Option<&'static SettingDescriptor> {
    CATALOG.iter().find(|d| d.key == key)
}

/// Truthy values accepted for boolean settings.
pub fn is_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "y"
    )
}
