mod catalog;
mod store;

pub use catalog::{
    is_enabled, lookup, Category, Scope, SettingDescriptor, CATALOG, DEFAULT_ETLTV_PASSWORD,
    DEFAULT_IMAGE, DEFAULT_TRACKER, STATS_SETTINGS_BRANCH,
};
pub use store::{escape_value, unescape_value, Setting, SettingsError, SettingsStore};
