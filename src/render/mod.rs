mod flavor;
mod template;

pub use flavor::{
    placeholders_from, ConfigFlavor, ConfigPlan, ConfigSource, TemplateSpec, SERVER_CONFIG,
    STATS_SCRIPT,
};
pub use template::{
    motd_lines, LuaModuleHook, PasswordHook, RenderError, RenderHook, Renderer, Template,
    UnknownPlaceholder, MOTD_SLOTS,
};
