// Error - top-level error for the command handlers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    #[error(transparent)]
    Fetch(#[from] crate::assets::FetchError),

    #[error(transparent)]
    Compose(#[from] crate::compose::ComposeError),

    #[error(transparent)]
    Launch(#[from] crate::launcher::LaunchError),

    #[error(transparent)]
    Docker(#[from] crate::docker::DockerError),

    #[error(transparent)]
    Rcon(#[from] crate::rcon::RconError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("No settings found at {0:?}; run `etl-anywhere install` first")]
    NotInstalled(std::path::PathBuf),

    #[error("Server {ordinal} does not exist ({count} configured)")]
    UnknownInstance { ordinal: u8, count: u8 },

    #[error("{0}")]
    Refused(String),

    #[error("`{command}` failed: {reason}")]
    External { command: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
