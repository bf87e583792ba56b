// Process launcher - builds the server command line and runs it

use crate::render::SERVER_CONFIG;
use crate::settings::{SettingsStore, DEFAULT_TRACKER};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for server process: {0}")]
    Wait(#[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchPlan {
    /// Argument order is fixed; values are passed through as-is.
    pub fn from_store(store: &SettingsStore) -> Self {
        let get = |key: &str, default: &str| store.resolve(key, None, default);

        let basepath = get("BASEPATH", "/legacy/server");
        let homepath = get("HOMEPATH", "/legacy/homepath");
        let program = Path::new(&basepath).join(get("SERVER_BINARY", "etlded"));

        let mut args: Vec<String> = Vec::new();
        let mut set = |cvar: &str, value: String| {
            args.extend(["+set".to_string(), cvar.to_string(), value]);
        };
        set("sv_maxclients", get("MAXCLIENTS", "32"));
        set("net_port", get("MAP_PORT", "27960"));
        set("fs_basepath", basepath.clone());
        set("fs_homepath", homepath);
        set("sv_tracker", get("SVTRACKER", DEFAULT_TRACKER));

        args.extend(["+exec".to_string(), SERVER_CONFIG.to_string()]);
        args.extend(["+map".to_string(), get("STARTMAP", "radar")]);
        args.extend(passthrough_args(&get("ADDITIONAL_CLI_ARGS", "")));

        Self {
            program,
            args,
            working_dir: PathBuf::from(basepath),
        }
    }

    pub fn command_line(&self) -> String {
        let mut words = vec![self.program.to_string_lossy().to_string()];
        words.extend(self.args.iter().cloned());
        shell_words::join(words)
    }

    fn command(&self) -> std::process::Command {
        let mut command = std::process::Command::new(&self.program);
        command.args(&self.args);
        if self.working_dir.is_dir() {
            command.current_dir(&self.working_dir);
        }
        command
    }

    /// Replace this process with the server, so signals sent to the
    /// container reach it directly. Only returns if the exec failed.
    #[cfg(unix)]
    pub fn exec(&self) -> LaunchError {
        use std::os::unix::process::CommandExt;

        tracing::info!("Starting server: {}", self.command_line());
        let source = self.command().exec();
        LaunchError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Run the server as a child with inherited stdio and wait for it.
    pub async fn run(&self) -> Result<ExitStatus, LaunchError> {
        tracing::info!("Starting server: {}", self.command_line());

        let mut child = tokio::process::Command::from(self.command())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let status = child.wait().await.map_err(LaunchError::Wait)?;
        tracing::info!("Server exited with {}", status);
        Ok(status)
    }
}

/// Split operator-supplied arguments shell style; unbalanced quotes fall back
/// to whitespace splitting.
fn passthrough_args(raw: &str) -> Vec<String> {
    match shell_words::split(raw) {
        Ok(words) => words,
        Err(e) => {
            tracing::warn!("ADDITIONAL_CLI_ARGS is not valid shell syntax ({}), splitting on whitespace", e);
            raw.split_whitespace().map(str::to_string).collect()
        }
    }
}
