use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "etl-anywhere", version, about = "Provision and run ET:Legacy servers in Docker")]
pub struct Cli {
    /// Install directory holding settings.env and docker-compose.yml
    #[arg(long, global = true, env = "ETL_INSTALL_DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Container entrypoint: render configs, fetch maps and run the server
    Entrypoint(EntrypointOpts),

    /// Create settings, compose file and directories for one or more servers
    Install(InstallOpts),

    /// Regenerate docker-compose.yml from settings.env
    Compose,

    /// Render a single template against the settings file
    Render(RenderOpts),

    /// Download the configured maps into a directory
    FetchMaps(FetchMapsOpts),

    /// Start server containers
    Start(InstanceOpt),

    /// Stop server containers
    Stop(InstanceOpt),

    /// Restart server containers
    Restart(InstanceOpt),

    /// Show container state, port and player count
    Status(StatusOpts),

    /// Show server log output
    Logs(LogsOpts),

    /// Send an rcon command to a server
    Rcon(RconOpts),

    /// Pull the image and recreate server containers
    Update(UpdateOpts),
}

#[derive(Args, Clone, Debug, Default)]
pub struct EntrypointOpts {
    /// Keep the existing rendered configs instead of fetching new ones
    #[arg(long)]
    pub skip_configs: bool,

    /// Don't fetch maps
    #[arg(long)]
    pub skip_maps: bool,

    /// Print the server command line instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Debug, Default)]
pub struct InstallOpts {
    /// Number of servers (1-10)
    #[arg(long, short = 'n')]
    pub instances: Option<u8>,

    /// Accept defaults and environment values without prompting
    #[arg(long, short = 'y')]
    pub non_interactive: bool,

    /// Docker image to run
    #[arg(long)]
    pub image: Option<String>,

    /// Add a watchtower service for automatic image updates
    #[arg(long)]
    pub watchtower: bool,

    /// Add an HTTP map server on this port
    #[arg(long)]
    pub map_server: Option<u16>,

    /// Owner (uid:gid) of the created directories
    #[arg(long)]
    pub owner: Option<String>,

    /// Never change ownership of the created directories
    #[arg(long, conflicts_with = "owner")]
    pub no_chown: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RenderOpts {
    /// Template file
    pub template: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Render with the values of this instance
    #[arg(long, short)]
    pub instance: Option<u8>,

    /// Leave unknown placeholders in place instead of blanking them
    #[arg(long)]
    pub keep_unknown: bool,
}

#[derive(Args, Clone, Debug)]
pub struct FetchMapsOpts {
    /// Directory the maps are written to
    #[arg(long, short)]
    pub target: PathBuf,

    /// Local directory checked before downloading
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Download root (defaults to REDIRECTURL)
    #[arg(long)]
    pub url: Option<String>,

    /// Concurrent downloads
    #[arg(long, default_value_t = crate::assets::FETCH_WORKERS)]
    pub workers: usize,

    /// Maps to fetch (defaults to MAPS)
    pub maps: Vec<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct InstanceOpt {
    /// Server number; all servers when omitted
    pub instance: Option<u8>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct StatusOpts {
    /// Server number; all servers when omitted
    pub instance: Option<u8>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct LogsOpts {
    /// Server number
    #[arg(default_value_t = 1)]
    pub instance: u8,

    /// Number of lines to show
    #[arg(short, default_value_t = 100)]
    pub n: u32,

    /// Follow the log
    #[arg(short)]
    pub f: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RconOpts {
    /// Optional server number followed by the command, e.g. `rcon 2 map supply`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub words: Vec<String>,
}

impl RconOpts {
    /// Split a leading server number off the command words. Defaults to
    /// server 1.
    pub fn target(&self) -> (u8, String) {
        match self.words.split_first() {
            Some((first, rest)) if !rest.is_empty() => match first.parse::<u8>() {
                Ok(n) => (n, rest.join(" ")),
                Err(_) => (1, self.words.join(" ")),
            },
            _ => (1, self.words.join(" ")),
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct UpdateOpts {
    /// Server number; all servers when omitted
    pub instance: Option<u8>,

    /// Update even when players are connected
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rcon(words: &[&str]) -> RconOpts {
        RconOpts {
            words: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    fn test_rcon_target() {
        assert_eq!(rcon(&["2", "map", "supply"]).target(), (2, "map supply".to_string()));
        assert_eq!(rcon(&["status"]).target(), (1, "status".to_string()));
        assert_eq!(rcon(&["kick", "all"]).target(), (1, "kick all".to_string()));
        // A lone number is a command, not a server
        assert_eq!(rcon(&["3"]).target(), (1, "3".to_string()));
    }

    #[test]
    fn test_parse_update_force() {
        let cli = Cli::try_parse_from(["etl-anywhere", "update", "2", "--force"]).unwrap();
        match cli.command {
            Command::Update(opts) => {
                assert_eq!(opts.instance, Some(2));
                assert!(opts.force);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_parse_global_dir() {
        let cli = Cli::try_parse_from(["etl-anywhere", "status", "--dir", "/srv/etl"]).unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/srv/etl")));
    }
}
