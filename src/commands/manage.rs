// Manage - day to day operation of an installed deployment

use crate::cli::{InstanceOpt, LogsOpts, RconOpts, StatusOpts, UpdateOpts};
use crate::compose::{service_name, InstanceComposer, InstanceSpec};
use crate::docker::{DockerManager, ServerStatus};
use crate::error::{Error, Result};
use crate::paths;
use crate::rcon::{active_players, strip_colors, RconClient};
use crate::settings::{SettingsStore, DEFAULT_IMAGE};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long `status` and `update` wait for a server to answer getstatus.
const QUERY_TIMEOUT: Duration = Duration::from_millis(1500);

/// An installed deployment: its settings and the instances they describe.
pub struct Deployment {
    dir: PathBuf,
    store: SettingsStore,
    composer: InstanceComposer,
}

impl Deployment {
    pub fn load(dir: &Path) -> Result<Self> {
        let store = super::load_installed(dir)?;
        let composer = InstanceComposer::from_store(&store)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            store,
            composer,
        })
    }

    /// The requested instance, or every instance when none is given.
    pub fn targets(&self, instance: Option<u8>) -> Result<Vec<&InstanceSpec>> {
        let instances = self.composer.instances();
        match instance {
            None => Ok(instances.iter().collect()),
            Some(n) => instances
                .iter()
                .find(|i| i.ordinal == n)
                .map(|i| vec![i])
                .ok_or(Error::UnknownInstance {
                    ordinal: n,
                    count: self.composer.count(),
                }),
        }
    }

    fn rcon_password(&self, spec: &InstanceSpec) -> String {
        spec.credentials.rcon.clone().unwrap_or_default()
    }

    fn image(&self) -> String {
        self.store.resolve("IMAGE", None, DEFAULT_IMAGE)
    }
}

/// Connect and make sure the daemon answers before touching containers.
async fn connect() -> Result<DockerManager> {
    let docker = DockerManager::new().await?;
    docker.ping().await?;
    Ok(docker)
}

fn query_addr(spec: &InstanceSpec) -> SocketAddr {
    ([127, 0, 0, 1], spec.port).into()
}

pub async fn start(dir: &Path, opts: InstanceOpt) -> Result<()> {
    let deployment = Deployment::load(dir)?;
    let docker = connect().await?;
    for spec in deployment.targets(opts.instance)? {
        docker.start_container(&service_name(spec.ordinal)).await?;
        println!("Started {}", service_name(spec.ordinal));
    }
    Ok(())
}

pub async fn stop(dir: &Path, opts: InstanceOpt) -> Result<()> {
    let deployment = Deployment::load(dir)?;
    let docker = connect().await?;
    for spec in deployment.targets(opts.instance)? {
        docker.stop_container(&service_name(spec.ordinal)).await?;
        println!("Stopped {}", service_name(spec.ordinal));
    }
    Ok(())
}

pub async fn restart(dir: &Path, opts: InstanceOpt) -> Result<()> {
    let deployment = Deployment::load(dir)?;
    let docker = connect().await?;
    for spec in deployment.targets(opts.instance)? {
        docker.restart_container(&service_name(spec.ordinal)).await?;
        println!("Restarted {}", service_name(spec.ordinal));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub ordinal: u8,
    pub service: String,
    pub name: String,
    pub port: u16,
    pub status: ServerStatus,
    pub players: Option<usize>,
    pub map: Option<String>,
}

pub async fn status(dir: &Path, opts: StatusOpts) -> Result<()> {
    let deployment = Deployment::load(dir)?;
    let docker = connect().await?;

    let mut rows = Vec::new();
    for spec in deployment.targets(opts.instance)? {
        let service = service_name(spec.ordinal);
        let status = docker
            .get_container_status(&service)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to inspect {}: {}", service, e);
                ServerStatus::Error
            });

        let (players, map) = if status == ServerStatus::Running {
            match RconClient::new(query_addr(spec)).with_timeout(QUERY_TIMEOUT).status().await {
                Ok(info) => (Some(active_players(&info)), info.cvar("mapname").map(str::to_string)),
                Err(e) => {
                    tracing::debug!("{} did not answer getstatus: {}", service, e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        rows.push(InstanceStatus {
            ordinal: spec.ordinal,
            service,
            name: spec.name.clone(),
            port: spec.port,
            status,
            players,
            map,
        });
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", status_table(&rows));
    }
    Ok(())
}

fn status_table(rows: &[InstanceStatus]) -> String {
    let mut out = format!(
        "{:<14} {:<6} {:<9} {:<8} {:<14} {}\n",
        "SERVICE", "PORT", "STATUS", "PLAYERS", "MAP", "NAME"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<14} {:<6} {:<9} {:<8} {:<14} {}\n",
            row.service,
            row.port,
            row.status.to_string(),
            row.players.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            row.map.as_deref().unwrap_or("-"),
            strip_colors(&row.name)
        ));
    }
    out
}

pub async fn logs(dir: &Path, opts: LogsOpts) -> Result<()> {
    let deployment = Deployment::load(dir)?;
    let spec = deployment.targets(Some(opts.instance))?[0];
    let service = service_name(spec.ordinal);
    let docker = connect().await?;

    if opts.f {
        docker.follow_logs(&service, opts.n, |line| println!("{}", line)).await?;
    } else {
        for line in docker.get_logs(&service, opts.n).await? {
            println!("{}", line);
        }
    }
    Ok(())
}

pub async fn rcon(dir: &Path, opts: RconOpts) -> Result<()> {
    let deployment = Deployment::load(dir)?;
    let (ordinal, command) = opts.target();
    let spec = deployment.targets(Some(ordinal))?[0];

    let reply = RconClient::new(query_addr(spec))
        .command(&deployment.rcon_password(spec), &command)
        .await?;
    for line in reply.lines() {
        println!("{}", strip_colors(line));
    }
    Ok(())
}

/// Split update targets into those that may be recreated and those that
/// still have players. Servers that didn't answer count as empty.
fn partition_for_update(counts: &[(u8, Option<usize>)], force: bool) -> (Vec<u8>, Vec<(u8, usize)>) {
    let mut allowed = Vec::new();
    let mut busy = Vec::new();
    for (ordinal, players) in counts {
        match players {
            Some(n) if *n > 0 && !force => busy.push((*ordinal, *n)),
            _ => allowed.push(*ordinal),
        }
    }
    (allowed, busy)
}

pub async fn update(dir: &Path, opts: UpdateOpts) -> Result<()> {
    let deployment = Deployment::load(dir)?;
    let targets = deployment.targets(opts.instance)?;

    let mut counts = Vec::new();
    for spec in &targets {
        let players = if opts.force {
            None
        } else {
            RconClient::new(query_addr(spec))
                .with_timeout(QUERY_TIMEOUT)
                .status()
                .await
                .ok()
                .map(|info| active_players(&info))
        };
        counts.push((spec.ordinal, players));
    }

    let (allowed, busy) = partition_for_update(&counts, opts.force);
    for (ordinal, players) in &busy {
        tracing::warn!(
            "Skipping {}: {} player(s) connected, use --force to update anyway",
            service_name(*ordinal),
            players
        );
    }

    if !allowed.is_empty() {
        let docker = connect().await?;
        docker.pull_image(&deployment.image()).await?;

        let services: Vec<String> = allowed.iter().map(|n| service_name(*n)).collect();
        compose_up(&paths::compose_path(&deployment.dir), &services).await?;
        println!("Updated {}", services.join(", "));
    }

    if busy.is_empty() {
        Ok(())
    } else {
        let skipped: Vec<String> = busy
            .iter()
            .map(|(n, p)| format!("{} ({} players)", service_name(*n), p))
            .collect();
        Err(Error::Refused(format!(
            "not updated while players are connected: {}",
            skipped.join(", ")
        )))
    }
}

/// Recreate `services` with `docker compose up -d`.
async fn compose_up(compose: &Path, services: &[String]) -> Result<()> {
    let mut command = tokio::process::Command::new("docker");
    command
        .arg("compose")
        .arg("-f")
        .arg(compose)
        .args(["up", "-d", "--no-deps"])
        .args(services);

    let shown = format!("docker compose -f {} up -d {}", compose.display(), services.join(" "));
    tracing::info!("Running: {}", shown);

    let output = command.output().await.map_err(|e| Error::External {
        command: shown.clone(),
        reason: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(Error::External {
            command: shown,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
