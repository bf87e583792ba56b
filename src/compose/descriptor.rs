// Compose descriptor - one service per instance plus optional add-on services

use crate::compose::instance::{ComposeError, InstanceComposer, InstanceSpec};
use crate::settings::{is_enabled, SettingsStore, DEFAULT_IMAGE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Settings every instance may override.
const INSTANCE_KEYS: &[&str] = &[
    "MAP_PORT",
    "HOSTNAME",
    "MAXCLIENTS",
    "STARTMAP",
    "CONF_MOTD",
    "PASSWORD",
    "RCONPASSWORD",
    "REFEREEPASSWORD",
    "SCPASSWORD",
    "ETLTV_PASSWORD",
    "SERVERCONF",
    "ADDITIONAL_CLI_ARGS",
];

/// Settings shared by every instance.
const SHARED_KEYS: &[&str] = &[
    "MAPS",
    "REDIRECTURL",
    "SETTINGSURL",
    "SETTINGSBRANCH",
    "SVTRACKER",
    "STATS_SUBMIT",
    "STATS_API_TOKEN",
    "STATS_API_URL",
];

pub const WATCHTOWER_IMAGE: &str = "containrrr/watchtower:latest";
pub const MAP_SERVER_IMAGE: &str = "nginx:alpine";
const WATCHTOWER_LABEL: &str = "com.centurylinklabs.watchtower.enable=true";

pub fn service_name(ordinal: u8) -> String {
    format!("etl-server{}", ordinal)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub restart: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stdin_open: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tty: bool,
}

/// Optional services appended to the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOns {
    pub watchtower: bool,
    /// Host port of the static map server.
    pub map_server: Option<u16>,
}

impl AddOns {
    pub fn from_store(store: &SettingsStore) -> Self {
        let map_server = if is_enabled(&store.resolve("ENABLE_MAP_SERVER", None, "false")) {
            let port = store.resolve("MAP_SERVER_PORT", None, "8080");
            match port.trim().parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    tracing::warn!("Invalid MAP_SERVER_PORT {:?}, map server disabled", port);
                    None
                }
            }
        } else {
            None
        };

        Self {
            watchtower: is_enabled(&store.resolve("ENABLE_WATCHTOWER", None, "false")),
            map_server,
        }
    }
}

/// A docker-compose file; services keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct ComposeFile {
    pub services: Vec<(String, Service)>,
}

impl ComposeFile {
    pub fn build(
        composer: &InstanceComposer,
        store: &SettingsStore,
        root: &Path,
        addons: &AddOns,
    ) -> Self {
        let image = store.resolve("IMAGE", None, DEFAULT_IMAGE);
        let mut services: Vec<(String, Service)> = composer
            .instances()
            .iter()
            .map(|spec| {
                (
                    service_name(spec.ordinal),
                    instance_service(spec, store, root, &image, addons),
                )
            })
            .collect();

        if addons.watchtower {
            services.push((
                "watchtower".to_string(),
                Service {
                    image: WATCHTOWER_IMAGE.to_string(),
                    container_name: Some("etl-watchtower".to_string()),
                    restart: "unless-stopped".to_string(),
                    volumes: vec!["/var/run/docker.sock:/var/run/docker.sock".to_string()],
                    command: Some("--label-enable --cleanup --interval 3600".to_string()),
                    ..Default::default()
                },
            ));
        }

        if let Some(port) = addons.map_server {
            services.push((
                "etl-maps".to_string(),
                Service {
                    image: MAP_SERVER_IMAGE.to_string(),
                    container_name: Some("etl-maps".to_string()),
                    restart: "unless-stopped".to_string(),
                    ports: vec![format!("{}:80/tcp", port)],
                    volumes: vec![format!(
                        "{}:/usr/share/nginx/html/etmain:ro",
                        path_str(&root.join("maps"))
                    )],
                    ..Default::default()
                },
            ));
        }

        Self { services }
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn to_yaml(&self) -> Result<String, ComposeError> {
        let mut services = serde_yaml::Mapping::new();
        for (name, service) in &self.services {
            services.insert(
                serde_yaml::Value::String(name.clone()),
                serde_yaml::to_value(service)?,
            );
        }
        let mut root = serde_yaml::Mapping::new();
        root.insert(
            serde_yaml::Value::String("services".to_string()),
            serde_yaml::Value::Mapping(services),
        );
        Ok(serde_yaml::to_string(&root)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ComposeError> {
        let yaml = self.to_yaml()?;
        let content = format!(
            "# Generated by etl-anywhere, regenerate with `etl-anywhere compose`\n{}",
            yaml
        );
        std::fs::write(path, content).map_err(|source| ComposeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Wrote compose file: {:?}", path);
        Ok(())
    }
}

/// Service for one instance, built only from that instance's scope and the
/// shared settings.
fn instance_service(
    spec: &InstanceSpec,
    store: &SettingsStore,
    root: &Path,
    image: &str,
    addons: &AddOns,
) -> Service {
    let mut environment = BTreeMap::new();

    for key in INSTANCE_KEYS {
        let value = store.resolve(key, Some(spec.ordinal), "");
        if !value.is_empty() {
            environment.insert(key.to_string(), value);
        }
    }
    for key in SHARED_KEYS {
        let value = store.resolve(key, None, "");
        if !value.is_empty() {
            environment.insert(key.to_string(), value);
        }
    }

    // Composer values win over whatever the store holds
    environment.insert("MAP_PORT".to_string(), spec.port.to_string());
    environment.insert("HOSTNAME".to_string(), spec.name.clone());
    for (key, value) in spec.credentials.entries() {
        match value {
            Some(v) => environment.insert(key.to_string(), v.to_string()),
            None => environment.remove(key),
        };
    }

    let logs = root.join("logs").join(format!("server{}", spec.ordinal));

    Service {
        image: image.to_string(),
        container_name: Some(service_name(spec.ordinal)),
        restart: "unless-stopped".to_string(),
        ports: vec![format!("{0}:{0}/udp", spec.port)],
        environment,
        volumes: vec![
            format!("{}:/maps:ro", path_str(&root.join("maps"))),
            format!("{}:/legacy/homepath/legacy/logs", path_str(&logs)),
        ],
        labels: if addons.watchtower {
            vec![WATCHTOWER_LABEL.to_string()]
        } else {
            Vec::new()
        },
        command: None,
        stdin_open: true,
        tty: true,
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
