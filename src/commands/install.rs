// Install - provision settings, compose file and directories on the host

use crate::cli::InstallOpts;
use crate::compose::{
    non_empty, running_as_root, scaffold, AddOns, ComposeFile, Credentials,
    InstanceComposer, InstanceSpec, Ownership, MAX_INSTANCES,
};
use crate::error::{Error, Result};
use crate::paths;
use crate::settings::{is_enabled, lookup, Category, Scope, SettingsStore, CATALOG};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Answers accepted before a question gives up.
const MAX_ATTEMPTS: usize = 5;
/// Answer that clears a value instead of keeping the default.
const CLEAR: &str = "-";

/// Global settings asked for on every install, in order.
const GLOBAL_QUESTIONS: &[&str] = &[
    "HOSTNAME",
    "MAXCLIENTS",
    "STARTMAP",
    "CONF_MOTD",
    "MAPS",
    "REDIRECTURL",
    "SERVERCONF",
];

pub trait Prompt {
    /// Ask a question; an empty answer means `default`.
    fn ask(&mut self, question: &str, default: &str) -> io::Result<String>;

    fn say(&mut self, message: &str);

    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool> {
        let answer = self.ask(&format!("{} (y/n)", question), if default { "y" } else { "n" })?;
        Ok(is_enabled(&answer))
    }
}

/// Reads answers from stdin.
pub struct TerminalPrompt {
    stdin: io::Stdin,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for TerminalPrompt {
    fn ask(&mut self, question: &str, default: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        if default.is_empty() {
            write!(stdout, "{}: ", question)?;
        } else {
            write!(stdout, "{} [{}]: ", question, default)?;
        }
        stdout.flush()?;

        let mut line = String::new();
        if self.stdin.lock().read_line(&mut line)? == 0 {
            return Ok(default.to_string());
        }
        let answer = line.trim();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        })
    }

    fn say(&mut self, message: &str) {
        println!("{}", message);
    }
}

/// Takes every default; used for non-interactive installs.
pub struct DefaultsPrompt;

impl Prompt for DefaultsPrompt {
    fn ask(&mut self, question: &str, default: &str) -> io::Result<String> {
        tracing::debug!("{} -> {:?}", question, default);
        Ok(default.to_string())
    }

    fn say(&mut self, message: &str) {
        tracing::info!("{}", message);
    }
}

#[derive(Debug, Clone)]
pub struct InstallSummary {
    pub dir: PathBuf,
    pub settings: PathBuf,
    pub compose: PathBuf,
    pub services: Vec<String>,
    pub directories: usize,
    pub ownership: Option<Ownership>,
}

pub fn execute(dir: &Path, opts: InstallOpts) -> Result<()> {
    let summary = if opts.non_interactive {
        run(dir, &opts, &mut DefaultsPrompt, env_override)?
    } else {
        run(dir, &opts, &mut TerminalPrompt::new(), env_override)?
    };

    println!("Settings written to {}", summary.settings.display());
    println!("Compose file written to {}", summary.compose.display());
    println!("Services: {}", summary.services.join(", "));
    if let Some(owner) = summary.ownership {
        println!("Directories owned by {}:{}", owner.uid, owner.gid);
    }
    println!(
        "Start the servers with: docker compose -f {} up -d",
        summary.compose.display()
    );
    Ok(())
}

/// Environment overrides for install. `HOSTNAME` is skipped: on the host it
/// holds the machine name, not a server name.
fn env_override(name: &str) -> Option<String> {
    if name == "HOSTNAME" {
        return None;
    }
    std::env::var(name).ok()
}

pub fn run<F>(dir: &Path, opts: &InstallOpts, prompt: &mut dyn Prompt, env: F) -> Result<InstallSummary>
where
    F: Fn(&str) -> Option<String>,
{
    std::fs::create_dir_all(dir)?;
    let settings_path = paths::settings_path(dir);
    let mut store = SettingsStore::load(&settings_path)?;
    seed_defaults(&mut store, &env);
    apply_flags(&mut store, opts);

    for key in GLOBAL_QUESTIONS {
        ask_setting(prompt, &mut store, key)?;
    }
    if opts.image.is_none() {
        ask_setting(prompt, &mut store, "IMAGE")?;
    }
    if ask_flag(prompt, &mut store, "STATS_SUBMIT")? {
        ask_setting(prompt, &mut store, "STATS_API_TOKEN")?;
    }
    if !opts.watchtower {
        ask_flag(prompt, &mut store, "ENABLE_WATCHTOWER")?;
    }
    if opts.map_server.is_none() && ask_flag(prompt, &mut store, "ENABLE_MAP_SERVER")? {
        ask_map_server_port(prompt, &mut store)?;
    }

    let count = match opts.instances {
        Some(count) => count,
        None => ask_count(prompt, &store)?,
    };
    let mut composer = InstanceComposer::new(count)?;

    for ordinal in 1..=count {
        prompt.say(&format!("Server {} of {}", ordinal, count));
        let port = ask_port(prompt, &composer, &store, ordinal)?;
        let default_name = store
            .lookup("HOSTNAME", Scope::Instance(ordinal))
            .map(str::to_string)
            .unwrap_or_else(|| composer.default_name(&store, ordinal));
        let name = prompt.ask(question_for("HOSTNAME"), &default_name)?;
        let credentials = Credentials {
            password: ask_credential(prompt, &store, ordinal, "PASSWORD")?,
            rcon: ask_credential(prompt, &store, ordinal, "RCONPASSWORD")?,
            referee: ask_credential(prompt, &store, ordinal, "REFEREEPASSWORD")?,
            shoutcaster: ask_credential(prompt, &store, ordinal, "SCPASSWORD")?,
        };
        composer.add(InstanceSpec {
            ordinal,
            port,
            name,
            credentials,
        })?;
    }

    composer.write_settings(&mut store)?;
    store.save()?;

    let ownership = resolve_ownership(opts, dir)?;
    let created = scaffold(dir, count, ownership)?;

    let compose_path = paths::compose_path(dir);
    let compose = ComposeFile::build(&composer, &store, dir, &AddOns::from_store(&store));
    compose.write(&compose_path)?;

    tracing::info!("Installed {} server(s) in {:?}", count, dir);
    Ok(InstallSummary {
        dir: dir.to_path_buf(),
        settings: settings_path,
        compose: compose_path,
        services: compose.services.iter().map(|(name, _)| name.clone()).collect(),
        directories: created.len(),
        ownership,
    })
}

/// Fill every global catalog key the settings file doesn't have yet.
fn seed_defaults<F>(store: &mut SettingsStore, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    for desc in CATALOG {
        if store.lookup(desc.key, Scope::Global).is_none() {
            let value = env(desc.env).unwrap_or_else(|| desc.default.to_string());
            store.set(desc.category.clone(), desc.key, &value, Scope::Global);
        }
    }
}

fn apply_flags(store: &mut SettingsStore, opts: &InstallOpts) {
    if let Some(image) = &opts.image {
        store.set(Category::Services, "IMAGE", image, Scope::Global);
    }
    if opts.watchtower {
        store.set(Category::Services, "ENABLE_WATCHTOWER", "true", Scope::Global);
    }
    if let Some(port) = opts.map_server {
        store.set(Category::Services, "ENABLE_MAP_SERVER", "true", Scope::Global);
        store.set(Category::Services, "MAP_SERVER_PORT", &port.to_string(), Scope::Global);
    }
}

fn category_of(key: &str) -> Category {
    lookup(key)
        .map(|d| d.category.clone())
        .unwrap_or_else(|| Category::Custom("Misc".to_string()))
}

fn question_for(key: &str) -> &'static str {
    lookup(key).map(|d| d.prompt).unwrap_or("Value")
}

fn ask_setting(prompt: &mut dyn Prompt, store: &mut SettingsStore, key: &str) -> Result<()> {
    let current = store.resolve(key, None, "");
    let answer = prompt.ask(question_for(key), &current)?;
    let value = if answer == CLEAR { "" } else { answer.as_str() };
    store.set(category_of(key), key, value, Scope::Global);
    Ok(())
}

fn ask_flag(prompt: &mut dyn Prompt, store: &mut SettingsStore, key: &str) -> Result<bool> {
    let current = is_enabled(&store.resolve(key, None, "false"));
    let enabled = prompt.confirm(question_for(key), current)?;
    store.set(category_of(key), key, if enabled { "true" } else { "false" }, Scope::Global);
    Ok(enabled)
}

fn ask_map_server_port(prompt: &mut dyn Prompt, store: &mut SettingsStore) -> Result<()> {
    let current = store.resolve("MAP_SERVER_PORT", None, "8080");
    for _ in 0..MAX_ATTEMPTS {
        let answer = prompt.ask(question_for("MAP_SERVER_PORT"), &current)?;
        match answer.trim().parse::<u16>() {
            Ok(port) if port > 0 => {
                store.set(Category::Services, "MAP_SERVER_PORT", &port.to_string(), Scope::Global);
                return Ok(());
            }
            _ => prompt.say(&format!("{:?} is not a valid port", answer)),
        }
    }
    Err(Error::Input("no valid map server port given".to_string()))
}

fn ask_count(prompt: &mut dyn Prompt, store: &SettingsStore) -> Result<u8> {
    let current = store.resolve("SERVER_COUNT", None, "1");
    let question = format!("{} (1-{})", question_for("SERVER_COUNT"), MAX_INSTANCES);
    for _ in 0..MAX_ATTEMPTS {
        let answer = prompt.ask(&question, &current)?;
        match answer.trim().parse::<u8>() {
            Ok(n) if (1..=MAX_INSTANCES).contains(&n) => return Ok(n),
            _ => prompt.say(&format!("Enter a number between 1 and {}", MAX_INSTANCES)),
        }
    }
    Err(Error::Input("no valid server count given".to_string()))
}

/// Ports are checked as they are entered, so a bad one is asked again rather
/// than failing the whole install.
fn ask_port(
    prompt: &mut dyn Prompt,
    composer: &InstanceComposer,
    store: &SettingsStore,
    ordinal: u8,
) -> Result<u16> {
    let suggested = store
        .lookup("MAP_PORT", Scope::Instance(ordinal))
        .and_then(|p| p.trim().parse::<u32>().ok())
        .and_then(|p| composer.validate_port(ordinal, p).ok())
        .unwrap_or_else(|| composer.default_port(ordinal));

    for _ in 0..MAX_ATTEMPTS {
        let answer = prompt.ask(question_for("MAP_PORT"), &suggested.to_string())?;
        let checked = answer
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("{:?} is not a number", answer))
            .and_then(|p| composer.validate_port(ordinal, p).map_err(|e| e.to_string()));
        match checked {
            Ok(port) => return Ok(port),
            Err(reason) => prompt.say(&reason),
        }
    }
    Err(Error::Input(format!("no valid port given for server {}", ordinal)))
}

/// Existing per-instance value, else the global one. `-` clears it, which
/// disables that access mode.
fn ask_credential(
    prompt: &mut dyn Prompt,
    store: &SettingsStore,
    ordinal: u8,
    key: &str,
) -> Result<Option<String>> {
    let current = store.resolve(key, Some(ordinal), "");
    let question = format!("{} ('{}' to clear)", question_for(key), CLEAR);
    let answer = prompt.ask(&question, &current)?;
    if answer == CLEAR {
        return Ok(None);
    }
    Ok(non_empty(answer))
}

fn resolve_ownership(opts: &InstallOpts, dir: &Path) -> Result<Option<Ownership>> {
    if opts.no_chown {
        return Ok(None);
    }
    if let Some(owner) = &opts.owner {
        return Ownership::parse(owner)
            .map(Some)
            .ok_or_else(|| Error::Input(format!("owner must be uid:gid, got {:?}", owner)));
    }
    // Only root can hand directories to the container user
    if running_as_root(dir) {
        Ok(Some(Ownership::container_user()))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    /// Answers questions containing a key, in order; anything unscripted
    /// takes its default.
    struct ScriptedPrompt {
        answers: Vec<(&'static str, VecDeque<&'static str>)>,
        said: Vec<String>,
    }

    impl ScriptedPrompt {
        fn new(script: &[(&'static str, &[&'static str])]) -> Self {
            Self {
                answers: script
                    .iter()
                    .map(|(k, a)| (*k, a.iter().copied().collect()))
                    .collect(),
                said: Vec::new(),
            }
        }
    }

    impl Prompt for ScriptedPrompt {
        fn ask(&mut self, question: &str, default: &str) -> io::Result<String> {
            for (key, queue) in self.answers.iter_mut() {
                if question.contains(*key) {
                    if let Some(answer) = queue.pop_front() {
                        return Ok(answer.to_string());
                    }
                }
            }
            Ok(default.to_string())
        }

        fn say(&mut self, message: &str) {
            self.said.push(message.to_string());
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn opts(instances: Option<u8>) -> InstallOpts {
        InstallOpts {
            instances,
            no_chown: true,
            ..Default::default()
        }
    }

    fn saved_values(dir: &Path) -> HashMap<String, String> {
        let content = std::fs::read_to_string(paths::settings_path(dir)).unwrap();
        content
            .lines()
            .filter(|l| !l.starts_with('#'))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_non_interactive_three_servers() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run(dir.path(), &opts(Some(3)), &mut DefaultsPrompt, no_env).unwrap();

        assert_eq!(summary.services, vec!["etl-server1", "etl-server2", "etl-server3"]);
        let values = saved_values(dir.path());
        assert_eq!(values["SERVER_COUNT"], "3");
        assert_eq!(values["SERVER1_MAP_PORT"], "27960");
        assert_eq!(values["SERVER2_MAP_PORT"], "27961");
        assert_eq!(values["SERVER3_MAP_PORT"], "27962");
        assert_eq!(values["SERVER2_HOSTNAME"], "ET Docker Server #2");
        assert!(dir.path().join("logs").join("server3").is_dir());

        let compose = std::fs::read_to_string(paths::compose_path(dir.path())).unwrap();
        assert!(compose.contains("27962:27962/udp"));
    }

    #[test]
    fn test_bad_ports_are_asked_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ScriptedPrompt::new(&[("UDP port", &["80", "27970", "27970"])]);
        run(dir.path(), &opts(Some(2)), &mut prompt, no_env).unwrap();

        let values = saved_values(dir.path());
        assert_eq!(values["SERVER1_MAP_PORT"], "27970");
        assert_eq!(values["SERVER2_MAP_PORT"], "27961");
        assert!(prompt.said.iter().any(|m| m.contains("outside")));
        assert!(prompt.said.iter().any(|m| m.contains("already used")));
    }

    #[test]
    fn test_gives_up_after_repeated_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ScriptedPrompt::new(&[("UDP port", &["1", "2", "3", "4", "5"])]);
        let result = run(dir.path(), &opts(Some(1)), &mut prompt, no_env);
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[test]
    fn test_credentials_stay_per_instance() {
        let dir = tempfile::tempdir().unwrap();
        let env = |name: &str| (name == "RCONPASSWORD").then(|| "global".to_string());
        let mut prompt = ScriptedPrompt::new(&[("RCON password", &["first", CLEAR])]);
        run(dir.path(), &opts(Some(2)), &mut prompt, env).unwrap();

        let values = saved_values(dir.path());
        assert_eq!(values["SERVER1_RCONPASSWORD"], "first");
        assert_eq!(values["SERVER2_RCONPASSWORD"], "");

        let compose = std::fs::read_to_string(paths::compose_path(dir.path())).unwrap();
        assert!(compose.contains("RCONPASSWORD: first"));
        assert!(!compose.contains("RCONPASSWORD: global"));
    }

    #[test]
    fn test_interactive_count_and_addons() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ScriptedPrompt::new(&[
            ("Number of servers", &["0", "2"]),
            ("Serve maps", &["y"]),
            ("Map server port", &["8081"]),
        ]);
        let summary = run(dir.path(), &InstallOpts { no_chown: true, ..Default::default() }, &mut prompt, no_env)
            .unwrap();

        assert_eq!(summary.services, vec!["etl-server1", "etl-server2", "etl-maps"]);
        let values = saved_values(dir.path());
        assert_eq!(values["MAP_SERVER_PORT"], "8081");
    }

    #[test]
    fn test_rerun_keeps_existing_answers() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ScriptedPrompt::new(&[("UDP port", &["28000"]), ("Server name", &["Clan Wars"])]);
        run(dir.path(), &opts(Some(1)), &mut prompt, no_env).unwrap();

        run(dir.path(), &opts(Some(1)), &mut DefaultsPrompt, no_env).unwrap();
        let values = saved_values(dir.path());
        assert_eq!(values["SERVER1_MAP_PORT"], "28000");
        assert_eq!(values["SERVER1_HOSTNAME"], "Clan Wars");
    }

    #[test]
    fn test_owner_flag_must_parse() {
        let dir = tempfile::tempdir().unwrap();
        let opts = InstallOpts {
            owner: Some("nobody".to_string()),
            ..Default::default()
        };
        assert!(matches!(resolve_ownership(&opts, dir.path()), Err(Error::Input(_))));
    }
}
