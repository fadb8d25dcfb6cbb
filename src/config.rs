use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_RUNTIME: &str = "docker";
const DEFAULT_LOG_TAIL: usize = 200;
const DEFAULT_STREAM_POLL_MS: u64 = 100;
const MIN_STREAM_POLL_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub source: Option<String>,
    pub runtime: String,
    pub log_tail: usize,
    pub stream_poll_ms: u64,
    pub search_ignore_case: bool,
    pub search_regex: bool,
    pub aliases: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: None,
            runtime: DEFAULT_RUNTIME.to_string(),
            log_tail: DEFAULT_LOG_TAIL,
            stream_poll_ms: DEFAULT_STREAM_POLL_MS,
            search_ignore_case: true,
            search_regex: false,
            aliases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BerthConfigFile {
    #[serde(default)]
    runtime: Option<String>,
    #[serde(default)]
    log_tail: Option<usize>,
    #[serde(default, alias = "poll_ms")]
    stream_poll_ms: Option<u64>,
    #[serde(default)]
    search_ignore_case: Option<bool>,
    #[serde(default)]
    search_regex: Option<bool>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfigWatcher {
    path: Option<PathBuf>,
    pinned: bool,
    modified: Option<SystemTime>,
}

impl RuntimeConfigWatcher {
    pub fn discover() -> Self {
        Self {
            path: discover_config_path(),
            pinned: false,
            modified: None,
        }
    }

    /// Watches exactly `path` (from `--config`) and never rediscovers.
    pub fn pinned(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            pinned: true,
            modified: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load_current(&mut self) -> Result<Settings> {
        let Some(path) = self.path.clone() else {
            return Ok(Settings::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let settings = parse_settings(&raw, Some(path.display().to_string()))
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        self.modified = fs::metadata(&path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        Ok(settings)
    }

    /// `Ok(None)` when nothing changed since the last load.
    pub fn reload_if_changed(&mut self) -> Result<Option<Settings>> {
        let Some(current_path) = self.path.clone() else {
            if self.pinned {
                return Ok(None);
            }
            self.path = discover_config_path();
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(None);
        };

        if !current_path.exists() {
            let was_loaded = self.modified.take().is_some();
            if !self.pinned {
                self.path = discover_config_path();
                if self.path.is_some() {
                    return self.load_current().map(Some);
                }
            }
            return Ok(was_loaded.then(Settings::default));
        }

        let modified = fs::metadata(&current_path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        if modified != self.modified {
            return self.load_current().map(Some);
        }

        Ok(None)
    }
}

pub fn parse_settings(raw: &str, source: Option<String>) -> Result<Settings> {
    let parsed: BerthConfigFile = if raw.trim().is_empty() {
        BerthConfigFile::default()
    } else {
        serde_yaml::from_str(raw)?
    };
    let defaults = Settings::default();

    let runtime = parsed
        .runtime
        .map(|runtime| runtime.trim().to_string())
        .filter(|runtime| !runtime.is_empty())
        .unwrap_or(defaults.runtime);
    let aliases = parsed
        .aliases
        .into_iter()
        .filter_map(|(alias, target)| {
            let alias = normalize_command_name(&alias);
            let target = normalize_command_name(&target);
            (!alias.is_empty() && !target.is_empty()).then_some((alias, target))
        })
        .collect::<HashMap<_, _>>();

    Ok(Settings {
        source,
        runtime,
        log_tail: parsed.log_tail.unwrap_or(defaults.log_tail).max(1),
        stream_poll_ms: parsed
            .stream_poll_ms
            .unwrap_or(defaults.stream_poll_ms)
            .max(MIN_STREAM_POLL_MS),
        search_ignore_case: parsed
            .search_ignore_case
            .unwrap_or(defaults.search_ignore_case),
        search_regex: parsed.search_regex.unwrap_or(defaults.search_regex),
        aliases,
    })
}

fn normalize_command_name(name: &str) -> String {
    let name = name.trim();
    name.strip_prefix(':').unwrap_or(name).trim().to_ascii_lowercase()
}

fn discover_config_path() -> Option<PathBuf> {
    let env_path = std::env::var("BERTH_CONFIG").ok();
    let home = std::env::var("HOME").ok().map(PathBuf::from);
    discover_in(env_path.as_deref(), Path::new("."), home.as_deref())
}

fn discover_in(env_path: Option<&str>, cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = env_path
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        cwd.join("berth.yaml"),
        cwd.join("berth.yml"),
        cwd.join(".berth.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Some(home) = home {
        let user_candidates = [
            home.join(".config/berth/config.yaml"),
            home.join(".config/berth/config.yml"),
            home.join(".berth.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
