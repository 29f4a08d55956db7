use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;
use tracing::warn;

use crate::error::{Result, VerifyError};

/// Layered key/value configuration: defaults, rc file, `.env`, then process environment.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = default_config_path();
        Self::load_from(&config_path, Path::new(".env"), env::vars())
    }

    /// Builds a config from explicit sources. `load` is this with the real paths and environment.
    pub fn load_from(
        config_path: &Path,
        dotenv_path: &Path,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut map = default_map();

        // Read .pipewatchrc if it exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(config_path) {
                read_pairs(BufReader::new(file), &mut map);
            }
        }

        if dotenv_path.exists() {
            read_dotenv(dotenv_path, &mut map);
        }

        // Overlay environment variables (take precedence)
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let required = split_list(map.get("REQUIRED_CREDENTIALS").map(String::as_str).unwrap_or(""));
        let required = vars
            .iter()
            .find(|(k, _)| k == "REQUIRED_CREDENTIALS")
            .map(|(_, v)| split_list(v))
            .unwrap_or(required);
        for (k, v) in vars {
            if is_config_key(&k) || required.contains(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path: config_path.to_path_buf() }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        Self { inner: map, config_path: default_config_path() }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    /// Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(|v| split_list(&v)).unwrap_or_default()
    }
}

fn read_pairs(reader: impl BufRead, map: &mut HashMap<String, String>) {
    for line in reader.lines().map_while(|l| l.ok()) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), unquote(v.trim()).to_string());
        }
    }
}

/// Strips one pair of matching surrounding quotes.
fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|rest| rest.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

/// Merges `.env` entries without touching the process environment.
fn read_dotenv(path: &Path, map: &mut HashMap<String, String>) {
    let entries = match dotenv::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read .env");
            return;
        }
    };
    for entry in entries {
        match entry {
            Ok((k, v)) => {
                map.insert(k, v);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed .env line"),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "N8N_URL",
        "N8N_API_KEY",
        "N8N_API_KEY_HEADER",
        "WORKFLOW_NAME",
        "NOTION_API_TOKEN",
        "NOTION_DATABASE_ID",
        "NOTION_API_BASE",
        "NOTION_VERSION",
        "REQUEST_TIMEOUT",
        "PROBE_TIMEOUT",
        "REQUIRED_CREDENTIALS",
    ];

    KEYS.contains(&k) || k.starts_with("PIPEWATCH_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("pipewatch").join(".pipewatchrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Endpoints
    m.insert("N8N_URL".into(), "http://localhost:5678".into());
    m.insert("N8N_API_KEY_HEADER".into(), "X-N8N-API-KEY".into());
    m.insert("NOTION_API_BASE".into(), "https://api.notion.com".into());
    m.insert("NOTION_VERSION".into(), "2022-06-28".into());

    // Seconds
    m.insert("REQUEST_TIMEOUT".into(), "30".into());
    m.insert("PROBE_TIMEOUT".into(), "10".into());

    m.insert("WORKFLOW_NAME".into(), "iwatcher".into());
    m.insert(
        "REQUIRED_CREDENTIALS".into(),
        "ASSEMBLYAI_API_KEY,OPENAI_API_KEY,NOTION_API_TOKEN,NOTION_DATABASE_ID".into(),
    );

    m
}

/// Typed settings for the workflow engine adapter.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_key_header: String,
    pub workflow_name: String,
    pub request_timeout: Duration,
}

/// Typed settings for the document store adapter. Both credentials are optional: the probe fails soft.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub database_id: Option<String>,
    pub api_version: String,
    pub request_timeout: Duration,
}

/// Everything a verification run needs, resolved once from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineSettings,
    pub store: StoreSettings,
    pub probe_timeout: Duration,
    /// Named credentials whose presence is checked in pre-flight, with their values if set.
    pub credentials: Vec<(String, Option<String>)>,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let api_key = cfg.get("N8N_API_KEY").ok_or_else(|| {
            VerifyError::Config(
                "N8N_API_KEY not set. Export it or add it to .env / ~/.config/pipewatch/.pipewatchrc"
                    .into(),
            )
        })?;
        let request_timeout = Duration::from_secs(cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(30));

        let engine = EngineSettings {
            base_url: cfg
                .get("N8N_URL")
                .unwrap_or_else(|| "http://localhost:5678".into())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            api_key_header: cfg
                .get("N8N_API_KEY_HEADER")
                .unwrap_or_else(|| "X-N8N-API-KEY".into()),
            workflow_name: cfg.get("WORKFLOW_NAME").unwrap_or_else(|| "iwatcher".into()),
            request_timeout,
        };

        let store = StoreSettings {
            base_url: cfg
                .get("NOTION_API_BASE")
                .unwrap_or_else(|| "https://api.notion.com".into())
                .trim_end_matches('/')
                .to_string(),
            token: cfg.get("NOTION_API_TOKEN"),
            database_id: cfg.get("NOTION_DATABASE_ID"),
            api_version: cfg.get("NOTION_VERSION").unwrap_or_else(|| "2022-06-28".into()),
            request_timeout,
        };

        let credentials = cfg
            .get_list("REQUIRED_CREDENTIALS")
            .into_iter()
            .map(|name| {
                let value = cfg.get(&name);
                (name, value)
            })
            .collect();

        Ok(Self {
            engine,
            store,
            probe_timeout: Duration::from_secs(cfg.get_u64("PROBE_TIMEOUT").unwrap_or(10)),
            credentials,
        })
    }
}

/// Shows the first eight characters of a secret, or `***` for short ones.
pub fn mask_secret(value: &str) -> String {
    if value.chars().count() > 8 {
        let head: String = value.chars().take(8).collect();
        format!("{head}...")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn environment_overrides_dotenv_overrides_rc_file() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".pipewatchrc");
        let dotenv = dir.path().join(".env");
        let mut f = fs::File::create(&rc).unwrap();
        writeln!(f, "# rc file\nN8N_URL=http://rc:5678\nWORKFLOW_NAME=from-rc\nPROBE_TIMEOUT=3").unwrap();
        let mut f = fs::File::create(&dotenv).unwrap();
        writeln!(f, "WORKFLOW_NAME=\"from-dotenv\"\nN8N_API_KEY=dotenv-key").unwrap();

        let cfg = Config::load_from(&rc, &dotenv, vars(&[("N8N_API_KEY", "env-key"), ("HOME", "/root")]));

        assert_eq!(cfg.get("N8N_URL").as_deref(), Some("http://rc:5678"));
        assert_eq!(cfg.get("WORKFLOW_NAME").as_deref(), Some("from-dotenv"));
        assert_eq!(cfg.get("N8N_API_KEY").as_deref(), Some("env-key"));
        assert_eq!(cfg.get_u64("PROBE_TIMEOUT"), Some(3));
        assert_eq!(cfg.get("HOME"), None);
    }

    #[test]
    fn dotenv_values_drop_quotes_and_trailing_comments() {
        let dir = tempfile::tempdir().unwrap();
        let dotenv = dir.path().join(".env");
        let mut f = fs::File::create(&dotenv).unwrap();
        writeln!(f, "# local overrides\nN8N_URL=\"http://h:5678\" # dev\nWORKFLOW_NAME='Drive watcher'").unwrap();

        let cfg = Config::load_from(&dir.path().join("missing"), &dotenv, Vec::new());

        assert_eq!(cfg.get("N8N_URL").as_deref(), Some("http://h:5678"));
        assert_eq!(cfg.get("WORKFLOW_NAME").as_deref(), Some("Drive watcher"));
        let settings = Settings::from_config(&{
            let mut cfg = cfg;
            cfg.set("N8N_API_KEY", "k");
            cfg
        })
        .unwrap();
        assert_eq!(settings.engine.base_url, "http://h:5678");
    }

    #[test]
    fn malformed_dotenv_line_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let dotenv = dir.path().join(".env");
        let mut f = fs::File::create(&dotenv).unwrap();
        writeln!(f, "N8N_API_KEY=from-dotenv\nPROBE_TIMEOUT=\"4").unwrap();

        let cfg = Config::load_from(&dir.path().join("missing"), &dotenv, Vec::new());

        assert_eq!(cfg.get("N8N_API_KEY").as_deref(), Some("from-dotenv"));
        assert_eq!(cfg.get_u64("PROBE_TIMEOUT"), Some(10));
    }

    #[test]
    fn required_credentials_are_picked_up_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(
            &dir.path().join("missing"),
            &dir.path().join("missing.env"),
            vars(&[("REQUIRED_CREDENTIALS", "FOO_KEY, BAR_KEY"), ("FOO_KEY", "abc")]),
        );
        assert_eq!(cfg.get("FOO_KEY").as_deref(), Some("abc"));
        assert_eq!(cfg.get_list("REQUIRED_CREDENTIALS"), vec!["FOO_KEY", "BAR_KEY"]);
    }

    #[test]
    fn settings_require_engine_api_key() {
        let cfg = Config::from_pairs([("N8N_API_KEY", "  ")]);
        let err = Settings::from_config(&cfg).unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
    }

    #[test]
    fn settings_resolve_defaults_and_credentials() {
        let cfg = Config::from_pairs([
            ("N8N_API_KEY", "k"),
            ("N8N_URL", "http://n8n.internal:5678/"),
            ("OPENAI_API_KEY", "sk-123"),
        ]);
        let settings = Settings::from_config(&cfg).unwrap();
        assert_eq!(settings.engine.base_url, "http://n8n.internal:5678");
        assert_eq!(settings.engine.api_key_header, "X-N8N-API-KEY");
        assert_eq!(settings.probe_timeout, Duration::from_secs(10));
        assert!(settings.store.token.is_none());
        let openai = settings.credentials.iter().find(|(n, _)| n == "OPENAI_API_KEY").unwrap();
        assert_eq!(openai.1.as_deref(), Some("sk-123"));
        assert_eq!(settings.credentials.len(), 4);
    }

    #[test]
    fn rc_file_only_strips_matching_quotes() {
        let mut map = HashMap::new();
        read_pairs("A=\"quoted\"\nB='single'\nC=\"open\nD=it's".as_bytes(), &mut map);
        assert_eq!(map["A"], "quoted");
        assert_eq!(map["B"], "single");
        assert_eq!(map["C"], "\"open");
        assert_eq!(map["D"], "it's");
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("sk-abcdefghijkl"), "sk-abcde...");
        assert_eq!(mask_secret("short"), "***");
    }
}
