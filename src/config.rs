use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::environment::Environment;

pub const CONFIG_FILE_NAME: &str = "sitepub.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "ftp" => Ok(Self::Ftp),
            "sftp" => Ok(Self::Sftp),
            _ => bail!("invalid protocol: must be ftp or sftp"),
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Ftp => 21,
            Protocol::Sftp => 22,
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Ftp
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Protocol::Ftp => "ftp",
            Protocol::Sftp => "sftp",
        };
        write!(f, "{value}")
    }
}

/// When the publish marker is advanced relative to the upload.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarkerCommit {
    /// Overwrite the marker right after reading it, before any upload.
    /// A failed run still advances the threshold, so files that were not
    /// uploaded can be skipped by the next run.
    #[default]
    BeforeUpload,
    /// Write the run start time only after every file was uploaded.
    AfterSuccess,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Absolute remote directory that mirrors the project root.
    ///
    /// Resolved against the server's root as the transport sees it. Most FTP
    /// servers chroot to the account home, so `/` is that home; over SFTP `/`
    /// is the server filesystem root, so point this at the full web directory
    /// path (e.g. `/home/site/www`).
    pub remote_dir: String,

    /// Public base address the marker file can be fetched from.
    #[serde(default)]
    pub marker_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub host: String,

    /// Defaults to the protocol's well-known port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Skip SSH host key verification entirely.
    #[serde(default)]
    pub insecure_accept_any_host_key: bool,

    #[serde(default)]
    pub known_hosts: Option<PathBuf>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_marker_extension")]
    pub marker_extension: String,

    #[serde(default)]
    pub marker_commit: MarkerCommit,

    /// Substrings that disqualify a file when found anywhere in its absolute path
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    #[serde(default = "default_dev")]
    pub dev: EnvironmentConfig,

    #[serde(default = "default_live")]
    pub live: EnvironmentConfig,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_marker_extension() -> String {
    "inf".to_string()
}

fn default_exclude() -> Vec<String> {
    [
        ".git",
        ".gitignore",
        ".idea",
        ".vscode",
        CONFIG_FILE_NAME,
        "README.md",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dev() -> EnvironmentConfig {
    EnvironmentConfig {
        remote_dir: "/_dev".to_string(),
        marker_url: None,
    }
}

fn default_live() -> EnvironmentConfig {
    EnvironmentConfig {
        remote_dir: "/".to_string(),
        marker_url: None,
    }
}

/// Resolve the config file location: explicit path, then `SITEPUB_CONFIG`,
/// then `sitepub.toml` in the project root.
pub fn config_path(root: &Path, explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SITEPUB_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    root.join(CONFIG_FILE_NAME)
}

impl Config {
    /// Load config from `path`, returning defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` and apply `SITEPUB_*` environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(protocol) = env_value("SITEPUB_PROTOCOL") {
            self.protocol = Protocol::parse(&protocol)?;
        }
        if let Some(host) = env_value("SITEPUB_HOST") {
            self.host = host;
        }
        if let Some(port) = env_value("SITEPUB_PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid SITEPUB_PORT: {port}"))?;
            self.port = Some(port);
        }
        if let Some(username) = env_value("SITEPUB_USERNAME") {
            self.username = username;
        }
        if let Some(password) = env_value("SITEPUB_PASSWORD") {
            self.password = password;
        }
        Ok(())
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    pub fn environment(&self, env: Environment) -> &EnvironmentConfig {
        match env {
            Environment::Dev => &self.dev,
            Environment::Live => &self.live,
        }
    }

    pub fn validate_target(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("no host configured (set `host` in {CONFIG_FILE_NAME} or SITEPUB_HOST)");
        }
        if self.username.trim().is_empty() {
            bail!("no username configured (set `username` in {CONFIG_FILE_NAME} or SITEPUB_USERNAME)");
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            insecure_accept_any_host_key: false,
            known_hosts: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            marker_extension: default_marker_extension(),
            marker_commit: MarkerCommit::default(),
            exclude: default_exclude(),
            dev: default_dev(),
            live: default_live(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EnvGuard, env_lock};
    use tempfile::TempDir;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.protocol, Protocol::Ftp);
        assert_eq!(config.effective_port(), 21);
        assert_eq!(config.marker_extension, "inf");
        assert_eq!(config.marker_commit, MarkerCommit::BeforeUpload);
        assert_eq!(config.dev.remote_dir, "/_dev");
        assert_eq!(config.live.remote_dir, "/");
        assert!(!config.insecure_accept_any_host_key);
        assert!(config.exclude.iter().any(|e| e == ".git"));
        assert!(config.exclude.iter().any(|e| e == CONFIG_FILE_NAME));
    }

    #[test]
    fn config_partial_parse() {
        let content = r#"
protocol = "sftp"
host = "example.org"

[dev]
remote_dir = "/staging"
marker_url = "https://dev.example.org"
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.protocol, Protocol::Sftp);
        assert_eq!(config.effective_port(), 22);
        assert_eq!(config.host, "example.org");
        assert_eq!(config.dev.remote_dir, "/staging");
        assert_eq!(config.dev.marker_url.as_deref(), Some("https://dev.example.org"));
        assert_eq!(config.live.remote_dir, "/");
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn sftp_remote_dir_is_kept_as_full_path() {
        let content = r#"
protocol = "sftp"

[live]
remote_dir = "/home/site/www"
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.environment(Environment::Live).remote_dir, "/home/site/www");
        assert_eq!(config.environment(Environment::Dev).remote_dir, "/_dev");
    }

    #[test]
    fn config_marker_commit_parse() {
        let config: Config = toml::from_str("marker_commit = \"after_success\"\n").unwrap();
        assert_eq!(config.marker_commit, MarkerCommit::AfterSuccess);
    }

    #[test]
    fn config_load_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config.protocol, Protocol::Ftp);
    }

    #[test]
    fn config_load_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "protocol = \"gopher\"\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn env_overrides_win_over_file() {
        let _lock = env_lock();
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "host = \"file.example\"\nusername = \"file\"\n").unwrap();

        let _host = EnvGuard::set("SITEPUB_HOST", "env.example");
        let _port = EnvGuard::set("SITEPUB_PORT", "2121");
        let _pass = EnvGuard::set("SITEPUB_PASSWORD", "hunter2");
        let _user = EnvGuard::set("SITEPUB_USERNAME", "");
        let _protocol = EnvGuard::set("SITEPUB_PROTOCOL", "sftp");

        let config = Config::load_with_env(&path).unwrap();
        assert_eq!(config.host, "env.example");
        assert_eq!(config.effective_port(), 2121);
        assert_eq!(config.password, "hunter2");
        assert_eq!(config.username, "file");
        assert_eq!(config.protocol, Protocol::Sftp);
    }

    #[test]
    fn env_override_rejects_bad_port() {
        let _lock = env_lock();
        let _port = EnvGuard::set("SITEPUB_PORT", "not-a-port");
        let mut config = Config::default();
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn config_path_prefers_explicit_then_env() {
        let _lock = env_lock();
        let root = Path::new("/site");
        let _guard = EnvGuard::set("SITEPUB_CONFIG", "/etc/sitepub.toml");
        assert_eq!(
            config_path(root, Some(Path::new("custom.toml"))),
            PathBuf::from("custom.toml")
        );
        assert_eq!(config_path(root, None), PathBuf::from("/etc/sitepub.toml"));
    }

    #[test]
    fn config_path_defaults_to_root() {
        let _lock = env_lock();
        let _guard = EnvGuard::set("SITEPUB_CONFIG", "");
        assert_eq!(
            config_path(Path::new("/site"), None),
            PathBuf::from("/site/sitepub.toml")
        );
    }

    #[test]
    fn validate_target_requires_host_and_username() {
        let mut config = Config::default();
        assert!(config.validate_target().is_err());
        config.host = "example.org".to_string();
        assert!(config.validate_target().is_err());
        config.username = "deploy".to_string();
        assert!(config.validate_target().is_ok());
    }

    #[test]
    fn protocol_parse() {
        assert_eq!(Protocol::parse(" SFTP ").unwrap(), Protocol::Sftp);
        assert!(Protocol::parse("scp").is_err());
    }
}
