use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::report::ReportFormat;
use crate::sources::{NamePattern, DEFAULT_NAME_PATTERN};
use crate::timestamp::TimestampParser;
use crate::transport::ConnectParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub timestamps: TimestampsConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Sftp,
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    /// Remote directory; empty means the login directory. For the `local`
    /// protocol this is the directory served.
    #[serde(default)]
    pub dir: String,
    #[serde(default = "default_name_pattern")]
    pub name_pattern: String,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default)]
    pub strict_host_key: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Sftp,
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: None,
            password_env: default_password_env(),
            dir: String::new(),
            name_pattern: default_name_pattern(),
            known_hosts: None,
            strict_host_key: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            io_timeout_secs: default_io_timeout_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "testhost".to_string()
}
fn default_port() -> u16 {
    22
}
fn default_password_env() -> String {
    "REAPER_PASSWORD".to_string()
}
fn default_name_pattern() -> String {
    DEFAULT_NAME_PATTERN.to_string()
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_io_timeout_secs() -> u64 {
    60
}
fn default_batch_timeout_secs() -> u64 {
    600
}

impl RemoteConfig {
    pub fn name_pattern(&self) -> Result<NamePattern> {
        NamePattern::new(&self.name_pattern)
            .with_context(|| format!("Invalid remote.name_pattern: {}", self.name_pattern))
    }

    /// The configured password, else the variable named by `password_env`,
    /// else empty.
    pub fn resolve_password(&self) -> String {
        if let Some(password) = &self.password {
            return password.clone();
        }
        std::env::var(&self.password_env).unwrap_or_default()
    }

    pub fn connect_params(&self) -> Result<ConnectParams> {
        if self.port == 0 {
            bail!("remote.port must be > 0");
        }
        Ok(ConnectParams {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.resolve_password(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            io_timeout: Duration::from_secs(self.io_timeout_secs),
        })
    }

    /// `None` when the download stage is unbounded.
    pub fn batch_timeout(&self) -> Option<Duration> {
        match self.batch_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Directory handed to the transport for listing and download.
    ///
    /// The local channel is rooted at `dir` already.
    pub fn listing_dir(&self) -> &str {
        match self.protocol {
            Protocol::Sftp => &self.dir,
            Protocol::Local => "",
        }
    }

    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        self.known_hosts.as_deref().map(expand_home)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join("harvest"))
        .unwrap_or_else(|| PathBuf::from("harvest"))
}

impl WorkspaceConfig {
    pub fn root(&self) -> PathBuf {
        expand_home(&self.root)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TimestampsConfig {
    /// Tried in order; empty selects the built-in formats.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl TimestampsConfig {
    pub fn parser(&self) -> Result<TimestampParser> {
        if self.patterns.is_empty() {
            return Ok(TimestampParser::builtin());
        }
        Ok(TimestampParser::from_patterns(&self.patterns)
            .context("Invalid timestamps.patterns")?)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_report_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            file_name: default_report_file_name(),
            format: ReportFormat::Html,
        }
    }
}

fn default_report_file_name() -> String {
    "reconstructed.htm".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Defaults for running without a configuration file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate remote
    if config.remote.port == 0 {
        bail!("remote.port must be > 0");
    }
    if config.remote.connect_timeout_secs == 0 {
        bail!("remote.connect_timeout_secs must be > 0");
    }
    config.remote.name_pattern()?;
    if config.remote.protocol == Protocol::Local && config.remote.dir.is_empty() {
        bail!("remote.dir must be set when protocol is 'local'");
    }

    // Validate timestamps
    config.timestamps.parser()?;

    // Validate report
    let file_name = &config.report.file_name;
    if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name.as_str()) {
        bail!(
            "report.file_name must be a plain file name, got '{}'",
            file_name
        );
    }

    // Validate logging
    match config.logging.level.to_ascii_lowercase().as_str() {
        "error" | "warn" | "info" | "debug" | "trace" | "off" => {}
        other => bail!(
            "Unknown logging.level: '{}'. Must be error, warn, info, debug, trace, or off.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::YMD_PATTERN;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.remote.protocol, Protocol::Sftp);
        assert_eq!(config.remote.host, "testhost");
        assert_eq!(config.remote.port, 22);
        assert_eq!(config.remote.name_pattern, DEFAULT_NAME_PATTERN);
        assert_eq!(config.remote.batch_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.report.file_name, "reconstructed.htm");
        assert_eq!(config.report.format, ReportFormat::Html);
        assert_eq!(config.logging.level, "warn");
        assert!(config.workspace.root.ends_with("harvest"));
    }

    #[test]
    fn full_file_parses() {
        let config = parse_config(
            r#"
[remote]
protocol = "local"
host = "logs.internal"
port = 2222
user = "ops"
password = "hunter2"
dir = "/var/log/app"
name_pattern = "app.*\\.log$"
strict_host_key = true
batch_timeout_secs = 0

[workspace]
root = "/tmp/harvest"

[timestamps]
patterns = ['(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})T(?P<hour>\d{2}):(?P<min>\d{2}):(?P<sec>\d{2})\.(?P<ms>\d{3})']

[report]
file_name = "out.json"
format = "json"

[logging]
level = "debug"
file = "reaper.log"
"#,
        )
        .unwrap();

        assert_eq!(config.remote.protocol, Protocol::Local);
        assert_eq!(config.remote.listing_dir(), "");
        assert_eq!(config.remote.batch_timeout(), None);
        assert!(config.remote.strict_host_key);
        let params = config.remote.connect_params().unwrap();
        assert_eq!(params.target(), "ops@logs.internal:2222");
        assert_eq!(params.password, "hunter2");
        assert_eq!(config.workspace.root(), PathBuf::from("/tmp/harvest"));
        assert_eq!(config.timestamps.parser().unwrap().patterns().len(), 1);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.logging.file, Some(PathBuf::from("reaper.log")));
    }

    #[test]
    fn password_falls_back_to_environment() {
        let remote = RemoteConfig {
            password_env: "REAPER_TEST_PASSWORD_FALLBACK".to_string(),
            ..Default::default()
        };
        std::env::set_var("REAPER_TEST_PASSWORD_FALLBACK", "from-env");
        assert_eq!(remote.resolve_password(), "from-env");
        std::env::remove_var("REAPER_TEST_PASSWORD_FALLBACK");
        assert_eq!(remote.resolve_password(), "");
    }

    #[test]
    fn rejects_zero_port() {
        let err = parse_config("[remote]\nport = 0\n").unwrap_err();
        assert!(err.to_string().contains("remote.port"));
    }

    #[test]
    fn rejects_zero_connect_timeout() {
        let err = parse_config("[remote]\nconnect_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("remote.connect_timeout_secs"));
    }

    #[test]
    fn rejects_invalid_name_pattern() {
        let err = parse_config("[remote]\nname_pattern = \"(\"\n").unwrap_err();
        assert!(err.to_string().contains("name_pattern"));
    }

    #[test]
    fn rejects_timestamp_pattern_missing_groups() {
        let err = parse_config("[timestamps]\npatterns = ['(?P<year>\\d{4})']\n").unwrap_err();
        assert!(err.to_string().contains("timestamps.patterns"));
    }

    #[test]
    fn accepts_builtin_pattern_spelled_out() {
        let toml = format!("[timestamps]\npatterns = ['{}']\n", YMD_PATTERN);
        assert!(parse_config(&toml).is_ok());
    }

    #[test]
    fn rejects_report_path_with_directories() {
        let err = parse_config("[report]\nfile_name = \"../escape.htm\"\n").unwrap_err();
        assert!(err.to_string().contains("report.file_name"));
        assert!(parse_config("[report]\nfile_name = \"\"\n").is_err());
    }

    #[test]
    fn rejects_unknown_report_format() {
        assert!(parse_config("[report]\nformat = \"pdf\"\n").is_err());
    }

    #[test]
    fn local_protocol_requires_dir() {
        let err = parse_config("[remote]\nprotocol = \"local\"\n").unwrap_err();
        assert!(err.to_string().contains("remote.dir"));
    }

    #[test]
    fn rejects_unknown_log_level() {
        assert!(parse_config("[logging]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn expand_home_only_touches_leading_tilde() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        assert_eq!(expand_home(Path::new("rel/~x")), PathBuf::from("rel/~x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/harvest")), home.join("harvest"));
        }
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/reaper.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
