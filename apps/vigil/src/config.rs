use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil::error::DestinationError;
use vigil::queue::RedisOptions;
use vigil::{
    AddressFamilies, DEFAULT_JOBS_QUEUE, DEFAULT_RESULTS_QUEUE, Destination, ExecutionOptions,
    RetryPolicy, WorkerSettings,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to parse {path}: {source}")]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },

    #[error("Failed to serialize configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("Neither XDG_CONFIG_HOME nor a home directory is available")]
    ConfigPathUnavailable,

    #[error("Invalid router destination: {0}")]
    Destination(#[from] DestinationError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redis: Redis,
    pub queues: Queues,
    pub worker: Worker,
    pub router: Router,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Redis {
    /// `host:port`
    pub host: String,
    pub db: i64,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Queues {
    pub jobs: String,
    pub results: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Worker {
    pub ipv4: bool,
    pub ipv6: bool,
    pub retry: bool,
    pub retry_count: u32,
    pub retry_delay_seconds: u64,
    pub timeout_seconds: u64,
    pub verbose: bool,
    /// How long one dequeue blocks before shutdown is re-checked
    pub poll_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Router {
    /// `queue` or `queue[field=value,...]`
    pub destinations: Vec<String>,
}

impl Default for Redis {
    fn default() -> Self {
        Self { host: "localhost:6379".into(), db: 0, password: String::new() }
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self { jobs: DEFAULT_JOBS_QUEUE.into(), results: DEFAULT_RESULTS_QUEUE.into() }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self {
            ipv4: true,
            ipv6: true,
            retry: true,
            retry_count: 5,
            retry_delay_seconds: 5,
            timeout_seconds: 10,
            verbose: false,
            poll_seconds: 1,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let password = if self.redis.password.is_empty() { "(none)" } else { "********" };

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Redis")?;
        write_1(f, "Host", &self.redis.host)?;
        write_1(f, "Database", &self.redis.db)?;
        write_1(f, "Password", &password)?;
        write_title_1(f, "Queues")?;
        write_1(f, "Jobs", &self.queues.jobs)?;
        write_1(f, "Results", &self.queues.results)?;
        write_title_1(f, "Worker")?;
        write_1(f, "IPv4", &self.worker.ipv4)?;
        write_1(f, "IPv6", &self.worker.ipv6)?;
        write_1(f, "Retry", &self.worker.retry)?;
        write_1(f, "Retry Count", &self.worker.retry_count)?;
        write_1(f, "Retry Delay (s)", &self.worker.retry_delay_seconds)?;
        write_1(f, "Timeout (s)", &self.worker.timeout_seconds)?;
        write_1(f, "Poll (s)", &self.worker.poll_seconds)?;
        write_1(f, "Verbose", &self.worker.verbose)?;
        write_title_1(f, "Router")?;
        write_1(f, "Destinations", &self.router.destinations.join(" "))?;

        Ok(())
    }
}

impl Config {
    /// Where the configuration lives: the given path (forced to `.toml`) or
    /// the per-user default.
    pub fn locate(optional_path: Option<&path::Path>) -> Result<path::PathBuf, ConfigError> {
        match optional_path {
            Some(path) => Ok(normalize_toml_path(path)),
            None => default_config_path(),
        }
    }

    /// Read the configuration at `path`; `None` if no file exists there.
    pub fn from_config(path: &path::Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let raw_string = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFailed { path: path.to_path_buf(), source })?;
        toml::from_str(&raw_string)
            .map(Some)
            .map_err(|source| ConfigError::ParseFailed { path: path.to_path_buf(), source })
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    pub fn redis_options(&self) -> RedisOptions {
        RedisOptions {
            host: self.redis.host.clone(),
            db: self.redis.db,
            password: Some(self.redis.password.clone()).filter(|p| !p.is_empty()),
        }
    }

    pub fn address_families(&self) -> AddressFamilies {
        AddressFamilies { ipv4: self.worker.ipv4, ipv6: self.worker.ipv6 }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            jobs_queue: self.queues.jobs.clone(),
            results_queue: self.queues.results.clone(),
            retry: RetryPolicy {
                enabled: self.worker.retry,
                count: self.worker.retry_count,
                delay: Duration::from_secs(self.worker.retry_delay_seconds),
            },
            execution: ExecutionOptions {
                verbose: self.worker.verbose,
                timeout: Duration::from_secs(self.worker.timeout_seconds),
            },
            poll_interval: Duration::from_secs(self.worker.poll_seconds.max(1)),
        }
    }

    pub fn destinations(&self) -> Result<Vec<Destination>, ConfigError> {
        self.router
            .destinations
            .iter()
            .map(|spec| spec.parse::<Destination>().map_err(ConfigError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let settings = config.worker_settings();

        assert_eq!(settings.retry.max_attempts(), 5);
        assert_eq!(settings.retry.delay, Duration::from_secs(5));
        assert_eq!(settings.execution.timeout, Duration::from_secs(10));
        assert_eq!(settings.jobs_queue, "vigil.jobs");
        assert_eq!(settings.results_queue, "vigil.results");
        assert_eq!(config.address_families(), AddressFamilies { ipv4: true, ipv6: true });
        assert_eq!(config.redis_options().password, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[worker]
ipv6 = false
retry_count = 3

[router]
destinations = ["alerts[result=failed]", "archive"]
"#,
        )?;

        let config = Config::from_config(&path)?.expect("file exists");
        assert!(!config.worker.ipv6);
        assert!(config.worker.ipv4);
        assert_eq!(config.worker.retry_count, 3);
        assert_eq!(config.worker.timeout_seconds, 10);
        assert_eq!(config.redis.host, "localhost:6379");

        let destinations = config.destinations()?;
        assert_eq!(destinations.len(), 2);
        assert_eq!(destinations[0].queue, "alerts");
        Ok(())
    }

    #[test]
    fn test_missing_file_and_round_trip() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/config.toml");
        assert!(Config::from_config(&path)?.is_none());

        let mut config = Config::default();
        config.redis.password = "secret".into();
        config.write_config(&path)?;

        assert_eq!(Config::from_config(&path)?, Some(config));
        Ok(())
    }

    #[test]
    fn test_invalid_toml() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "[worker\nipv4 = maybe")?;

        assert!(matches!(Config::from_config(&path), Err(ConfigError::ParseFailed { .. })));
        Ok(())
    }

    #[test]
    fn test_invalid_destination() {
        let mut config = Config::default();
        config.router.destinations = vec!["alerts[result=failed".into()];
        assert!(matches!(config.destinations(), Err(ConfigError::Destination(_))));
    }

    #[test]
    fn test_locate_forces_toml_extension() -> anyhow::Result<()> {
        let path = Config::locate(Some(path::Path::new("/etc/vigil/worker.json")))?;
        assert_eq!(path, path::PathBuf::from("/etc/vigil/worker.toml"));
        Ok(())
    }

    #[test]
    fn test_display_masks_password() {
        let mut config = Config::default();
        config.redis.password = "hunter2".into();
        let rendered = config.to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("********"));
    }
}
