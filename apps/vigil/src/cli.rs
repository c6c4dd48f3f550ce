use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(version, about = "Queue-driven active monitoring", propagate_version = true)]
pub struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/vigil/config.toml)
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging and verbose probe output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Consume jobs and publish test results
    Worker(WorkerArgs),
    /// Fan results out to destination queues
    Router(RouterArgs),
    /// Push the test lines of one or more files onto the jobs queue
    Enqueue(EnqueueArgs),
    /// Print usage examples for the bundled probes
    Examples {
        /// Only show this test type
        kind: Option<String>,
    },
}

#[derive(Debug, Default, Args)]
pub struct RedisArgs {
    /// Redis `host:port`
    #[arg(long)]
    pub redis_host: Option<String>,

    /// Redis database number
    #[arg(long)]
    pub redis_db: Option<i64>,

    /// Redis password
    #[arg(long, env = "VIGIL_REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Queue workers pull jobs from
    #[arg(long)]
    pub jobs_queue: Option<String>,

    /// Queue workers publish results to
    #[arg(long)]
    pub results_queue: Option<String>,
}

#[derive(Debug, Default, Args)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub redis: RedisArgs,

    /// Do not probe IPv4 addresses
    #[arg(long)]
    pub no_ipv4: bool,

    /// Do not probe IPv6 addresses
    #[arg(long)]
    pub no_ipv6: bool,

    /// Run every test exactly once
    #[arg(long)]
    pub no_retry: bool,

    /// Maximum attempts per target
    #[arg(long)]
    pub retry_count: Option<u32>,

    /// Seconds to wait between attempts
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Default, Args)]
pub struct RouterArgs {
    #[command(flatten)]
    pub redis: RedisArgs,

    /// `queue` or `queue[field=value,...]`; replaces the configured list
    #[arg(short, long = "destination")]
    pub destinations: Vec<String>,
}

#[derive(Debug, Args)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub redis: RedisArgs,

    /// Files holding one test per line
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl RedisArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.redis_host {
            config.redis.host = host.clone();
        }
        if let Some(db) = self.redis_db {
            config.redis.db = db;
        }
        if let Some(password) = &self.redis_password {
            config.redis.password = password.clone();
        }
        if let Some(jobs) = &self.jobs_queue {
            config.queues.jobs = jobs.clone();
        }
        if let Some(results) = &self.results_queue {
            config.queues.results = results.clone();
        }
    }
}

impl WorkerArgs {
    pub fn apply(&self, config: &mut Config) {
        self.redis.apply(config);
        if self.no_ipv4 {
            config.worker.ipv4 = false;
        }
        if self.no_ipv6 {
            config.worker.ipv6 = false;
        }
        if self.no_retry {
            config.worker.retry = false;
        }
        if let Some(count) = self.retry_count {
            config.worker.retry_count = count;
        }
        if let Some(delay) = self.retry_delay {
            config.worker.retry_delay_seconds = delay;
        }
        if let Some(timeout) = self.timeout {
            config.worker.timeout_seconds = timeout;
        }
    }
}

impl RouterArgs {
    pub fn apply(&self, config: &mut Config) {
        self.redis.apply(config);
        if !self.destinations.is_empty() {
            config.router.destinations = self.destinations.clone();
        }
    }
}
