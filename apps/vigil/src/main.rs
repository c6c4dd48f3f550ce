mod cli;
mod config;
mod enqueue;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil::{Parser, ProbeRegistry, Queue, RedisQueue, Resolver, Router, Worker};

use crate::cli::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = Config::locate(cli.config.as_deref())?;
    let stored = Config::from_config(&config_path)?;
    let mut config = stored.clone().unwrap_or_default();

    logger::init(cli.verbose || config.worker.verbose);

    if stored.is_none() {
        match config.write_config(&config_path) {
            Ok(()) => info!("Wrote default configuration to {}", config_path.display()),
            Err(e) => warn!("Could not write default configuration: {}", e),
        }
    }
    if cli.verbose {
        config.worker.verbose = true;
    }

    match cli.command {
        Command::Worker(args) => {
            args.apply(&mut config);
            debug!("{}", config);
            run_worker(&config).await
        }
        Command::Router(args) => {
            args.apply(&mut config);
            debug!("{}", config);
            run_router(&config).await
        }
        Command::Enqueue(args) => {
            args.redis.apply(&mut config);
            run_enqueue(&config, &args.files).await
        }
        Command::Examples { kind } => print_examples(kind.as_deref()),
    }
}

async fn connect(config: &Config) -> Result<Arc<RedisQueue>> {
    let options = config.redis_options();
    let queue = RedisQueue::connect(&options)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", options.host))?;
    queue.ping().await.with_context(|| format!("Redis at {} did not answer PING", options.host))?;
    Ok(Arc::new(queue))
}

async fn run_worker(config: &Config) -> Result<()> {
    let queue = connect(config).await?;
    let registry = Arc::new(ProbeRegistry::with_defaults());
    let resolver = Resolver::system(config.address_families());
    let worker = Worker::new(queue, registry, resolver, config.worker_settings());

    let shutdown = shutdown_token();
    worker.run(shutdown).await;
    Ok(())
}

async fn run_router(config: &Config) -> Result<()> {
    let destinations = config.destinations()?;
    if destinations.is_empty() {
        bail!("No destinations configured; pass --destination or set [router] destinations");
    }

    let queue = connect(config).await?;
    let router = Router::new(queue, config.queues.results.clone(), destinations);

    let shutdown = shutdown_token();
    router.run(shutdown).await;
    Ok(())
}

async fn run_enqueue(config: &Config, files: &[std::path::PathBuf]) -> Result<()> {
    let registry = Arc::new(ProbeRegistry::with_defaults());
    let parser = Parser::new(registry.clone());
    let tests = enqueue::read_jobs(&registry, &parser, files)?;

    let queue = connect(config).await?;
    let pushed = enqueue::push_jobs(queue.as_ref(), &config.queues.jobs, &tests).await?;
    info!("Enqueued {} tests on {}", pushed, config.queues.jobs);
    Ok(())
}

fn print_examples(kind: Option<&str>) -> Result<()> {
    let registry = ProbeRegistry::with_defaults();

    let names = match kind {
        Some(kind) if registry.contains(kind) => vec![kind],
        Some(kind) => bail!("Unknown test type '{}'; known: {}", kind, registry.names().join(", ")),
        None => registry.names(),
    };

    for name in names {
        let probe = registry.get(name)?;
        println!("{}", probe.example().trim_end());
        println!();
    }
    Ok(())
}

/// Cancelled on Ctrl-C or SIGTERM. A worker finishes its current job first.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, finishing current work");
        trigger.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Could not listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
