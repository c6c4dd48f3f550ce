//! The worker: pull a job, resolve, probe every target with retries and
//! publish one result per target.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::check::Test;
use crate::options::{ExecutionOptions, RetryPolicy};
use crate::parser::Parser;
use crate::probe::{Probe, ProbeRegistry};
use crate::queue::Queue;
use crate::resolver::Resolver;
use crate::result::ResultMessage;
use crate::{DEFAULT_JOBS_QUEUE, DEFAULT_RESULTS_QUEUE};

/// Pause after a failed dequeue before trying again
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Everything a worker needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub jobs_queue: String,
    pub results_queue: String,
    pub retry: RetryPolicy,
    pub execution: ExecutionOptions,
    /// Longest a single dequeue blocks before shutdown is re-checked
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            jobs_queue: DEFAULT_JOBS_QUEUE.to_string(),
            results_queue: DEFAULT_RESULTS_QUEUE.to_string(),
            retry: RetryPolicy::default(),
            execution: ExecutionOptions::default(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Sequential job runner. Scale out by running more workers against the
/// same jobs queue.
pub struct Worker {
    queue: Arc<dyn Queue>,
    registry: Arc<ProbeRegistry>,
    resolver: Resolver,
    parser: Parser,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn Queue>,
        registry: Arc<ProbeRegistry>,
        resolver: Resolver,
        settings: WorkerSettings,
    ) -> Self {
        let parser = Parser::new(registry.clone());
        Self { queue, registry, resolver, parser, settings }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Process jobs until `shutdown` fires.
    ///
    /// Cancellation is only observed between jobs: a job that has been
    /// dequeued always runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(queue = %self.settings.jobs_queue, "Worker waiting for jobs");

        while !shutdown.is_cancelled() {
            match self.queue.pop(&self.settings.jobs_queue, self.settings.poll_interval).await {
                Ok(Some(payload)) => self.process(&payload).await,
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to fetch job: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    /// Parse one raw queue payload and execute it. Bad payloads are logged
    /// and dropped.
    pub async fn process(&self, payload: &[u8]) {
        let line = match std::str::from_utf8(payload) {
            Ok(line) => line,
            Err(e) => {
                warn!("Discarding job that is not UTF-8: {}", e);
                return;
            }
        };

        match self.parser.parse_line(line) {
            Ok(Some(test)) => {
                self.execute(&test).await;
            }
            Ok(None) => debug!("Ignoring empty job"),
            Err(e) => warn!("Error parsing job from queue: {} - {}", line.trim(), e),
        }
    }

    /// Run `test` against every effective target and publish the results.
    ///
    /// Returns the messages published (or attempted), in target order.
    pub async fn execute(&self, test: &Test) -> Vec<ResultMessage> {
        let probe = match self.registry.get(&test.kind) {
            Ok(probe) => probe,
            Err(e) => {
                error!(input = %test.sanitize(), "Dropping job: {}", e);
                return Vec::new();
            }
        };

        let targets = if probe.should_resolve_hostname() {
            match self.resolver.resolve(&test.target).await {
                Ok(targets) => targets,
                Err(e) => {
                    warn!("Failed to resolve {} for {} test: {}", test.target, test.kind, e);
                    let message =
                        ResultMessage::new(&test.for_target(&test.target), Err(e.to_string()));
                    self.publish(&message).await;
                    return vec![message];
                }
            }
        } else {
            vec![test.target.clone()]
        };

        if targets.is_empty() {
            warn!(
                "{} resolved to no addresses in an enabled family, nothing to run for {} test",
                test.target, test.kind
            );
        }

        let mut messages = Vec::with_capacity(targets.len());
        for target in targets {
            debug!("Running '{}' test against {} ({})", test.kind, test.target, target);

            let outcome = self.attempt(probe.as_ref(), test, &target).await;
            let message = ResultMessage::new(&test.for_target(&target), outcome);
            self.publish(&message).await;
            messages.push(message);
        }
        messages
    }

    /// Run the probe until it passes or the attempts are used up. The last
    /// error is the outcome.
    async fn attempt(&self, probe: &dyn Probe, test: &Test, target: &str) -> Result<(), String> {
        let max_attempts = self.settings.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match probe.run_test(test, target, self.settings.execution).await {
                Ok(()) => {
                    debug!("[{}/{}] Test passed", attempt, max_attempts);
                    return Ok(());
                }
                Err(e) => {
                    debug!("[{}/{}] Test failed: {}", attempt, max_attempts, e);
                    if attempt >= max_attempts {
                        return Err(e.to_string());
                    }
                    debug!("Sleeping for {:?} before retrying", self.settings.retry.delay);
                    tokio::time::sleep(self.settings.retry.delay).await;
                }
            }
        }
    }

    /// Push a result; failures are logged and not retried.
    async fn publish(&self, message: &ResultMessage) {
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode test result to JSON: {}", e);
                return;
            }
        };

        if let Err(e) = self.queue.push(&self.settings.results_queue, &payload).await {
            error!(target_addr = %message.target, "Result addition failed: {}", e);
        }
    }
}
