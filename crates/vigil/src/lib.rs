//! Vigil - queue-driven active monitoring
//!
//! Workers pull test lines from a jobs queue, resolve their targets, run the
//! matching protocol probe against every address with bounded retries, and
//! publish one result per probed address. Routers consume those results and
//! fan them out to destination queues selected by field predicates.

pub mod check;
pub mod engine;
pub mod error;
pub mod options;
pub mod parser;
pub mod probe;
pub mod queue;
pub mod resolver;
pub mod result;
pub mod router;

// Re-export main types
pub use check::Test;
pub use engine::{Worker, WorkerSettings};
pub use options::{AddressFamilies, ExecutionOptions, RetryPolicy};
pub use parser::Parser;
pub use probe::{Probe, ProbeRegistry};
pub use queue::{MemoryQueue, Queue, RedisQueue};
pub use resolver::{Lookup, Resolver, SystemLookup};
pub use result::{Outcome, ResultMessage};
pub use router::{Destination, Predicate, Router};

/// Default name of the queue workers pull jobs from
pub const DEFAULT_JOBS_QUEUE: &str = "vigil.jobs";

/// Default name of the queue workers publish results to
pub const DEFAULT_RESULTS_QUEUE: &str = "vigil.results";
