//! Result routing.
//!
//! A router pops result messages and copies each one, unmodified, to every
//! destination queue whose predicate it satisfies. Destinations are written
//! as `queue` or `queue[field=value,...]`; all clauses must hold.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DestinationError;
use crate::queue::Queue;

/// Conjunction of `field=value` equality clauses. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<(String, String)>,
}

impl Predicate {
    pub fn new(clauses: Vec<(String, String)>) -> Self {
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    /// Every clause names a present field whose value renders exactly as
    /// the expected text.
    pub fn matches(&self, message: &Map<String, Value>) -> bool {
        self.clauses.iter().all(|(field, expected)| match message.get(field) {
            Some(Value::String(actual)) => actual == expected,
            Some(Value::Number(actual)) => actual.to_string() == *expected,
            Some(Value::Bool(actual)) => actual.to_string() == *expected,
            _ => false,
        })
    }
}

/// A destination queue and the predicate guarding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub queue: String,
    pub predicate: Predicate,
}

impl Destination {
    pub fn accepts(&self, message: &Map<String, Value>) -> bool {
        self.predicate.matches(message)
    }
}

impl FromStr for Destination {
    type Err = DestinationError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();

        let Some(open) = spec.find('[') else {
            if spec.is_empty() {
                return Err(DestinationError::EmptyName(spec.to_string()));
            }
            if spec.contains(']') {
                return Err(DestinationError::TrailingText(spec.to_string()));
            }
            return Ok(Self { queue: spec.to_string(), predicate: Predicate::default() });
        };

        let queue = spec[..open].trim();
        if queue.is_empty() {
            return Err(DestinationError::EmptyName(spec.to_string()));
        }

        let body = &spec[open + 1..];
        let Some(close) = body.find(']') else {
            return Err(DestinationError::Unclosed(spec.to_string()));
        };
        if !body[close + 1..].trim().is_empty() {
            return Err(DestinationError::TrailingText(spec.to_string()));
        }

        let mut clauses = Vec::new();
        for clause in body[..close].split(',').map(str::trim).filter(|c| !c.is_empty()) {
            match clause.split_once('=') {
                Some((field, value)) if !field.trim().is_empty() => {
                    clauses.push((field.trim().to_string(), value.trim().to_string()));
                }
                _ => return Err(DestinationError::InvalidClause(clause.to_string())),
            }
        }

        Ok(Self { queue: queue.to_string(), predicate: Predicate::new(clauses) })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.queue)?;
        if !self.predicate.is_empty() {
            let clauses: Vec<String> = self
                .predicate
                .clauses
                .iter()
                .map(|(field, value)| format!("{field}={value}"))
                .collect();
            write!(f, "[{}]", clauses.join(","))?;
        }
        Ok(())
    }
}

/// Fans results out from one source queue to many destinations.
pub struct Router {
    queue: Arc<dyn Queue>,
    source: String,
    destinations: Vec<Destination>,
    poll_interval: Duration,
}

impl Router {
    pub fn new(
        queue: Arc<dyn Queue>,
        source: impl Into<String>,
        destinations: Vec<Destination>,
    ) -> Self {
        Self { queue, source: source.into(), destinations, poll_interval: Duration::from_secs(1) }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// Names of the destinations `payload` should be copied to.
    ///
    /// Fails when the payload is not a JSON object.
    pub fn select(&self, payload: &[u8]) -> Result<Vec<&str>, serde_json::Error> {
        let message: Map<String, Value> = serde_json::from_slice(payload)?;
        Ok(self
            .destinations
            .iter()
            .filter(|destination| destination.accepts(&message))
            .map(|destination| destination.queue.as_str())
            .collect())
    }

    /// Forward one payload. Returns how many destinations received it.
    pub async fn route(&self, payload: &[u8]) -> usize {
        let targets = match self.select(payload) {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Dropping malformed result message: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for queue in targets {
            match self.queue.push(queue, payload).await {
                Ok(()) => {
                    debug!(destination = queue, "Forwarded result");
                    delivered += 1;
                }
                Err(e) => error!(destination = queue, "Failed to forward result: {}", e),
            }
        }
        delivered
    }

    /// Route results until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let destinations: Vec<String> =
            self.destinations.iter().map(ToString::to_string).collect();
        info!(source = %self.source, destinations = %destinations.join(" "), "Router started");

        while !shutdown.is_cancelled() {
            match self.queue.pop(&self.source, self.poll_interval).await {
                Ok(Some(payload)) => {
                    self.route(&payload).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to fetch result: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        info!("Router stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_plain_destination() {
        let destination: Destination = "archive".parse().unwrap();
        assert_eq!(destination.queue, "archive");
        assert!(destination.predicate.is_empty());

        let empty_brackets: Destination = "archive[]".parse().unwrap();
        assert!(empty_brackets.predicate.is_empty());
    }

    #[test]
    fn test_parse_predicate() {
        let destination: Destination = " alerts[ result=failed , type=ssh ] ".parse().unwrap();
        assert_eq!(destination.queue, "alerts");
        assert_eq!(
            destination.predicate.clauses(),
            &[("result".to_string(), "failed".to_string()), ("type".to_string(), "ssh".to_string())]
        );
        assert_eq!(destination.to_string(), "alerts[result=failed,type=ssh]");
    }

    #[test]
    fn test_value_may_contain_equals() {
        let destination: Destination = "q[input=a=b]".parse().unwrap();
        assert_eq!(destination.predicate.clauses(), &[("input".to_string(), "a=b".to_string())]);
    }

    #[test]
    fn test_parse_errors() {
        let parse = |spec: &str| spec.parse::<Destination>();

        assert!(matches!(parse(""), Err(DestinationError::EmptyName(_))));
        assert!(matches!(parse("[result=failed]"), Err(DestinationError::EmptyName(_))));
        assert!(matches!(parse("alerts[result=failed"), Err(DestinationError::Unclosed(_))));
        assert!(matches!(parse("alerts[result=failed]x"), Err(DestinationError::TrailingText(_))));
        assert!(matches!(parse("alerts]"), Err(DestinationError::TrailingText(_))));
        assert!(matches!(parse("alerts[failed]"), Err(DestinationError::InvalidClause(_))));
        assert!(matches!(parse("alerts[=failed]"), Err(DestinationError::InvalidClause(_))));
    }

    #[test]
    fn test_predicate_matching() {
        let result = message(json!({
            "type": "ssh", "target": "10.0.0.1", "result": "failed",
            "error": "refused", "input": "x", "time": "1700000000"
        }));

        let matching: Destination = "alerts[target=10.0.0.1]".parse().unwrap();
        let other: Destination = "alerts[target=10.0.0.2]".parse().unwrap();
        let all: Destination = "alerts".parse().unwrap();
        let conjunction: Destination = "alerts[type=ssh,result=passed]".parse().unwrap();
        let time: Destination = "alerts[time=1700000000]".parse().unwrap();

        assert!(matching.accepts(&result));
        assert!(!other.accepts(&result));
        assert!(all.accepts(&result));
        assert!(!conjunction.accepts(&result));
        assert!(time.accepts(&result));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let passed = message(json!({"type": "ssh", "result": "passed"}));
        let on_error: Destination = "q[error=]".parse().unwrap();
        assert!(!on_error.accepts(&passed));
    }

    #[test]
    fn test_numeric_fields_compare_textually() {
        let numeric = message(json!({"time": 1700000000, "ok": true}));
        let time: Destination = "q[time=1700000000]".parse().unwrap();
        let flag: Destination = "q[ok=true]".parse().unwrap();
        assert!(time.accepts(&numeric));
        assert!(flag.accepts(&numeric));
    }
}
