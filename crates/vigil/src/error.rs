use thiserror::Error;

/// Failures talking to the queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid queue connection parameters: {0}")]
    Config(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Queue backend closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown probe type: {0}")]
    UnknownProbe(String),

    #[error("Probe type registered twice: {0}")]
    Duplicate(String),
}

/// Reasons a job line cannot be turned into a [`crate::Test`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected '<target> must run <type>', got: {0}")]
    Malformed(String),

    #[error("Unterminated quote in: {0}")]
    UnterminatedQuote(String),

    #[error("Expected 'with <name> <value>' after test type, got '{0}'")]
    UnexpectedToken(String),

    #[error("Missing value for argument '{0}'")]
    MissingValue(String),

    #[error("Probe '{probe}' does not accept argument '{argument}'")]
    UnknownArgument { probe: String, argument: String },

    #[error("Invalid value '{value}' for argument '{argument}' (must match {pattern})")]
    InvalidValue { argument: String, value: String, pattern: String },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to parse target URI {target}: {reason}")]
    InvalidUri { target: String, reason: String },

    #[error("Failed to resolve name {host}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

/// Malformed `queue[field=value,...]` destination bindings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("Destination has an empty queue name: '{0}'")]
    EmptyName(String),

    #[error("Destination predicate is missing its closing ']': '{0}'")]
    Unclosed(String),

    #[error("Unexpected text after destination predicate: '{0}'")]
    TrailingText(String),

    #[error("Predicate clause must be field=value, got '{0}'")]
    InvalidClause(String),
}
