use serde::{Deserialize, Serialize};

use crate::check::Test;

/// Final outcome of a probe against one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Message published to the results queue, one per probed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Sanitized input line
    pub input: String,

    /// Probe name
    #[serde(rename = "type")]
    pub kind: String,

    /// Address that was probed, or the raw target when not resolved
    pub target: String,

    pub result: Outcome,

    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Unix seconds, carried as a decimal string on the wire
    #[serde(with = "unix_seconds")]
    pub time: i64,
}

impl ResultMessage {
    /// Build the message for `test`, which must already be the sanitized
    /// per-target copy.
    pub fn new(test: &Test, outcome: Result<(), String>) -> Self {
        let (result, error) = match outcome {
            Ok(()) => (Outcome::Passed, None),
            Err(error) => (Outcome::Failed, Some(error)),
        };

        Self {
            input: test.input.clone(),
            kind: test.kind.clone(),
            target: test.target.clone(),
            result,
            error,
            time: chrono::Utc::now().timestamp(),
        }
    }

    pub fn passed(&self) -> bool {
        self.result == Outcome::Passed
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

mod unix_seconds {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(time) => Ok(time),
            Raw::Text(text) => text.trim().parse().map_err(D::Error::custom),
        }
    }
}
