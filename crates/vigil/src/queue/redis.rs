//! Redis-backed queues.
//!
//! Each named queue is a Redis list: producers `RPUSH`, consumers `BLPOP`,
//! so every payload is delivered to exactly one consumer.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use url::Url;

use super::Queue;
use crate::error::QueueError;

/// Connection parameters for the Redis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisOptions {
    /// `host:port` of the server
    pub host: String,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self { host: "localhost:6379".into(), db: 0, password: None }
    }
}

impl RedisOptions {
    /// The `redis://` URL for these options.
    pub fn url(&self) -> Result<Url, QueueError> {
        let mut url = Url::parse(&format!("redis://{}/{}", self.host, self.db))
            .map_err(|e| QueueError::Config(format!("invalid redis host {}: {}", self.host, e)))?;

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| QueueError::Config(format!("cannot set password for {}", self.host)))?;
        }
        Ok(url)
    }
}

/// Queue client over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
}

impl RedisQueue {
    pub async fn connect(options: &RedisOptions) -> Result<Self, QueueError> {
        let url = options.url()?;
        let client = redis::Client::open(url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl Queue for RedisQueue {
    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        let mut conn = self.conn.clone();
        // BLPOP treats 0 as "forever"
        let seconds = wait.as_secs().max(1);
        let popped: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn push(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("RPUSH").arg(queue).arg(payload).query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_without_password() {
        let url = RedisOptions::default().url().unwrap();
        assert_eq!(url.as_str(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_url_with_password_and_db() {
        let options = RedisOptions {
            host: "redis.internal:6380".into(),
            db: 3,
            password: Some("p@ss word".into()),
        };
        let url = options.url().unwrap();
        assert_eq!(url.host_str(), Some("redis.internal"));
        assert_eq!(url.port(), Some(6380));
        assert_eq!(url.path(), "/3");
        assert_eq!(url.password(), Some("p%40ss%20word"));
    }

    #[test]
    fn test_empty_password_ignored() {
        let options = RedisOptions { password: Some(String::new()), ..RedisOptions::default() };
        assert_eq!(options.url().unwrap().password(), None);
    }
}
