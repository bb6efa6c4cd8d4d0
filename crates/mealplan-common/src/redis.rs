/// Namespaced Redis access for the recipe store.
///
/// Keys are prefixed once here so every caller shares the same namespace. The
/// multiplexed connection is opened on first use and reused afterwards; a failed
/// connect is not remembered, so the next call tries again.
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::CommonError;

pub struct RedisClient {
    client: Option<redis::Client>,
    prefix: String,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisClient {
    /// A `None` or unparsable URL gives a client whose operations all fail with
    /// [`CommonError::RedisUnavailable`].
    pub fn new(url: Option<&str>, prefix: impl Into<String>) -> Self {
        let client = url.and_then(|u| {
            redis::Client::open(u)
                .inspect_err(|e| warn!(error = %e, url = u, "invalid redis url, recipe store disabled"))
                .ok()
        });
        Self {
            client,
            prefix: prefix.into(),
            conn: OnceCell::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CommonError> {
        let client = self.client.as_ref().ok_or(CommonError::RedisUnavailable)?;
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!("opening redis connection");
                client.get_multiplexed_async_connection().await
            })
            .await?;
        Ok(conn.clone())
    }

    pub async fn ping(&self) -> Result<(), CommonError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CommonError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    /// Entries never expire.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), CommonError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.key(key), value).await?;
        Ok(())
    }
}
