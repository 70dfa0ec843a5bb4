//! Redis service for leases shared between server instances

use redis::{AsyncCommands, Client, Script};

use crate::error::{AppError, AppResult};

/// Deletes the key only if it still holds our token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        // Test connection
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client })
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    /// Take a lease that expires after `ttl_seconds`. Returns the holder token,
    /// or `None` if another holder has it.
    pub async fn try_acquire_lease(&self, name: &str, ttl_seconds: u64) -> AppResult<Option<String>> {
        let mut conn = self.connection().await?;

        let key = format!("lease:{}", name);
        let token = format!(
            "{}:{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to acquire lease in Redis: {}", e)))?;

        Ok(acquired.map(|_| token))
    }

    /// Release a lease if it is still held with `token`
    pub async fn release_lease(&self, name: &str, token: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;

        let key = format!("lease:{}", name);
        let released: i32 = Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to release lease in Redis: {}", e)))?;

        Ok(released == 1)
    }

    /// Check whether a lease is currently held by anyone
    pub async fn is_leased(&self, name: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;

        let key = format!("lease:{}", name);
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to check lease in Redis: {}", e)))?;

        Ok(exists)
    }
}
