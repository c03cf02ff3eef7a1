use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns `false` once `key` has been seen more
    /// than `limit` times inside the current window.
    ///
    /// The expiry is set only when the window opens, so later hits never
    /// push it back. A key left without a TTL gets one on its next hit.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let script = redis::Script::new(r#"
            local count = redis.call("INCR", KEYS[1])
            if count == 1 or redis.call("TTL", KEYS[1]) == -1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return count
        "#);

        let count: i64 = script.key(key).arg(window_seconds).invoke_async(&mut conn).await?;

        Ok(count <= limit)
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

pub fn rate_limit_key(client_ip: &str) -> String {
    format!("ratelimit:{}", client_ip)
}
