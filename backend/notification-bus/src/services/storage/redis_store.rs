use super::{Storage, StorageResult};
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::debug;

/// GET + conditional SET in one server-side step.
///
/// ARGV[1] is "1" when a current value is expected, "0" when the key must be
/// absent. Redis hands a missing key to Lua as `false`.
static CAS_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local current = redis.call('GET', KEYS[1])
        if ARGV[1] == '1' then
            if current ~= ARGV[2] then
                return 0
            end
        elseif current then
            return 0
        end
        redis.call('SET', KEYS[1], ARGV[3])
        return 1
        "#,
    )
});

/// Redis-backed storage shared by every process pointed at the same server
///
/// Keys are namespaced as `<prefix>:<key>`. Compare-and-swap runs as a Lua
/// script, so concurrent writers from different processes cannot lose each
/// other's updates.
#[derive(Clone)]
pub struct RedisStorage {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStorage {
    pub async fn new(redis_url: &str, prefix: impl Into<String>) -> StorageResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.full_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.full_key(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.full_key(key)).await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        let mut conn = self.conn.clone();
        let swapped: i32 = CAS_SCRIPT
            .key(&full_key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(""))
            .arg(new)
            .invoke_async(&mut conn)
            .await?;

        debug!(key = %full_key, swapped = swapped == 1, "Redis compare-and-swap");
        Ok(swapped == 1)
    }
}
