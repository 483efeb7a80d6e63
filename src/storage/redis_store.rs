use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::info;

use super::{StoreError, store::CacheStore};

/// Cache store backed by a shared Redis instance. The connection manager
/// reconnects on its own after a dropped connection until `close` drops it.
pub struct RedisStore {
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("connected to redis cache store");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn conn(&self) -> Result<ConnectionManager, StoreError> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let values: Vec<String> = self.conn()?.lrange(key, start, stop).await?;
        Ok(values)
    }

    async fn list_index(&self, key: &str, index: isize) -> Result<Option<String>, StoreError> {
        let value: Option<String> = self.conn()?.lindex(key, index).await?;
        Ok(value)
    }

    async fn list_push_front(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _: usize = self.conn()?.lpush(key, value).await?;
        Ok(())
    }

    async fn list_set(&self, key: &str, index: isize, value: String) -> Result<(), StoreError> {
        let _: () = self.conn()?.lset(key, index, value).await?;
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let removed: usize = self.conn()?.lrem(key, 0, value).await?;
        Ok(removed)
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        let _: () = self.conn()?.ltrim(key, start, stop).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _: usize = self.conn()?.del(key).await?;
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let _: usize = self.conn()?.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let _: usize = self.conn()?.srem(key, member).await?;
        Ok(())
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let present: bool = self.conn()?.sismember(key, member).await?;
        Ok(present)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let members: Vec<String> = self.conn()?.smembers(key).await?;
        Ok(members)
    }

    async fn put_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let _: () = self
            .conn()?
            .set_ex(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = self.conn()?.get(key).await?;
        Ok(value)
    }

    /// Drops the connection manager; the socket closes once in-flight
    /// commands holding a clone finish
    async fn close(&self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if conn.is_some() {
            info!("disconnecting from redis cache store");
        }

        Ok(())
    }
}
